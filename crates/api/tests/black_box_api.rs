use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::Extension, routing::post, Json, Router};
use reqwest::StatusCode;
use serde_json::{json, Value};

use jobrelay_infra::jobs::{EngineConfig, InMemoryJobStore, JobEngine, JobStore, SqliteJobStore};
use jobrelay_infra::notify::{Notifier, RecordingNotifier, WebhookNotifier};

const COMPLETION_DELAY: Duration = Duration::from_millis(150);

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(notifier: Arc<dyn Notifier>) -> Self {
        Self::spawn_with_store(InMemoryJobStore::arc(), notifier).await
    }

    async fn spawn_with_store(store: Arc<dyn JobStore>, notifier: Arc<dyn Notifier>) -> Self {
        let engine = JobEngine::new(
            store,
            notifier,
            EngineConfig::default().with_completion_delay(COMPLETION_DELAY),
        );
        // Same router as prod, bound to an ephemeral port.
        Self::serve(jobrelay_api::app::build_app(engine)).await
    }

    async fn serve(app: Router) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn create_job(client: &reqwest::Client, base_url: &str, body: Value) -> Value {
    let res = client
        .post(format!("{}/jobs", base_url))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

async fn get_job_with_status(
    client: &reqwest::Client,
    base_url: &str,
    id: i64,
    status: &str,
) -> Value {
    // Completion is asynchronous; poll until the timer has fired.
    for _ in 0..100 {
        let job: Value = client
            .get(format!("{}/jobs/{}", base_url, id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        if job["status"] == status {
            return job;
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    panic!("job {id} did not reach {status} within timeout");
}

#[tokio::test]
async fn create_returns_pending_record() {
    let srv = TestServer::spawn(Arc::new(RecordingNotifier::new())).await;
    let client = reqwest::Client::new();

    let job = create_job(
        &client,
        &srv.base_url,
        json!({ "taskName": "sync-report", "payload": {"rows": 10}, "priority": "High" }),
    )
    .await;

    assert!(job["id"].as_i64().unwrap() > 0);
    assert_eq!(job["taskName"], "sync-report");
    assert_eq!(job["payload"], json!({"rows": 10}));
    assert_eq!(job["priority"], "High");
    assert_eq!(job["status"], "pending");
    assert_eq!(job["createdAt"], job["updatedAt"]);
    assert!(job["completedAt"].is_null());
}

#[tokio::test]
async fn missing_fields_are_rejected_without_creating_a_record() {
    let srv = TestServer::spawn(Arc::new(RecordingNotifier::new())).await;
    let client = reqwest::Client::new();

    for body in [
        json!({ "priority": "High" }),
        json!({ "taskName": "sync-report" }),
        json!({ "taskName": "  ", "priority": "Low" }),
    ] {
        let res = client
            .post(format!("{}/jobs", srv.base_url))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let err: Value = res.json().await.unwrap();
        assert_eq!(err["error"], "validation_error");
    }

    let jobs: Value = client
        .get(format!("{}/jobs", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(jobs, json!([]));
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let srv = TestServer::spawn(Arc::new(RecordingNotifier::new())).await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/jobs/999", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .post(format!("{}/run-job/999", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let err: Value = res.json().await.unwrap();
    assert_eq!(err["error"], "not_found");
}

#[tokio::test]
async fn sync_report_runs_to_completion_and_notifies_once() {
    let notifier = Arc::new(RecordingNotifier::new());
    let srv = TestServer::spawn(notifier.clone()).await;
    let client = reqwest::Client::new();

    let job = create_job(
        &client,
        &srv.base_url,
        json!({ "taskName": "sync-report", "payload": {"rows": 10}, "priority": "High" }),
    )
    .await;
    let id = job["id"].as_i64().unwrap();

    let res = client
        .post(format!("{}/run-job/{}", srv.base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let started: Value = res.json().await.unwrap();
    assert_eq!(started, json!({ "message": "Job started", "id": id, "status": "running" }));

    // Still running right after the start returns.
    let running: Value = client
        .get(format!("{}/jobs/{}", srv.base_url, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(running["status"], "running");

    let done = get_job_with_status(&client, &srv.base_url, id, "completed").await;
    assert!(done["completedAt"].is_string());
    assert_eq!(done["completedAt"], done["updatedAt"]);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let delivered = notifier.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].job_id.get(), id);
    assert_eq!(delivered[0].task_name, "sync-report");
    assert_eq!(delivered[0].priority.as_str(), "High");

    // get is idempotent once completed.
    let again: Value = client
        .get(format!("{}/jobs/{}", srv.base_url, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again, done);
}

#[tokio::test]
async fn lifecycle_persists_through_sqlite_store() {
    let store = SqliteJobStore::connect("sqlite::memory:").await.unwrap();
    let notifier = Arc::new(RecordingNotifier::new());
    let srv = TestServer::spawn_with_store(Arc::new(store), notifier.clone()).await;
    let client = reqwest::Client::new();

    let job = create_job(
        &client,
        &srv.base_url,
        json!({ "taskName": "sync-report", "payload": {"rows": 10}, "priority": "High" }),
    )
    .await;
    let id = job["id"].as_i64().unwrap();
    assert_eq!(job["status"], "pending");

    let url = format!("{}/run-job/{}", srv.base_url, id);
    assert_eq!(client.post(&url).send().await.unwrap().status(), StatusCode::OK);
    assert_eq!(client.post(&url).send().await.unwrap().status(), StatusCode::CONFLICT);

    let done = get_job_with_status(&client, &srv.base_url, id, "completed").await;
    assert_eq!(done["payload"], json!({"rows": 10}));
    assert!(done["completedAt"].is_string());

    let completed: Vec<Value> = client
        .get(format!("{}/jobs?status=completed&priority=High", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0]["id"], id);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(notifier.delivered().len(), 1);
}

#[tokio::test]
async fn second_start_conflicts_with_current_status() {
    let srv = TestServer::spawn(Arc::new(RecordingNotifier::new())).await;
    let client = reqwest::Client::new();

    let job = create_job(
        &client,
        &srv.base_url,
        json!({ "taskName": "t", "priority": "Low" }),
    )
    .await;
    let id = job["id"].as_i64().unwrap();
    let url = format!("{}/run-job/{}", srv.base_url, id);

    let first = client.post(&url).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = client.post(&url).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let err: Value = second.json().await.unwrap();
    assert_eq!(err["error"], "invalid_transition");
    assert_eq!(err["status"], "running");

    get_job_with_status(&client, &srv.base_url, id, "completed").await;

    let third = client.post(&url).send().await.unwrap();
    assert_eq!(third.status(), StatusCode::CONFLICT);
    let err: Value = third.json().await.unwrap();
    assert_eq!(err["status"], "completed");
}

#[tokio::test]
async fn list_filters_and_orders_newest_first() {
    let srv = TestServer::spawn(Arc::new(RecordingNotifier::new())).await;
    let client = reqwest::Client::new();

    let a = create_job(&client, &srv.base_url, json!({ "taskName": "a", "priority": "Low" })).await;
    let b = create_job(&client, &srv.base_url, json!({ "taskName": "b", "priority": "High" })).await;
    let c = create_job(&client, &srv.base_url, json!({ "taskName": "c", "priority": "High" })).await;

    client
        .post(format!("{}/run-job/{}", srv.base_url, b["id"]))
        .send()
        .await
        .unwrap();

    let all: Vec<Value> = client
        .get(format!("{}/jobs", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<_> = all.iter().map(|j| j["taskName"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["c", "b", "a"]);

    let high: Vec<Value> = client
        .get(format!("{}/jobs?priority=High", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ids: Vec<_> = high.iter().map(|j| j["id"].clone()).collect();
    assert_eq!(ids, vec![c["id"].clone(), b["id"].clone()]);

    let pending: Vec<Value> = client
        .get(format!("{}/jobs?status=pending&priority=Low", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["id"], a["id"]);
}

#[derive(Clone, Default)]
struct Received(Arc<Mutex<Vec<Value>>>);

async fn receive_hook(Extension(received): Extension<Received>, Json(body): Json<Value>) {
    received.0.lock().unwrap().push(body);
}

#[tokio::test]
async fn completion_webhook_is_posted_to_configured_url() {
    let received = Received::default();
    let hook = TestServer::serve(
        Router::new()
            .route("/hook", post(receive_hook))
            .layer(Extension(received.clone())),
    )
    .await;

    let notifier = WebhookNotifier::new(
        Some(format!("{}/hook", hook.base_url)),
        Duration::from_secs(2),
    )
    .unwrap();
    let srv = TestServer::spawn(Arc::new(notifier)).await;
    let client = reqwest::Client::new();

    let job = create_job(
        &client,
        &srv.base_url,
        json!({ "taskName": "sync-report", "payload": {"rows": 10}, "priority": "High" }),
    )
    .await;
    let id = job["id"].as_i64().unwrap();
    client
        .post(format!("{}/run-job/{}", srv.base_url, id))
        .send()
        .await
        .unwrap();

    let done = get_job_with_status(&client, &srv.base_url, id, "completed").await;

    let mut bodies = Vec::new();
    for _ in 0..50 {
        bodies = received.0.lock().unwrap().clone();
        if !bodies.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(bodies.len(), 1);
    let body = &bodies[0];
    assert_eq!(body["jobId"], id);
    assert_eq!(body["taskName"], "sync-report");
    assert_eq!(body["status"], "completed");
    assert_eq!(body["priority"], "High");
    assert_eq!(body["payload"], json!({"rows": 10}));
    assert_eq!(body["completedAt"], done["completedAt"]);
}

#[tokio::test]
async fn health_and_stats_are_served() {
    let srv = TestServer::spawn(Arc::new(RecordingNotifier::new())).await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let stats: Value = client
        .get(format!("{}/stats", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["jobs_created"], 0);
}
