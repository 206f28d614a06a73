//! Job lifecycle engine.
//!
//! Owns every status transition: creates `pending` jobs, starts them, and
//! after the simulated work delay completes them and fires the completion
//! notification.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use jobrelay_core::{Job, JobError, JobFilter, JobId, JobResult, JobStatus, NewJob, PriorityPolicy};

use super::store::JobStore;
use crate::notify::{CompletionNotification, Notifier};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Simulated work duration between `running` and `completed`
    pub completion_delay: Duration,
    /// Whether non-canonical priorities are accepted at creation
    pub priority_policy: PriorityPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            completion_delay: Duration::from_millis(3000),
            priority_policy: PriorityPolicy::Loose,
        }
    }
}

impl EngineConfig {
    pub fn with_completion_delay(mut self, delay: Duration) -> Self {
        self.completion_delay = delay;
        self
    }

    pub fn with_priority_policy(mut self, policy: PriorityPolicy) -> Self {
        self.priority_policy = policy;
        self
    }
}

/// Engine runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct EngineStats {
    pub jobs_created: u64,
    pub jobs_started: u64,
    pub jobs_completed: u64,
    pub completion_failures: u64,
    pub notifications_delivered: u64,
    pub notifications_failed: u64,
    pub jobs_recovered: u64,
    pub pending_timers: usize,
}

#[derive(Debug, Default)]
struct Counters {
    jobs_created: AtomicU64,
    jobs_started: AtomicU64,
    jobs_completed: AtomicU64,
    completion_failures: AtomicU64,
    notifications_delivered: AtomicU64,
    notifications_failed: AtomicU64,
    jobs_recovered: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

struct EngineInner {
    store: Arc<dyn JobStore>,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
    /// One completion timer per running job, removed once the timer fires.
    timers: Mutex<HashMap<JobId, AbortHandle>>,
    /// Completions past their timer but not yet finished notifying.
    in_flight: AtomicUsize,
    idle: Notify,
    counters: Counters,
}

impl EngineInner {
    fn timers(&self) -> MutexGuard<'_, HashMap<JobId, AbortHandle>> {
        // The map holds no invariant a panicking holder could break.
        self.timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim the completion for `job_id` once its timer fires.
    ///
    /// Returns false if shutdown already took the timer away, in which case
    /// the job stays `running` for the next `recover()`.
    fn begin_completion(&self, job_id: JobId) -> bool {
        let mut timers = self.timers();
        if timers.remove(&job_id).is_none() {
            return false;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn end_completion(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// The time-triggered completion step.
    async fn complete(&self, job_id: JobId) {
        let job = match self
            .store
            .transition(job_id, JobStatus::Running, JobStatus::Completed, Utc::now())
            .await
        {
            Ok(job) => job,
            Err(err) => {
                bump(&self.counters.completion_failures);
                error!(job_id = %job_id, error = %err, "failed to persist job completion; skipping notification");
                return;
            }
        };

        bump(&self.counters.jobs_completed);
        info!(job_id = %job.id, task_name = %job.task_name, "job completed");

        let notification = CompletionNotification::from_job(&job);
        match self.notifier.deliver(&notification).await {
            Ok(()) => bump(&self.counters.notifications_delivered),
            Err(err) => {
                bump(&self.counters.notifications_failed);
                let err = JobError::from(err);
                warn!(job_id = %job.id, error = %err, "completion notification failed");
            }
        }
    }
}

/// The job lifecycle engine.
///
/// Cheap to clone; all clones share the same store, notifier and timers.
#[derive(Clone)]
pub struct JobEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for JobEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobEngine")
            .field("config", &self.inner.config)
            .field("pending_timers", &self.pending_timers())
            .finish()
    }
}

impl JobEngine {
    pub fn new(store: Arc<dyn JobStore>, notifier: Arc<dyn Notifier>, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                notifier,
                config,
                timers: Mutex::new(HashMap::new()),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
                counters: Counters::default(),
            }),
        }
    }

    /// Validate and persist a new `pending` job.
    pub async fn create_job(
        &self,
        task_name: Option<&str>,
        payload: Option<serde_json::Value>,
        priority: Option<&str>,
    ) -> JobResult<Job> {
        let new_job = NewJob::parse(task_name, payload, priority, self.inner.config.priority_policy)?;
        let job = self.inner.store.insert(new_job, Utc::now()).await?;

        bump(&self.inner.counters.jobs_created);
        info!(job_id = %job.id, task_name = %job.task_name, priority = %job.priority, "job created");
        Ok(job)
    }

    /// Jobs matching `filter`, newest-created first.
    pub async fn list_jobs(&self, filter: &JobFilter) -> JobResult<Vec<Job>> {
        Ok(self.inner.store.list(filter).await?)
    }

    pub async fn get_job(&self, id: JobId) -> JobResult<Job> {
        self.inner.store.get(id).await?.ok_or(JobError::NotFound(id))
    }

    /// Move a `pending` job to `running` and schedule its completion.
    ///
    /// Returns as soon as the `running` state is persisted. A job that is
    /// already running or completed is rejected with `InvalidTransition`
    /// carrying its current status.
    pub async fn start_job(&self, id: JobId) -> JobResult<Job> {
        let job = self
            .inner
            .store
            .transition(id, JobStatus::Pending, JobStatus::Running, Utc::now())
            .await?;

        bump(&self.inner.counters.jobs_started);
        info!(job_id = %id, "job started");

        self.schedule_completion(id, self.inner.config.completion_delay);
        Ok(job)
    }

    /// Re-arm completion timers for jobs persisted as `running`.
    ///
    /// Each job completes at `updated_at + completion_delay`, or immediately
    /// if that moment has already passed. Jobs that already have a timer are
    /// skipped. Returns how many timers were armed.
    pub async fn recover(&self) -> JobResult<usize> {
        let running = self
            .inner
            .store
            .list(&JobFilter::default().with_status(JobStatus::Running))
            .await?;

        let delay = self.inner.config.completion_delay;
        let now = Utc::now();

        let mut armed = 0;
        for job in running {
            let remaining = remaining_delay(job.updated_at, delay, now);
            if self.schedule_completion(job.id, remaining) {
                armed += 1;
                bump(&self.inner.counters.jobs_recovered);
                debug!(job_id = %job.id, remaining_ms = remaining.as_millis() as u64, "rescheduled completion");
            }
        }

        if armed > 0 {
            info!(recovered = armed, "rescheduled in-flight jobs");
        }
        Ok(armed)
    }

    /// Abort every completion timer that has not fired yet, then wait for
    /// completions already past their timer to finish notifying.
    ///
    /// Jobs whose timer was aborted stay `running` in the store;
    /// [`JobEngine::recover`] picks them up again on the next start. Returns
    /// how many timers were aborted.
    pub async fn shutdown(&self) -> usize {
        let aborted = {
            let mut timers = self.inner.timers();
            let aborted = timers.len();
            for (_, handle) in timers.drain() {
                handle.abort();
            }
            aborted
        };
        if aborted > 0 {
            info!(aborted, "aborted pending completion timers");
        }

        loop {
            let idle = self.inner.idle.notified();
            if self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            debug!("waiting for in-flight completions");
            idle.await;
        }
        aborted
    }

    pub fn pending_timers(&self) -> usize {
        self.inner.timers().len()
    }

    pub fn stats(&self) -> EngineStats {
        let c = &self.inner.counters;
        EngineStats {
            jobs_created: c.jobs_created.load(Ordering::Relaxed),
            jobs_started: c.jobs_started.load(Ordering::Relaxed),
            jobs_completed: c.jobs_completed.load(Ordering::Relaxed),
            completion_failures: c.completion_failures.load(Ordering::Relaxed),
            notifications_delivered: c.notifications_delivered.load(Ordering::Relaxed),
            notifications_failed: c.notifications_failed.load(Ordering::Relaxed),
            jobs_recovered: c.jobs_recovered.load(Ordering::Relaxed),
            pending_timers: self.pending_timers(),
        }
    }

    /// Arm the completion timer for `job_id`. Returns false if one is already armed.
    fn schedule_completion(&self, job_id: JobId, delay: Duration) -> bool {
        // Held across the spawn so the task cannot deregister before it is registered.
        let mut timers = self.inner.timers();
        if timers.contains_key(&job_id) {
            return false;
        }

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if inner.begin_completion(job_id) {
                inner.complete(job_id).await;
                inner.end_completion();
            }
        });
        timers.insert(job_id, task.abort_handle());
        true
    }
}

/// Time left until a job started at `started` is due, never negative.
fn remaining_delay(started: DateTime<Utc>, delay: Duration, now: DateTime<Utc>) -> Duration {
    let elapsed = now.signed_duration_since(started).to_std().unwrap_or(Duration::ZERO);
    delay.saturating_sub(elapsed)
}
