//! SQLite-backed job store.
//!
//! ## Schema
//!
//! A single `jobs` table keyed by an autoincrement integer id. The payload is
//! stored as JSON text and decoded back into an object on read. Timestamps are
//! written as fixed-width RFC 3339 strings (microseconds, `Z` suffix) so that
//! text ordering matches time ordering; rows written by older tooling using
//! SQLite's `datetime('now')` format are still readable.
//!
//! ## Atomic transitions
//!
//! `transition()` is a single `UPDATE ... WHERE id = ? AND status = ?`. SQLite
//! serializes writers, so when two requests race to start the same job only
//! one of them sees a changed row.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use jobrelay_core::{Job, JobFilter, JobId, JobStatus, JsonObject, NewJob, Priority, PriorityPolicy};

use super::store::{JobStore, JobStoreError};

const SELECT_COLUMNS: &str =
    "SELECT id, taskName, payload, priority, status, createdAt, updatedAt, completedAt FROM jobs";

impl From<sqlx::Error> for JobStoreError {
    fn from(err: sqlx::Error) -> Self {
        JobStoreError::Storage(err.to_string())
    }
}

/// SQLite-backed job store.
#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Wrap an existing pool. Call [`SqliteJobStore::migrate`] before use.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `url` and ensure the schema exists.
    ///
    /// In-memory databases are per-connection in SQLite, so they get a
    /// single-connection pool.
    pub async fn connect(url: &str) -> Result<Self, JobStoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Create the `jobs` table if it does not exist.
    pub async fn migrate(&self) -> Result<(), JobStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                taskName    TEXT NOT NULL,
                payload     TEXT,
                priority    TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'pending',
                createdAt   DATETIME DEFAULT (datetime('now')),
                updatedAt   DATETIME DEFAULT (datetime('now')),
                completedAt DATETIME
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_job).transpose()
    }

    /// Explain why a conditional update touched no row.
    async fn rejection(&self, id: JobId, requested: JobStatus) -> JobStoreError {
        match self.fetch(id).await {
            Ok(Some(job)) => JobStoreError::Conflict {
                id,
                current: job.status,
                requested,
            },
            Ok(None) => JobStoreError::NotFound(id),
            Err(err) => err,
        }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    #[instrument(skip(self, job), fields(task_name = %job.task_name), err)]
    async fn insert(&self, job: NewJob, created_at: DateTime<Utc>) -> Result<Job, JobStoreError> {
        let payload = serde_json::to_string(&job.payload)
            .map_err(|e| JobStoreError::Storage(format!("failed to encode payload: {e}")))?;
        let created_at = encode_timestamp(created_at);

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (taskName, payload, priority, status, createdAt, updatedAt)
            VALUES (?1, ?2, ?3, 'pending', ?4, ?4)
            "#,
        )
        .bind(&job.task_name)
        .bind(&payload)
        .bind(job.priority.as_str())
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        let id = JobId::new(result.last_insert_rowid());
        self.fetch(id)
            .await?
            .ok_or_else(|| JobStoreError::Storage(format!("inserted job {id} could not be read back")))
    }

    #[instrument(skip(self), err)]
    async fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        self.fetch(id).await
    }

    #[instrument(skip(self), err)]
    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, JobStoreError> {
        let mut sql = format!("{SELECT_COLUMNS} WHERE 1=1");
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.priority.is_some() {
            sql.push_str(" AND priority = ?");
        }
        sql.push_str(" ORDER BY createdAt DESC, id DESC");

        let mut query = sqlx::query(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(priority) = &filter.priority {
            query = query.bind(priority.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_job).collect()
    }

    #[instrument(skip(self), err)]
    async fn transition(
        &self,
        id: JobId,
        from: JobStatus,
        to: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<Job, JobStoreError> {
        if !from.can_transition_to(to) {
            return Err(self.rejection(id, to).await);
        }

        // The right-hand sides see the row as it was before the update, so
        // both MAX() calls clamp against the previous updatedAt.
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?1,
                updatedAt = MAX(updatedAt, ?2),
                completedAt = CASE WHEN ?1 = 'completed' THEN MAX(updatedAt, ?2) ELSE completedAt END
            WHERE id = ?3 AND status = ?4
            "#,
        )
        .bind(to.as_str())
        .bind(encode_timestamp(at))
        .bind(id.get())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.rejection(id, to).await);
        }

        self.fetch(id)
            .await?
            .ok_or(JobStoreError::NotFound(id))
    }
}

fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, JobStoreError> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| JobStoreError::Storage(format!("invalid {column} timestamp {raw:?}: {e}")))
}

fn row_to_job(row: &SqliteRow) -> Result<Job, JobStoreError> {
    let id: i64 = row.try_get("id")?;
    let task_name: String = row.try_get("taskName")?;
    let payload: Option<String> = row.try_get("payload")?;
    let priority: String = row.try_get("priority")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("createdAt")?;
    let updated_at: String = row.try_get("updatedAt")?;
    let completed_at: Option<String> = row.try_get("completedAt")?;

    let payload = match payload.as_deref().map(str::trim) {
        None | Some("") => JsonObject::new(),
        Some(text) => serde_json::from_str(text)
            .map_err(|e| JobStoreError::Storage(format!("invalid payload for job {id}: {e}")))?,
    };

    Ok(Job {
        id: JobId::new(id),
        task_name,
        payload,
        priority: Priority::parse(&priority, PriorityPolicy::Loose)
            .map_err(|e| JobStoreError::Storage(format!("job {id}: {e}")))?,
        status: status
            .parse()
            .map_err(|e| JobStoreError::Storage(format!("job {id}: {e}")))?,
        created_at: decode_timestamp("createdAt", &created_at)?,
        updated_at: decode_timestamp("updatedAt", &updated_at)?,
        completed_at: completed_at
            .as_deref()
            .map(|raw| decode_timestamp("completedAt", raw))
            .transpose()?,
    })
}
