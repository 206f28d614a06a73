//! Job storage abstraction and the in-memory implementation.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use jobrelay_core::{Job, JobError, JobFilter, JobId, JobStatus, NewJob};

/// Job store abstraction.
///
/// Every mutation is a single operation keyed by job id. `transition` is a
/// conditional update: it only applies when the stored status equals `from`,
/// so concurrent callers racing on the same job cannot both succeed.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new `pending` job and return the persisted record.
    async fn insert(&self, job: NewJob, created_at: DateTime<Utc>) -> Result<Job, JobStoreError>;

    /// Get a job by ID.
    async fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// List jobs matching `filter`, newest-created first.
    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, JobStoreError>;

    /// Move a job from `from` to `to` at time `at` if its current status is `from`.
    ///
    /// Returns the persisted record after the update.
    async fn transition(
        &self,
        id: JobId,
        from: JobStatus,
        to: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<Job, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job {id} is {current}, cannot move to {requested}")]
    Conflict {
        id: JobId,
        current: JobStatus,
        requested: JobStatus,
    },
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<JobStoreError> for JobError {
    fn from(err: JobStoreError) -> Self {
        match err {
            JobStoreError::NotFound(id) => JobError::NotFound(id),
            JobStoreError::Conflict {
                id,
                current,
                requested,
            } => JobError::InvalidTransition {
                id,
                current,
                requested,
            },
            JobStoreError::Storage(msg) => JobError::Storage(msg),
        }
    }
}

/// Newest-created first; ids break ties so the order is total.
pub(crate) fn newest_first(a: &Job, b: &Job) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

#[derive(Debug, Default)]
struct Inner {
    jobs: BTreeMap<JobId, Job>,
    last_id: i64,
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    inner: RwLock<Inner>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn poisoned<T>(_: T) -> JobStoreError {
        JobStoreError::Storage("in-memory job store lock poisoned".to_string())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: NewJob, created_at: DateTime<Utc>) -> Result<Job, JobStoreError> {
        let mut inner = self.inner.write().map_err(Self::poisoned)?;
        inner.last_id += 1;
        let id = JobId::new(inner.last_id);
        let job = Job::new(id, job, created_at);
        inner.jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        let inner = self.inner.read().map_err(Self::poisoned)?;
        Ok(inner.jobs.get(&id).cloned())
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, JobStoreError> {
        let inner = self.inner.read().map_err(Self::poisoned)?;
        let mut result: Vec<_> = inner
            .jobs
            .values()
            .filter(|j| filter.matches(j))
            .cloned()
            .collect();

        result.sort_by(newest_first);
        Ok(result)
    }

    async fn transition(
        &self,
        id: JobId,
        from: JobStatus,
        to: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<Job, JobStoreError> {
        let mut inner = self.inner.write().map_err(Self::poisoned)?;
        let job = inner.jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;

        let conflict = JobStoreError::Conflict {
            id,
            current: job.status,
            requested: to,
        };
        if job.status != from {
            return Err(conflict);
        }
        job.apply_transition(to, at).map_err(|_| conflict)?;
        Ok(job.clone())
    }
}
