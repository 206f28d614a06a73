//! Completion notifications.
//!
//! The engine hands a [`CompletionNotification`] to a [`Notifier`] once a job
//! reaches `completed`. Delivery is fire-and-forget from the engine's point of
//! view: errors are logged and counted, never surfaced to an API caller.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use jobrelay_core::{Job, JobError, JobId, JobStatus, JsonObject, Priority};

pub mod retry;
pub mod webhook;

pub use retry::{BackoffStrategy, RetryPolicy};
pub use webhook::WebhookNotifier;

/// Body of the completion webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionNotification {
    pub job_id: JobId,
    pub task_name: String,
    pub status: JobStatus,
    pub priority: Priority,
    pub payload: JsonObject,
    pub completed_at: DateTime<Utc>,
}

impl CompletionNotification {
    /// Build the notification from a persisted, completed job.
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            task_name: job.task_name.clone(),
            status: job.status,
            priority: job.priority.clone(),
            payload: job.payload.clone(),
            completed_at: job.completed_at.unwrap_or(job.updated_at),
        }
    }
}

/// Notification delivery error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Transport(String),
    #[error("webhook responded with status {0}")]
    Status(u16),
    #[error("notifier unavailable: {0}")]
    Unavailable(String),
}

impl From<NotifyError> for JobError {
    fn from(err: NotifyError) -> Self {
        JobError::notification(err.to_string())
    }
}

/// Delivers completion notifications to some destination.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &CompletionNotification) -> Result<(), NotifyError>;
}

/// In-memory notifier for tests/dev: records every notification it is given.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<CompletionNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything delivered so far, in delivery order.
    pub fn delivered(&self) -> Vec<CompletionNotification> {
        match self.delivered.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, notification: &CompletionNotification) -> Result<(), NotifyError> {
        self.delivered
            .lock()
            .map_err(|_| NotifyError::Unavailable("recording notifier lock poisoned".to_string()))?
            .push(notification.clone());
        Ok(())
    }
}
