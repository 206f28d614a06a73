//! `jobrelay-core`: job domain model.
//!
//! This crate contains **pure domain** types (no infrastructure concerns):
//! the job entity, its lifecycle rule, priorities, filters and errors.

pub mod error;
pub mod id;
pub mod job;
pub mod priority;

pub use error::{JobError, JobResult};
pub use id::JobId;
pub use job::{Job, JobFilter, JobStatus, JsonObject, NewJob};
pub use priority::{Priority, PriorityPolicy};
