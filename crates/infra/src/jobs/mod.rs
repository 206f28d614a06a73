//! Job lifecycle: persistence and the engine that drives transitions.
//!
//! ## Components
//!
//! - `JobStore`: persistence port with an atomic conditional transition
//! - `InMemoryJobStore` / `SqliteJobStore`: the two store adapters
//! - `JobEngine`: creates, starts and (after a delay) completes jobs

pub mod engine;
pub mod sqlite;
pub mod store;

pub use engine::{EngineConfig, EngineStats, JobEngine};
pub use sqlite::SqliteJobStore;
pub use store::{InMemoryJobStore, JobStore, JobStoreError};
