//! Infrastructure layer: job stores, the lifecycle engine, notifiers and config.

pub mod config;
pub mod jobs;
pub mod notify;
