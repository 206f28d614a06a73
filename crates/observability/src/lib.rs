//! Tracing and logging (shared setup).

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    logging::init();
}

/// Subscriber setup and output format selection.
pub mod logging;
