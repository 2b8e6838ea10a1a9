//! Status reporting for the block writer

use tracing::info;

/// Receives human-readable status lines from the block writer.
///
/// Called from the writer's background task, so implementations must be
/// thread-safe and must not block for long: a stalled sink stalls both
/// ticking and shutdown.
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, status: &str);
}

impl<F> EventSink for F
where
    F: Fn(&str) + Send + Sync + 'static,
{
    fn emit(&self, status: &str) {
        self(status)
    }
}

/// Forwards every status line to `tracing` at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, status: &str) {
        info!("{}", status);
    }
}
