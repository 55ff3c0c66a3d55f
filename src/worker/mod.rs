//! Background download worker
//!
//! One worker executes one queue of download requests end to end: it
//! submits the queue to the external engine, polls progress on a
//! cooperative tick loop, and commits exactly one of Success, Failure or
//! Retry back to the host scheduler.

pub mod orchestrator;

pub use orchestrator::DownloadWorker;

use crate::error;
use crate::notification::NotificationConfig;
use crate::result::{Outcome, WorkStatus};
use std::time::Duration;

/// Worker tuning knobs.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Period of the cooperative progress-poll loop.
    pub tick_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(500),
        }
    }
}

/// Events and affordances the host runtime exposes to a worker.
///
/// Every callback may be invoked from an engine-owned thread; downstream
/// consumers must tolerate late progress and completion events delivered
/// after a result is already committed.
pub trait HostRuntime: Send + Sync {
    fn on_work_started(&self, _work_id: &str) {}

    fn on_work_stopped(&self, _work_id: &str, _outcome: Outcome) {}

    /// Signal that this work is now foreground-critical. Best-effort: a
    /// failure here is logged by the worker, never fatal.
    fn promote_to_foreground(&self, _notification: &NotificationConfig) -> error::Result<()> {
        Ok(())
    }

    /// Re-render the foreground notification after a progress change.
    fn render_notification(&self, _notification: &NotificationConfig) {}

    /// Per-request transfer progress, forwarded unconditionally.
    fn on_progress(&self, _request_id: &str, _bytes_delta: u64, _total_bytes: u64) {}

    /// Per-request completion, forwarded unconditionally.
    fn on_download_complete(&self, _request_id: &str, _location: &str, _success: bool) {}

    /// Aggregate completion. The consumer may commit a more specific
    /// outcome through `status` before the worker applies its default.
    fn on_all_complete(&self, _all_succeeded: bool, _status: &WorkStatus) {}

    /// Generic liveness tick from the poll loop.
    fn on_tick(&self) {}
}

/// Host runtime that ignores every event. Useful for tests and tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHost;

impl HostRuntime for NullHost {}
