//! External download engine abstraction
//!
//! The engine performs the actual HTTP transfers; this core only talks to
//! it through keyed operations and receives progress/completion through
//! the [`EngineListener`] callbacks, which may arrive from engine-owned
//! threads at any time. The engine handle is process-wide and may be
//! shared by several workers; every operation is keyed by request id or
//! worker tag so no cross-worker locking is needed here.

use crate::descriptor::RetryDecision;
use crate::queue::DownloadQueueDescription;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("submission rejected: {0}")]
    SubmitRejected(String),

    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Why a single download finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    Success,
    Error,
    OutOfRetries,
}

/// Callbacks the engine delivers to whoever submitted a queue.
///
/// Implementations must tolerate delivery from arbitrary threads, and
/// late deliveries after the worker already committed a result.
pub trait EngineListener: Send + Sync {
    /// Submission acknowledgement for one request. `succeeded == false`
    /// means the engine could not take the request; the submitter decides
    /// whether to ask for an engine-level retry.
    fn on_download_enqueued(&self, request_id: &str, succeeded: bool);

    /// Per-request transfer progress as a byte delta plus absolute total.
    fn on_progress(&self, request_id: &str, bytes_since_last: u64, total_bytes: u64);

    /// Aggregated progress for a whole download group.
    fn on_group_progress(&self, group_id: i32, percent: i32, indeterminate: bool);

    /// One request finished, for better or worse.
    fn on_download_complete(&self, request_id: &str, location: &str, reason: CompletionReason);

    /// Every request in the submitted queue has finished.
    fn on_all_downloads_complete(&self, all_succeeded: bool);
}

/// Operations this core invokes on the external engine.
///
/// Submission is fire-and-forget: completion arrives later through the
/// listener attached to the queue. The keyed operations are expected to
/// be fast snapshot/dispatch calls, never network round-trips.
#[async_trait]
pub trait DownloadEngine: Send + Sync {
    /// Submit a whole queue under the given worker tag. The listener must
    /// already be attached to the queue.
    async fn submit(&self, worker_tag: &str, queue: &DownloadQueueDescription) -> Result<()>;

    fn pause(&self, request_id: &str);
    fn resume(&self, request_id: &str);
    fn cancel(&self, request_id: &str);

    /// Re-attempt a failed enqueue immediately. Engine-level plumbing
    /// retry, never charged against the description's own retry budget.
    fn retry_enqueue(&self, request_id: &str);

    /// Ask for a refreshed group progress snapshot; the answer arrives
    /// through `on_group_progress`.
    fn refresh_group_progress(&self, group_id: i32);

    /// Ask the engine to verify all transfers in the group are alive.
    fn verify_transfers(&self, group_id: i32);

    /// Cease all work tagged with this worker.
    async fn stop_all(&self, worker_tag: &str);
}

/// In-process fake engine for development and tests.
///
/// Transfers are simulated synchronously inside `submit` by walking each
/// description's own retry policy against a scripted failure count, so
/// tests get deterministic callback ordering. The listener stays attached
/// afterwards, letting tests replay late callbacks.
#[derive(Default)]
pub struct MockEngine {
    listener: Mutex<Option<Arc<dyn EngineListener>>>,
    fail_enqueue_once: Mutex<HashSet<String>>,
    url_failures: Mutex<HashMap<String, u32>>,
    hold_completion: AtomicBool,
    submissions: AtomicUsize,
    ops: Mutex<Vec<String>>,
    stopped_tags: Mutex<Vec<String>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the first enqueue of this request to fail.
    pub fn fail_first_enqueue(&self, request_id: &str) {
        self.fail_enqueue_once
            .lock()
            .unwrap()
            .insert(request_id.to_string());
    }

    /// Script the first `count` transfer attempts of this request to fail.
    pub fn fail_url_attempts(&self, request_id: &str, count: u32) {
        self.url_failures
            .lock()
            .unwrap()
            .insert(request_id.to_string(), count);
    }

    /// Keep transfers pending forever: enqueue acks are delivered but no
    /// completion ever arrives. For forced-stop tests.
    pub fn hold_completion(&self) {
        self.hold_completion.store(true, Ordering::SeqCst);
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    /// Keyed operations observed, in order.
    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub fn stopped_tags(&self) -> Vec<String> {
        self.stopped_tags.lock().unwrap().clone()
    }

    /// Replay a late aggregate completion through the attached listener.
    pub fn fire_all_complete(&self, all_succeeded: bool) {
        if let Some(listener) = self.listener.lock().unwrap().clone() {
            listener.on_all_downloads_complete(all_succeeded);
        }
    }

    /// Replay a late per-group progress callback.
    pub fn fire_group_progress(&self, group_id: i32, percent: i32, indeterminate: bool) {
        if let Some(listener) = self.listener.lock().unwrap().clone() {
            listener.on_group_progress(group_id, percent, indeterminate);
        }
    }

    fn record(&self, op: String) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait]
impl DownloadEngine for MockEngine {
    async fn submit(&self, worker_tag: &str, queue: &DownloadQueueDescription) -> Result<()> {
        let listener = queue
            .listener()
            .ok_or_else(|| EngineError::SubmitRejected("no listener attached".to_string()))?;
        *self.listener.lock().unwrap() = Some(Arc::clone(&listener));
        self.submissions.fetch_add(1, Ordering::SeqCst);
        info!(worker_tag, requests = queue.len(), "mock engine accepted queue");

        // Enqueue acknowledgements first; a scripted failure is delivered
        // once and the submitter's retry_enqueue call succeeds it.
        for description in &queue.descriptions {
            let fail = self
                .fail_enqueue_once
                .lock()
                .unwrap()
                .remove(&description.request_id);
            listener.on_download_enqueued(&description.request_id, !fail);
        }

        if self.hold_completion.load(Ordering::SeqCst) {
            debug!(worker_tag, "mock engine holding completion");
            return Ok(());
        }

        listener.on_group_progress(queue.group_id, 0, true);

        let mut all_succeeded = true;
        for description in &queue.descriptions {
            let mut description = description.clone();

            // A completed description must never be re-transferred; it
            // only re-reports its success.
            if description.has_completed {
                listener.on_download_complete(
                    &description.request_id,
                    &description.dest_location,
                    CompletionReason::Success,
                );
                continue;
            }

            description.transient.cached_fetch_id =
                Some(format!("fetch-{}", description.request_id));

            let mut failures_left = self
                .url_failures
                .lock()
                .unwrap()
                .get(&description.request_id)
                .copied()
                .unwrap_or(0);

            loop {
                if failures_left == 0 {
                    let total_bytes = 1000;
                    let delta = description.observe_total_bytes(total_bytes);
                    listener.on_progress(&description.request_id, delta, total_bytes);
                    listener.on_download_complete(
                        &description.request_id,
                        &description.dest_location,
                        CompletionReason::Success,
                    );
                    break;
                }

                failures_left -= 1;
                match description.record_url_failure() {
                    RetryDecision::RetrySameUrl | RetryDecision::FailoverTo(_) => continue,
                    RetryDecision::OutOfRetries => {
                        listener.on_download_complete(
                            &description.request_id,
                            "",
                            CompletionReason::OutOfRetries,
                        );
                        all_succeeded = false;
                        break;
                    }
                }
            }
        }

        listener.on_group_progress(queue.group_id, 50, false);
        listener.on_all_downloads_complete(all_succeeded);
        Ok(())
    }

    fn pause(&self, request_id: &str) {
        self.record(format!("pause:{request_id}"));
    }

    fn resume(&self, request_id: &str) {
        self.record(format!("resume:{request_id}"));
    }

    fn cancel(&self, request_id: &str) {
        self.record(format!("cancel:{request_id}"));
    }

    fn retry_enqueue(&self, request_id: &str) {
        self.record(format!("retry_enqueue:{request_id}"));
        if let Some(listener) = self.listener.lock().unwrap().clone() {
            listener.on_download_enqueued(request_id, true);
        }
    }

    fn refresh_group_progress(&self, group_id: i32) {
        self.record(format!("refresh_group_progress:{group_id}"));
    }

    fn verify_transfers(&self, group_id: i32) {
        self.record(format!("verify_transfers:{group_id}"));
    }

    async fn stop_all(&self, worker_tag: &str) {
        self.stopped_tags.lock().unwrap().push(worker_tag.to_string());
    }
}
