//! Download worker orchestrator
//!
//! Drives one worker execution: submit the queue to the external engine,
//! poll for progress and liveness on a cooperative ~500ms loop, let the
//! engine callbacks decide the result, then clean up. The result cell is
//! write-once, so callbacks racing the worker's own error path can never
//! produce a second outcome; the loser of the race is logged and dropped.

use crate::descriptor::DownloadDescription;
use crate::engine::{CompletionReason, DownloadEngine, EngineListener};
use crate::error::Result;
use crate::humanize::ByteSize;
use crate::notification::{NotificationConfig, ResourceResolver};
use crate::observability::{Metrics, MetricsSnapshot};
use crate::params::{WorkParams, keys};
use crate::queue::{self, DownloadQueueDescription};
use crate::result::{Outcome, WorkStatus};
use crate::worker::{HostRuntime, WorkerConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Orchestrates one background download execution.
///
/// The engine handle is injected at construction; it may be shared by
/// other concurrently running workers, every engine operation being keyed
/// by request id or by this worker's tag.
pub struct DownloadWorker {
    work_id: String,
    params: WorkParams,
    config: WorkerConfig,
    engine: Arc<dyn DownloadEngine>,
    host: Arc<dyn HostRuntime>,
    notification: NotificationConfig,
    status: WorkStatus,
    metrics: Metrics,
    backing_file: Option<PathBuf>,
    group_id: i32,
    descriptions: Mutex<Vec<DownloadDescription>>,
    has_enqueued: AtomicBool,
    force_stopped: AtomicBool,
    cleanup_ran: AtomicBool,
}

impl DownloadWorker {
    pub fn new(
        work_id: impl Into<String>,
        params: WorkParams,
        engine: Arc<dyn DownloadEngine>,
        host: Arc<dyn HostRuntime>,
        resources: &dyn ResourceResolver,
        config: WorkerConfig,
    ) -> Arc<Self> {
        let notification = NotificationConfig::resolve(&params, resources);
        let backing_file = params.get_path(keys::QUEUE_FILE_PATH);
        let group_id = params.get_i32_or(keys::DOWNLOAD_GROUP_ID, 0);

        Arc::new(Self {
            work_id: work_id.into(),
            params,
            config,
            engine,
            host,
            notification,
            status: WorkStatus::new(),
            metrics: Metrics::new(),
            backing_file,
            group_id,
            descriptions: Mutex::new(Vec::new()),
            has_enqueued: AtomicBool::new(false),
            force_stopped: AtomicBool::new(false),
            cleanup_ran: AtomicBool::new(false),
        })
    }

    pub fn work_id(&self) -> &str {
        &self.work_id
    }

    pub fn status(&self) -> &WorkStatus {
        &self.status
    }

    pub fn notification(&self) -> &NotificationConfig {
        &self.notification
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Execute the work body to its committed result.
    ///
    /// Returns exactly one of Success, Failure or Retry. Any fault in the
    /// body is caught here and forced into Failure, unless the body (or a
    /// callback) already committed something more specific.
    pub async fn run(self: Arc<Self>) -> Outcome {
        self.status.begin();
        info!(work = %self.work_id, "download worker starting");
        self.host.on_work_started(&self.work_id);

        let listener: Arc<dyn EngineListener> = self.clone();
        if let Err(e) = self.execute(listener).await {
            error!(work = %self.work_id, error = %e, "download worker body failed");
            if self.status.commit_failure() {
                self.metrics.result_committed();
            } else {
                warn!(
                    work = %self.work_id,
                    outcome = ?self.status.outcome(),
                    "fault after a result was already committed, keeping committed outcome"
                );
            }
        }

        self.cleanup().await;

        let outcome = self.status.final_outcome();
        info!(work = %self.work_id, ?outcome, "download worker stopped");
        self.host.on_work_stopped(&self.work_id, outcome);
        outcome
    }

    async fn execute(&self, listener: Arc<dyn EngineListener>) -> Result<()> {
        // Foreground promotion is best-effort: the downloads proceed even
        // if the host cannot raise the notification.
        if let Err(e) = self.host.promote_to_foreground(&self.notification) {
            warn!(work = %self.work_id, error = %e, "foreground promotion failed");
        }

        let mut queue = DownloadQueueDescription::from_params(&self.params)?;
        if queue.is_empty() {
            // Retrying cannot fix a configuration defect.
            warn!(work = %self.work_id, "queue has no download descriptions, failing work");
            if self.status.commit_failure() {
                self.metrics.result_committed();
            }
            return Ok(());
        }

        info!(
            work = %self.work_id,
            requests = queue.len(),
            max_concurrent = queue.max_concurrent_downloads,
            "submitting download queue to engine"
        );
        *self
            .descriptions
            .lock()
            .unwrap_or_else(|poison| poison.into_inner()) = queue.descriptions.clone();
        queue.attach_listener(listener);
        self.engine.submit(&self.work_id, &queue).await?;

        self.tick_loop().await;
        Ok(())
    }

    /// Cooperative poll loop. Runs until a callback commits a result or
    /// the host forces a stop; the loop itself never commits anything.
    async fn tick_loop(&self) {
        while !self.force_stopped.load(Ordering::SeqCst) && !self.status.has_result() {
            if self.has_enqueued.load(Ordering::SeqCst) {
                self.engine.refresh_group_progress(self.group_id);
                self.engine.verify_transfers(self.group_id);
                self.host.on_tick();
                self.metrics.tick();
            }
            tokio::time::sleep(self.config.tick_interval).await;
        }
    }

    /// Host-initiated stop, e.g. the OS reclaiming resources. Cleanup is
    /// idempotent against the normal termination path since both can race.
    pub async fn stop(&self) {
        info!(work = %self.work_id, "worker stop requested");
        self.force_stopped.store(true, Ordering::SeqCst);
        self.cleanup().await;
    }

    async fn cleanup(&self) {
        if self.cleanup_ran.swap(true, Ordering::SeqCst) {
            debug!(work = %self.work_id, "cleanup already ran");
            return;
        }

        self.engine.stop_all(&self.work_id).await;

        // The backing file only goes away on a terminal, non-retry
        // outcome; a Retry keeps it so the re-scheduled worker resumes
        // the same queue.
        if self.status.is_terminal() {
            if let Some(path) = &self.backing_file {
                match queue::remove_backing_file(path) {
                    Ok(()) => debug!(work = %self.work_id, path = %path.display(), "backing file removed"),
                    Err(e) => warn!(
                        work = %self.work_id,
                        path = %path.display(),
                        error = %e,
                        "failed to remove backing file"
                    ),
                }
            }
        }
    }

    /// Records a finished description as completed and rewrites the
    /// backing file in place, so a re-scheduled worker re-reports the
    /// success instead of transferring the request again.
    fn persist_completion(&self, request_id: &str) {
        let mut descriptions = self
            .descriptions
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let Some(description) = descriptions
            .iter_mut()
            .find(|d| d.request_id == request_id)
        else {
            warn!(work = %self.work_id, request_id, "completion for unknown request id");
            return;
        };
        if description.has_completed {
            return;
        }
        description.has_completed = true;

        if let Some(path) = &self.backing_file {
            match queue::write_backing_file(path, &descriptions) {
                Ok(()) => debug!(
                    work = %self.work_id,
                    request_id,
                    path = %path.display(),
                    "completion persisted"
                ),
                Err(e) => warn!(
                    work = %self.work_id,
                    request_id,
                    path = %path.display(),
                    error = %e,
                    "failed to persist completion"
                ),
            }
        }
    }

    /// Pass-through to the engine; it is the source of truth for pause
    /// state, no local state changes.
    pub fn pause(&self, request_id: &str) {
        self.engine.pause(request_id);
    }

    pub fn resume(&self, request_id: &str) {
        self.engine.resume(request_id);
    }

    pub fn cancel(&self, request_id: &str) {
        self.engine.cancel(request_id);
    }
}

impl EngineListener for DownloadWorker {
    fn on_download_enqueued(&self, request_id: &str, succeeded: bool) {
        if !succeeded {
            // Engine-level submission retry; deliberately not charged
            // against the description's own transfer retry budget.
            warn!(work = %self.work_id, request_id, "enqueue failed, requesting engine retry");
            self.metrics.enqueue_retry();
            self.engine.retry_enqueue(request_id);
        }
        self.has_enqueued.store(true, Ordering::SeqCst);
    }

    fn on_progress(&self, request_id: &str, bytes_since_last: u64, total_bytes: u64) {
        debug!(
            work = %self.work_id,
            request_id,
            delta = %ByteSize(bytes_since_last),
            total = %ByteSize(total_bytes),
            "download progress"
        );
        // Forwarded unconditionally, even after a committed result.
        self.host.on_progress(request_id, bytes_since_last, total_bytes);
    }

    fn on_group_progress(&self, group_id: i32, percent: i32, indeterminate: bool) {
        // Known limitation: groups are not distinguished here, a single
        // notification surface is maintained however many groups report.
        debug!(work = %self.work_id, group_id, percent, "group progress");
        self.notification
            .set_progress(percent.max(0) as u32, indeterminate);
        self.host.render_notification(&self.notification);
    }

    fn on_download_complete(&self, request_id: &str, location: &str, reason: CompletionReason) {
        info!(work = %self.work_id, request_id, ?reason, "download complete");
        if reason == CompletionReason::Success {
            self.persist_completion(request_id);
        }
        self.host.on_download_complete(
            request_id,
            location,
            reason == CompletionReason::Success,
        );
    }

    fn on_all_downloads_complete(&self, all_succeeded: bool) {
        if self.status.has_result() || self.force_stopped.load(Ordering::SeqCst) {
            debug!(
                work = %self.work_id,
                all_succeeded,
                "late aggregate completion ignored"
            );
            self.metrics.late_callback();
            return;
        }

        self.notification.set_progress(100, false);
        self.host.render_notification(&self.notification);

        self.host.on_all_complete(all_succeeded, &self.status);
        if self.status.has_result() {
            // The upward consumer committed a more specific outcome.
            return;
        }

        // Bias toward Retry on partial failure: the request gets another
        // chance under the host's backoff policy rather than failing.
        let committed = if all_succeeded {
            self.status.commit_success()
        } else {
            self.status.commit_retry()
        };
        if committed {
            self.metrics.result_committed();
        } else {
            warn!(
                work = %self.work_id,
                outcome = ?self.status.outcome(),
                "aggregate completion raced an already-committed result"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;
    use crate::worker::NullHost;
    use std::time::Duration;

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            tick_interval: Duration::from_millis(10),
        }
    }

    struct NoIcons;

    impl ResourceResolver for NoIcons {
        fn resolve_icon(&self, _: &str, _: &str, _: &str) -> Option<crate::notification::ResourceId> {
            None
        }

        fn platform_fallback_icon(&self) -> crate::notification::ResourceId {
            crate::notification::ResourceId(0)
        }
    }

    #[tokio::test]
    async fn test_empty_queue_fails_without_submitting() {
        let engine = Arc::new(MockEngine::new());
        let worker = DownloadWorker::new(
            "w-empty",
            WorkParams::new(),
            engine.clone(),
            Arc::new(NullHost),
            &NoIcons,
            fast_config(),
        );

        let outcome = worker.clone().run().await;
        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(engine.submissions(), 0);
        assert!(worker.status().is_terminal());
    }

    #[tokio::test]
    async fn test_keyed_operations_pass_through() {
        let engine = Arc::new(MockEngine::new());
        let worker = DownloadWorker::new(
            "w-ops",
            WorkParams::new(),
            engine.clone(),
            Arc::new(NullHost),
            &NoIcons,
            fast_config(),
        );

        worker.pause("r1");
        worker.resume("r1");
        worker.cancel("r2");

        assert_eq!(
            engine.ops(),
            vec!["pause:r1", "resume:r1", "cancel:r2"]
        );
    }

    #[tokio::test]
    async fn test_single_notification_surface_across_groups() {
        let mut params = WorkParams::new();
        params.set(keys::DOWNLOAD_GROUP_ID, "7");

        let engine = Arc::new(MockEngine::new());
        let worker = DownloadWorker::new(
            "w-groups",
            params,
            engine,
            Arc::new(NullHost),
            &NoIcons,
            fast_config(),
        );

        worker.on_group_progress(7, 40, false);
        assert_eq!(worker.notification().progress(), (40, false));

        // A second group shares the same surface; latest write wins.
        worker.on_group_progress(99, 90, false);
        assert_eq!(worker.notification().progress(), (90, false));
    }
}
