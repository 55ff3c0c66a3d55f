//! Download queue description and its durable backing file
//!
//! The queue is a pure data holder built once per worker execution from
//! the durable work parameters. Order is caller-supplied submission order
//! and is preserved as-is. An empty queue is constructed without error;
//! rejecting it is the orchestrator's job at start-of-work.

use crate::descriptor::{self, DescriptorError, DownloadDescription};
use crate::engine::EngineListener;
use crate::params::{WorkParams, keys};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: i32 = 4;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("backing file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// Outcome of merging an incoming description into the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// An equivalent description is already queued; incoming is dropped.
    KeptExisting,
    /// Same request id but materially different parameters; replaced.
    Replaced,
    /// No description with this request id existed; appended.
    Added,
}

/// Ordered collection of download descriptions plus the group-level
/// settings forwarded to the external engine.
pub struct DownloadQueueDescription {
    pub descriptions: Vec<DownloadDescription>,
    pub group_id: i32,
    pub max_concurrent_downloads: i32,
    pub backing_file: Option<PathBuf>,
    listener: Option<Arc<dyn EngineListener>>,
}

impl fmt::Debug for DownloadQueueDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadQueueDescription")
            .field("descriptions", &self.descriptions.len())
            .field("group_id", &self.group_id)
            .field("max_concurrent_downloads", &self.max_concurrent_downloads)
            .field("backing_file", &self.backing_file)
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

impl DownloadQueueDescription {
    pub fn new(descriptions: Vec<DownloadDescription>, group_id: i32) -> Self {
        Self {
            descriptions,
            group_id,
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            backing_file: None,
            listener: None,
        }
    }

    /// Build the queue from durable work parameters: resolve the backing
    /// file path, parse whatever it holds (absent path means an empty
    /// queue) and resolve the concurrency ceiling with its default.
    pub fn from_params(params: &WorkParams) -> Result<Self> {
        let backing_file = params.get_path(keys::QUEUE_FILE_PATH);

        let descriptions = match &backing_file {
            Some(path) if path.exists() => load_backing_file(path)?,
            Some(path) => {
                debug!(path = %path.display(), "backing file absent, starting with empty queue");
                Vec::new()
            }
            None => Vec::new(),
        };

        Ok(Self {
            descriptions,
            group_id: params.get_i32_or(keys::DOWNLOAD_GROUP_ID, 0),
            max_concurrent_downloads: params
                .get_i32_or(keys::MAX_CONCURRENT_DOWNLOADS, DEFAULT_MAX_CONCURRENT_DOWNLOADS),
            backing_file,
            listener: None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.descriptions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.descriptions.len()
    }

    pub fn attach_listener(&mut self, listener: Arc<dyn EngineListener>) {
        self.listener = Some(listener);
    }

    pub fn listener(&self) -> Option<Arc<dyn EngineListener>> {
        self.listener.clone()
    }

    pub fn find(&self, request_id: &str) -> Option<&DownloadDescription> {
        self.descriptions
            .iter()
            .find(|d| d.request_id == request_id)
    }

    /// Decide whether an incoming description should replace in-flight
    /// work. Equivalent parameters keep the existing entry (and whatever
    /// transfer progress it represents); anything materially new replaces
    /// it in place, preserving queue order.
    pub fn merge(&mut self, incoming: DownloadDescription) -> MergeOutcome {
        match self
            .descriptions
            .iter_mut()
            .find(|d| d.request_id == incoming.request_id)
        {
            Some(existing) if existing.is_equivalent_to(&incoming) => MergeOutcome::KeptExisting,
            Some(existing) => {
                warn!(
                    request_id = %incoming.request_id,
                    "queued description superseded by incoming parameters"
                );
                *existing = incoming;
                MergeOutcome::Replaced
            }
            None => {
                self.descriptions.push(incoming);
                MergeOutcome::Added
            }
        }
    }
}

/// Read and parse the backing file, skipping null placeholder slots left
/// by malformed elements.
pub fn load_backing_file(path: &Path) -> Result<Vec<DownloadDescription>> {
    let text = fs::read_to_string(path)?;
    let slots = descriptor::deserialize_list(&text)?;

    let total = slots.len();
    let descriptions: Vec<DownloadDescription> = slots.into_iter().flatten().collect();
    if descriptions.len() < total {
        warn!(
            path = %path.display(),
            skipped = total - descriptions.len(),
            "backing file contained malformed descriptions"
        );
    }

    Ok(descriptions)
}

/// Persist the full queue, replacing the whole file on every write.
pub fn write_backing_file(path: &Path, descriptions: &[DownloadDescription]) -> Result<()> {
    let text = descriptor::serialize_list(descriptions)?;
    fs::write(path, text)?;
    Ok(())
}

/// Delete the backing file with delete-if-exists semantics, so terminal
/// cleanup and a racing forced stop can both run it safely.
pub fn remove_backing_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn description(id: &str, urls: &[&str]) -> DownloadDescription {
        let mut d = DownloadDescription::new(id, urls.iter().map(|u| u.to_string()).collect());
        d.dest_location = format!("/downloads/{id}");
        d
    }

    fn params_with_file(path: &Path) -> WorkParams {
        let mut params = WorkParams::new();
        params.set(keys::QUEUE_FILE_PATH, path.to_string_lossy().to_string());
        params
    }

    #[test]
    fn test_from_params_reads_backing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.json");
        let list = vec![description("r1", &["https://a"]), description("r2", &["https://b"])];
        write_backing_file(&path, &list).unwrap();

        let mut params = params_with_file(&path);
        params
            .set(keys::MAX_CONCURRENT_DOWNLOADS, "2")
            .set(keys::DOWNLOAD_GROUP_ID, "9");

        let queue = DownloadQueueDescription::from_params(&params).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.descriptions[0].request_id, "r1");
        assert_eq!(queue.max_concurrent_downloads, 2);
        assert_eq!(queue.group_id, 9);
        assert_eq!(queue.backing_file, Some(path));
    }

    #[test]
    fn test_from_params_defaults() {
        let queue = DownloadQueueDescription::from_params(&WorkParams::new()).unwrap();
        assert!(queue.is_empty());
        assert_eq!(
            queue.max_concurrent_downloads,
            DEFAULT_MAX_CONCURRENT_DOWNLOADS
        );
        assert_eq!(queue.backing_file, None);
    }

    #[test]
    fn test_from_params_absent_file_is_empty_queue() {
        let dir = TempDir::new().unwrap();
        let params = params_with_file(&dir.path().join("missing.json"));
        let queue = DownloadQueueDescription::from_params(&params).unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_load_skips_malformed_slots() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.json");
        fs::write(&path, r#"[{"RequestID": "r1"}, 13, {"RequestID": "r2"}]"#).unwrap();

        let descriptions = load_backing_file(&path).unwrap();
        assert_eq!(descriptions.len(), 2);
        assert_eq!(descriptions[1].request_id, "r2");
    }

    #[test]
    fn test_load_fails_on_unparseable_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.json");
        fs::write(&path, "{}").unwrap();
        assert!(load_backing_file(&path).is_err());
    }

    #[test]
    fn test_write_replaces_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.json");

        write_backing_file(&path, &[description("r1", &["https://a"])]).unwrap();
        write_backing_file(&path, &[description("r2", &["https://b"])]).unwrap();

        let descriptions = load_backing_file(&path).unwrap();
        assert_eq!(descriptions.len(), 1);
        assert_eq!(descriptions[0].request_id, "r2");
    }

    #[test]
    fn test_remove_is_delete_if_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.json");
        write_backing_file(&path, &[]).unwrap();

        remove_backing_file(&path).unwrap();
        assert!(!path.exists());
        // Second removal must not fail.
        remove_backing_file(&path).unwrap();
    }

    #[test]
    fn test_merge_rules() {
        let mut queue =
            DownloadQueueDescription::new(vec![description("r1", &["https://a", "https://b"])], 0);

        // Subset of existing URLs: equivalent, keep the queued entry.
        let outcome = queue.merge(description("r1", &["https://a"]));
        assert_eq!(outcome, MergeOutcome::KeptExisting);
        assert_eq!(queue.descriptions[0].urls.len(), 2);

        // New URL: replacement in place.
        let outcome = queue.merge(description("r1", &["https://a", "https://c"]));
        assert_eq!(outcome, MergeOutcome::Replaced);
        assert!(queue.descriptions[0].urls.contains(&"https://c".to_string()));
        assert_eq!(queue.len(), 1);

        // Unknown id: appended at the tail.
        let outcome = queue.merge(description("r2", &["https://d"]));
        assert_eq!(outcome, MergeOutcome::Added);
        assert_eq!(queue.len(), 2);
    }
}
