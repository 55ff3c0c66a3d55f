//! Durable work parameters handed to a worker by the host scheduler
//!
//! The host passes a flat string key/value map resolved from its own
//! persistence. Every accessor is total: a missing or unparseable value
//! falls back to the caller-supplied default, mirroring how the queue and
//! notification layers treat absent configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Well-known parameter keys.
pub mod keys {
    /// Path of the durable JSON backing file holding the download queue.
    pub const QUEUE_FILE_PATH: &str = "DownloadDescriptionListPath";
    /// Concurrency ceiling forwarded to the external engine.
    pub const MAX_CONCURRENT_DOWNLOADS: &str = "MaxConcurrentDownloadRequests";
    /// Group identifier used for progress aggregation.
    pub const DOWNLOAD_GROUP_ID: &str = "DownloadGroupId";

    pub const NOTIFICATION_ID: &str = "NotificationId";
    pub const NOTIFICATION_CHANNEL_ID: &str = "NotificationChannelId";
    pub const NOTIFICATION_CHANNEL_NAME: &str = "NotificationChannelName";
    pub const NOTIFICATION_CHANNEL_IMPORTANCE: &str = "NotificationChannelImportance";
    pub const NOTIFICATION_CONTENT_TITLE: &str = "NotificationContentTitle";
    pub const NOTIFICATION_CONTENT_TEXT: &str = "NotificationContentText";
    pub const NOTIFICATION_CONTENT_COMPLETE_TEXT: &str = "NotificationContentCompleteText";
    pub const NOTIFICATION_CANCEL_TEXT: &str = "NotificationCancelDownloadText";

    pub const NOTIFICATION_CANCEL_ICON_NAME: &str = "NotificationCancelIconName";
    pub const NOTIFICATION_CANCEL_ICON_TYPE: &str = "NotificationCancelIconType";
    pub const NOTIFICATION_CANCEL_ICON_PACKAGE: &str = "NotificationCancelIconPackage";
    pub const NOTIFICATION_SMALL_ICON_NAME: &str = "NotificationSmallIconName";
    pub const NOTIFICATION_SMALL_ICON_TYPE: &str = "NotificationSmallIconType";
    pub const NOTIFICATION_SMALL_ICON_PACKAGE: &str = "NotificationSmallIconPackage";
}

/// Flat key/value parameter map for one worker execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkParams {
    values: HashMap<String, String>,
}

impl WorkParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get_str(key).unwrap_or(default)
    }

    pub fn get_i64_or(&self, key: &str, default: i64) -> i64 {
        self.get_str(key)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(default)
    }

    pub fn get_i32_or(&self, key: &str, default: i32) -> i32 {
        self.get_i64_or(key, default as i64) as i32
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_str(key)
            .and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            })
            .unwrap_or(default)
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get_str(key).filter(|v| !v.is_empty()).map(PathBuf::from)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> WorkParams {
        let mut p = WorkParams::new();
        p.set(keys::QUEUE_FILE_PATH, "/tmp/queue.json")
            .set(keys::MAX_CONCURRENT_DOWNLOADS, "8")
            .set("Flag", "true")
            .set("BadNumber", "not-a-number");
        p
    }

    #[test]
    fn test_string_lookup_with_default() {
        let p = params();
        assert_eq!(p.get_str(keys::QUEUE_FILE_PATH), Some("/tmp/queue.json"));
        assert_eq!(p.get_str_or("Missing", "fallback"), "fallback");
    }

    #[test]
    fn test_numeric_lookup_falls_back_on_garbage() {
        let p = params();
        assert_eq!(p.get_i32_or(keys::MAX_CONCURRENT_DOWNLOADS, 4), 8);
        assert_eq!(p.get_i32_or("BadNumber", 4), 4);
        assert_eq!(p.get_i32_or("Missing", 4), 4);
    }

    #[test]
    fn test_bool_lookup() {
        let p = params();
        assert!(p.get_bool_or("Flag", false));
        assert!(!p.get_bool_or("BadNumber", false));
        assert!(p.get_bool_or("Missing", true));
    }

    #[test]
    fn test_path_lookup_ignores_empty() {
        let mut p = WorkParams::new();
        p.set(keys::QUEUE_FILE_PATH, "");
        assert_eq!(p.get_path(keys::QUEUE_FILE_PATH), None);

        p.set(keys::QUEUE_FILE_PATH, "/data/q.json");
        assert_eq!(
            p.get_path(keys::QUEUE_FILE_PATH),
            Some(PathBuf::from("/data/q.json"))
        );
    }
}
