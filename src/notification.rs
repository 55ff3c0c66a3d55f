//! Foreground notification configuration
//!
//! Resolved once at worker start from the durable parameters, then only
//! the progress fields change. Every string falls back to a documented
//! literal; icon resources go through the injected [`ResourceResolver`]
//! and fall back to the platform default when lookup fails. A lookup
//! failure is only an error when the caller customized the triple:
//! "used default" and "explicit misconfiguration" log differently.
//!
//! Only one notification surface is maintained regardless of how many
//! download groups are active. Known limitation carried over from the
//! host platform, not something this layer tries to fix.

use crate::params::{WorkParams, keys};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::{debug, error};

pub const DEFAULT_CHANNEL_ID: &str = "backfetch-downloads";
pub const DEFAULT_CHANNEL_NAME: &str = "Background downloads";
pub const DEFAULT_CHANNEL_IMPORTANCE: i32 = 2;
pub const DEFAULT_NOTIFICATION_ID: i32 = 1;
pub const DEFAULT_CONTENT_TITLE: &str = "Downloading content";
pub const DEFAULT_CONTENT_TEXT: &str = "Download in progress";
pub const DEFAULT_CONTENT_COMPLETE_TEXT: &str = "Download complete";
pub const DEFAULT_CANCEL_TEXT: &str = "Cancel";

pub const DEFAULT_CANCEL_ICON: IconSpec = IconSpec {
    name: "ic_cancel",
    resource_type: "drawable",
    package: "",
};
pub const DEFAULT_SMALL_ICON: IconSpec = IconSpec {
    name: "ic_download",
    resource_type: "drawable",
    package: "",
};

/// Icon resource triple as it appears in the work parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IconSpec {
    pub name: &'static str,
    pub resource_type: &'static str,
    pub package: &'static str,
}

/// Opaque platform resource handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceId(pub i32);

/// Platform resource lookup, injected so tests can fake it.
pub trait ResourceResolver: Send + Sync {
    /// Resolve an icon triple to a platform resource, `None` on failure.
    fn resolve_icon(&self, name: &str, resource_type: &str, package: &str) -> Option<ResourceId>;

    /// Last-resort icon that always exists on the platform.
    fn platform_fallback_icon(&self) -> ResourceId;
}

/// Resolved notification configuration with live progress state.
#[derive(Debug)]
pub struct NotificationConfig {
    pub notification_id: i32,
    pub channel_id: String,
    pub channel_name: String,
    pub channel_importance: i32,
    pub content_title: String,
    pub content_text: String,
    pub content_complete_text: String,
    pub cancel_text: String,
    pub cancel_icon: ResourceId,
    pub small_icon: ResourceId,
    progress: AtomicU32,
    indeterminate: AtomicBool,
}

impl NotificationConfig {
    /// Resolve the full configuration from work parameters and defaults.
    pub fn resolve(params: &WorkParams, resolver: &dyn ResourceResolver) -> Self {
        Self {
            notification_id: params.get_i32_or(keys::NOTIFICATION_ID, DEFAULT_NOTIFICATION_ID),
            channel_id: params
                .get_str_or(keys::NOTIFICATION_CHANNEL_ID, DEFAULT_CHANNEL_ID)
                .to_string(),
            channel_name: params
                .get_str_or(keys::NOTIFICATION_CHANNEL_NAME, DEFAULT_CHANNEL_NAME)
                .to_string(),
            channel_importance: params
                .get_i32_or(keys::NOTIFICATION_CHANNEL_IMPORTANCE, DEFAULT_CHANNEL_IMPORTANCE),
            content_title: params
                .get_str_or(keys::NOTIFICATION_CONTENT_TITLE, DEFAULT_CONTENT_TITLE)
                .to_string(),
            content_text: params
                .get_str_or(keys::NOTIFICATION_CONTENT_TEXT, DEFAULT_CONTENT_TEXT)
                .to_string(),
            content_complete_text: params
                .get_str_or(
                    keys::NOTIFICATION_CONTENT_COMPLETE_TEXT,
                    DEFAULT_CONTENT_COMPLETE_TEXT,
                )
                .to_string(),
            cancel_text: params
                .get_str_or(keys::NOTIFICATION_CANCEL_TEXT, DEFAULT_CANCEL_TEXT)
                .to_string(),
            cancel_icon: resolve_icon(
                params,
                resolver,
                DEFAULT_CANCEL_ICON,
                keys::NOTIFICATION_CANCEL_ICON_NAME,
                keys::NOTIFICATION_CANCEL_ICON_TYPE,
                keys::NOTIFICATION_CANCEL_ICON_PACKAGE,
            ),
            small_icon: resolve_icon(
                params,
                resolver,
                DEFAULT_SMALL_ICON,
                keys::NOTIFICATION_SMALL_ICON_NAME,
                keys::NOTIFICATION_SMALL_ICON_TYPE,
                keys::NOTIFICATION_SMALL_ICON_PACKAGE,
            ),
            progress: AtomicU32::new(0),
            indeterminate: AtomicBool::new(true),
        }
    }

    /// Update the rendered progress. Concurrent updates are last-write-
    /// wins; only the latest rendered value matters.
    pub fn set_progress(&self, percent: u32, indeterminate: bool) {
        self.progress.store(percent.min(100), Ordering::SeqCst);
        self.indeterminate.store(indeterminate, Ordering::SeqCst);
    }

    pub fn progress(&self) -> (u32, bool) {
        (
            self.progress.load(Ordering::SeqCst),
            self.indeterminate.load(Ordering::SeqCst),
        )
    }
}

fn resolve_icon(
    params: &WorkParams,
    resolver: &dyn ResourceResolver,
    default: IconSpec,
    name_key: &str,
    type_key: &str,
    package_key: &str,
) -> ResourceId {
    let name = params.get_str_or(name_key, default.name);
    let resource_type = params.get_str_or(type_key, default.resource_type);
    let package = params.get_str_or(package_key, default.package);

    match resolver.resolve_icon(name, resource_type, package) {
        Some(id) => id,
        None => {
            let customized = name != default.name
                || resource_type != default.resource_type
                || package != default.package;
            if customized {
                error!(
                    name, resource_type, package,
                    "configured notification icon failed to resolve, using platform fallback"
                );
            } else {
                debug!(name, "default notification icon unavailable, using platform fallback");
            }
            resolver.platform_fallback_icon()
        }
    }
}
