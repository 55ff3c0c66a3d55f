//! Download descriptions: durable records of one multi-URL download request
//!
//! A description is the join between the durable queue file and the external
//! engine: the `RequestID` ties a persisted record to at most one live
//! engine submission. Persisted fields use the exact wire names of the
//! backing-file schema; transient bookkeeping (retry counters, engine
//! handle, previously observed byte counts) never leaves the process.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("invalid descriptor document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("descriptor list is not a JSON array")]
    NotAList,
}

pub type Result<T> = std::result::Result<T, DescriptorError>;

/// Transient per-execution state. Never serialized; rebuilt from zero on
/// every worker start, except the previously observed byte counters which
/// exist precisely to turn absolute engine totals into deltas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransientState {
    /// Retries consumed against the request-wide budget.
    pub current_retry_count: i32,
    /// Failed attempts on the currently selected URL.
    pub url_attempts: i32,
    /// Index into `urls` of the currently selected URL.
    pub current_url_index: usize,
    /// External engine handle, once the engine has acknowledged enqueue.
    pub cached_fetch_id: Option<String>,
    pub is_paused: bool,
    pub is_cancelled: bool,
    /// Last absolute byte total reported by the engine.
    pub last_seen_bytes: u64,
    /// Last progress percent reported by the engine.
    pub last_seen_percent: i32,
}

/// What to do after a failed transfer attempt on the current URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Per-URL budget remains, try the same URL again.
    RetrySameUrl,
    /// Current URL exhausted, fail over to the URL at this index.
    FailoverTo(usize),
    /// Request-wide budget exhausted, the request has failed.
    OutOfRetries,
}

/// One logical download request with candidate URLs in failover order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadDescription {
    #[serde(rename = "RequestID", default)]
    pub request_id: String,

    /// Candidate URLs; sequence order defines failover order.
    #[serde(rename = "URLs", default)]
    pub urls: Vec<String>,

    #[serde(rename = "DestLocation", default)]
    pub dest_location: String,

    #[serde(rename = "RequestPriority", default)]
    pub priority: i32,

    #[serde(rename = "GroupId", default)]
    pub group_id: i32,

    /// Retry budget shared across the whole request, all URLs combined.
    #[serde(rename = "MaxRetryCount", default)]
    pub max_retry_count: i32,

    /// Attempts allowed on a single URL before failing over to the next.
    #[serde(rename = "IndividualURLRetryCount", default)]
    pub individual_url_retry_count: i32,

    /// True once this request finished and must not be re-queued.
    #[serde(rename = "bHasCompleted", default)]
    pub has_completed: bool,

    #[serde(skip)]
    pub transient: TransientState,
}

impl DownloadDescription {
    pub fn new(request_id: impl Into<String>, urls: Vec<String>) -> Self {
        Self {
            request_id: request_id.into(),
            urls,
            ..Default::default()
        }
    }

    /// Equivalence used to decide whether incoming parameters should
    /// replace an already-queued description. This is deliberately not
    /// `PartialEq`: the incoming URL set only needs to be a subset of the
    /// existing one, so a request that lost a mirror is still "the same"
    /// while one that gained a URL or moved destination is not.
    pub fn is_equivalent_to(&self, incoming: &DownloadDescription) -> bool {
        self.request_id == incoming.request_id
            && self.max_retry_count == incoming.max_retry_count
            && self.has_completed == incoming.has_completed
            && self.individual_url_retry_count == incoming.individual_url_retry_count
            && self.priority == incoming.priority
            && incoming.urls.iter().all(|url| self.urls.contains(url))
            && self.dest_location == incoming.dest_location
    }

    /// URL currently selected for transfer.
    pub fn current_url(&self) -> Option<&str> {
        self.urls
            .get(self.transient.current_url_index)
            .map(String::as_str)
    }

    /// Record a failed attempt on the current URL and decide what happens
    /// next. A URL gets `individual_url_retry_count` attempts; moving to
    /// the next URL charges one retry against `max_retry_count`. The URL
    /// list is treated as a ring so short lists are revisited while the
    /// request-wide budget lasts.
    pub fn record_url_failure(&mut self) -> RetryDecision {
        if self.urls.is_empty() {
            return RetryDecision::OutOfRetries;
        }

        self.transient.url_attempts += 1;
        if self.transient.url_attempts < self.individual_url_retry_count {
            return RetryDecision::RetrySameUrl;
        }

        self.transient.current_retry_count += 1;
        if self.transient.current_retry_count > self.max_retry_count {
            return RetryDecision::OutOfRetries;
        }

        self.transient.url_attempts = 0;
        self.transient.current_url_index =
            (self.transient.current_url_index + 1) % self.urls.len();
        RetryDecision::FailoverTo(self.transient.current_url_index)
    }

    /// Fold a new absolute byte total into the transient counters and
    /// return the delta since the last observation.
    pub fn observe_total_bytes(&mut self, total_bytes: u64) -> u64 {
        let delta = total_bytes.saturating_sub(self.transient.last_seen_bytes);
        self.transient.last_seen_bytes = total_bytes;
        delta
    }

    /// Serialize one description to its flat JSON record.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize one description. Missing fields take their zero value;
    /// only a syntactically or structurally invalid document is an error.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Serialize the full ordered queue into its backing-file array form.
pub fn serialize_list(descriptions: &[DownloadDescription]) -> Result<String> {
    Ok(serde_json::to_string(descriptions)?)
}

/// Deserialize the backing-file array. An unparseable document fails the
/// whole queue; a malformed individual element yields `None` in its slot
/// so the remaining entries survive. Callers skip the null placeholders.
pub fn deserialize_list(text: &str) -> Result<Vec<Option<DownloadDescription>>> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let serde_json::Value::Array(elements) = value else {
        return Err(DescriptorError::NotAList);
    };

    Ok(elements
        .into_iter()
        .map(|element| serde_json::from_value::<DownloadDescription>(element).ok())
        .collect())
}
