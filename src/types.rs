//! Shared types: configuration document, query specs, and the refresh
//! state model published to subscribers.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RefreshError;

/// Default staleness threshold applied when a query doesn't override it.
pub const DEFAULT_STALE_AFTER_MS: u64 = 60_000;

/// Application configuration (~/.fieldops/config.json).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Base URL of the operations API, e.g. "https://api.example.org/v2/".
    pub api_base_url: String,
    /// Facility whose metrics this instance displays.
    pub facility_id: String,
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// p95 budget for a single fetch, used by the latency rollups.
    #[serde(default = "default_fetch_budget_ms")]
    pub fetch_latency_budget_ms: u64,
    /// Per-query overrides keyed by query name.
    #[serde(default)]
    pub queries: HashMap<String, QueryOverrides>,
}

fn default_probe_interval_secs() -> u64 {
    15
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_fetch_budget_ms() -> u64 {
    2_000
}

/// Optional per-query tuning from the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOverrides {
    pub refresh_interval_ms: Option<u64>,
    pub stale_after_ms: Option<u64>,
    pub max_attempts: Option<u32>,
}

/// A named query managed by the refresh controller.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub name: String,
    /// Extra request parameters forwarded to the remote source.
    pub params: Option<serde_json::Value>,
    /// Zero disables the interval timer (connectivity-restored fetches still fire).
    pub refresh_interval: Duration,
    pub stale_after: Duration,
    /// Remote attempts per fetch before falling back to cache. Minimum 1.
    pub max_attempts: u32,
}

impl QuerySpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: None,
            refresh_interval: Duration::ZERO,
            stale_after: Duration::from_millis(DEFAULT_STALE_AFTER_MS),
            max_attempts: 1,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Apply config-file overrides for this query, if any.
    pub fn apply_overrides(mut self, overrides: Option<&QueryOverrides>) -> Self {
        if let Some(o) = overrides {
            if let Some(ms) = o.refresh_interval_ms {
                self.refresh_interval = Duration::from_millis(ms);
            }
            if let Some(ms) = o.stale_after_ms {
                self.stale_after = Duration::from_millis(ms);
            }
            if let Some(n) = o.max_attempts {
                self.max_attempts = n.max(1);
            }
        }
        self
    }
}

/// An immutable point-in-time value for a query plus its retrieval timestamp.
/// Replaced wholesale on each successful fetch, never partially updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub value: serde_json::Value,
    pub retrieved_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn now(value: serde_json::Value) -> Self {
        Self {
            value,
            retrieved_at: Utc::now(),
        }
    }

    /// Age of this snapshot relative to the current clock.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.retrieved_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStatus {
    Idle,
    Loading,
    Error,
}

/// Where the currently held snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    Remote,
    Cache,
    None,
}

/// Why a fetch was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    Scheduled,
    ManualRefresh,
    ConnectivityRestored,
}

impl RefreshReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshReason::Scheduled => "scheduled",
            RefreshReason::ManualRefresh => "manual",
            RefreshReason::ConnectivityRestored => "connectivity-restored",
        }
    }
}

/// The per-query state published to subscribers.
///
/// All fields change together in a single watch-channel send; subscribers
/// never observe a new snapshot paired with a stale status.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshState {
    pub snapshot: Option<Snapshot>,
    pub status: RefreshStatus,
    pub last_error: Option<RefreshError>,
    pub source: SnapshotSource,
    stale_after: Duration,
}

impl RefreshState {
    /// Initial state before the first fetch settles.
    pub fn loading(stale_after: Duration) -> Self {
        Self {
            snapshot: None,
            status: RefreshStatus::Loading,
            last_error: None,
            source: SnapshotSource::None,
            stale_after,
        }
    }

    /// A snapshot older than the query's threshold is still displayed,
    /// just flagged for a visual cue. Never an error by itself.
    pub fn is_stale(&self) -> bool {
        match &self.snapshot {
            Some(snap) => {
                let threshold = chrono::Duration::from_std(self.stale_after)
                    .unwrap_or_else(|_| chrono::Duration::MAX);
                snap.age() > threshold
            }
            None => false,
        }
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }
}
