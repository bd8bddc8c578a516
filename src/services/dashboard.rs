// Dashboard service — typed projection of refresh state for the two
// dashboard surfaces (facility metrics, active alerts).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::refresh::{RefreshController, Subscription};
use crate::types::{Config, QuerySpec, RefreshReason, RefreshState, RefreshStatus, SnapshotSource};

pub const METRICS_QUERY: &str = "dashboard-metrics";
pub const ALERTS_QUERY: &str = "active-alerts";

/// Default cadence for the metrics card row.
const METRICS_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
/// Alerts refresh faster; they drive the attention banner.
const ALERTS_REFRESH_INTERVAL: Duration = Duration::from_secs(15);

/// Facility metrics as served by the operations API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub patients_registered: u32,
    pub patients_seen_today: u32,
    pub pending_referrals: u32,
    pub critical_alerts: u32,
    pub stock_outs: u32,
    pub staff_on_duty: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilityAlert {
    pub id: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertsSummary {
    #[serde(default)]
    pub alerts: Vec<FacilityAlert>,
}

/// Result envelope handed to the presentation layer.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DashboardResult<T> {
    Success {
        data: T,
        source: SnapshotSource,
        #[serde(rename = "isStale")]
        is_stale: bool,
    },
    Empty {
        message: String,
    },
    Error {
        message: String,
    },
}

/// Project one query's refresh state into a typed envelope.
///
/// A held snapshot always projects as Success — even mid-refresh or after a
/// downgraded failure — so the dashboard never blanks data it already has.
fn project<T: DeserializeOwned>(state: &RefreshState, empty_message: &str) -> DashboardResult<T> {
    match &state.snapshot {
        Some(snapshot) => match serde_json::from_value::<T>(snapshot.value.clone()) {
            Ok(data) => DashboardResult::Success {
                data,
                source: state.source,
                is_stale: state.is_stale(),
            },
            Err(e) => DashboardResult::Error {
                message: format!("Malformed snapshot: {}", e),
            },
        },
        None => match state.status {
            RefreshStatus::Error => DashboardResult::Error {
                message: state
                    .last_error
                    .as_ref()
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| "No data available".to_string()),
            },
            _ => DashboardResult::Empty {
                message: empty_message.to_string(),
            },
        },
    }
}

/// Owns the standard dashboard subscriptions for one facility view.
pub struct DashboardService {
    controller: Arc<RefreshController>,
    metrics: Subscription,
    alerts: Subscription,
}

impl DashboardService {
    /// Register the standard queries and start their schedulers. Per-query
    /// config overrides apply on top of the defaults.
    pub fn start(controller: &Arc<RefreshController>, config: &Config) -> Self {
        let metrics_spec = QuerySpec::new(METRICS_QUERY)
            .with_interval(METRICS_REFRESH_INTERVAL)
            .with_max_attempts(2)
            .apply_overrides(config.queries.get(METRICS_QUERY));
        let alerts_spec = QuerySpec::new(ALERTS_QUERY)
            .with_interval(ALERTS_REFRESH_INTERVAL)
            .with_max_attempts(2)
            .apply_overrides(config.queries.get(ALERTS_QUERY));

        Self {
            controller: controller.clone(),
            metrics: controller.subscribe(metrics_spec),
            alerts: controller.subscribe(alerts_spec),
        }
    }

    pub fn metrics(&self) -> DashboardResult<DashboardMetrics> {
        project(
            &self.metrics.current(),
            "Dashboard metrics will appear once the first sync completes.",
        )
    }

    pub fn alerts(&self) -> DashboardResult<AlertsSummary> {
        project(
            &self.alerts.current(),
            "No alerts yet — facility data is still syncing.",
        )
    }

    /// Pull-to-refresh: re-fetch both queries, serialized per query by the
    /// controller.
    pub async fn refresh_all(&self) {
        let _ = tokio::join!(
            self.controller
                .trigger_fetch(METRICS_QUERY, RefreshReason::ManualRefresh),
            self.controller
                .trigger_fetch(ALERTS_QUERY, RefreshReason::ManualRefresh),
        );
    }

    /// Wait for the next change on either query.
    pub async fn changed(&mut self) {
        tokio::select! {
            _ = self.metrics.changed() => {}
            _ = self.alerts.changed() => {}
        }
    }

    /// Navigate-away: release both subscriptions. Cached snapshots are
    /// retained for the next visit.
    pub fn stop(&self) {
        self.controller.unsubscribe(&self.metrics);
        self.controller.unsubscribe(&self.alerts);
    }
}
