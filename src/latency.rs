//! In-memory fetch-latency rollups for dashboard diagnostics.
//!
//! Keeps a bounded sample window per query so p95 diagnostics can be
//! surfaced without persistent storage. Owned by the refresh controller,
//! not process-global; each controller instance accounts for its own
//! queries.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

const MAX_SAMPLES_PER_QUERY: usize = 256;

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryLatencyRollup {
    pub query: String,
    pub sample_count: usize,
    pub p50_ms: u128,
    pub p95_ms: u128,
    pub max_ms: u128,
    pub budget_ms: u128,
    pub budget_violations: u64,
    /// Fetches settled from the local cache instead of the remote.
    pub degraded_count: u64,
    pub last_recorded_at: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyRollupsPayload {
    pub generated_at: String,
    pub queries: Vec<QueryLatencyRollup>,
}

#[derive(Debug, Default)]
struct QueryWindow {
    samples_ms: VecDeque<u128>,
    budget_violations: u64,
    degraded_count: u64,
    last_recorded_at: Option<DateTime<Utc>>,
}

/// Bounded latency windows for every query a controller manages.
pub struct FetchLatency {
    windows: Mutex<HashMap<String, QueryWindow>>,
    budget_ms: u128,
}

impl FetchLatency {
    pub fn new(budget_ms: u128) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            budget_ms,
        }
    }

    pub fn record_fetch(&self, query: &str, elapsed_ms: u128) {
        let mut windows = self.windows.lock();
        let window = windows.entry(query.to_string()).or_default();
        if elapsed_ms > self.budget_ms {
            window.budget_violations += 1;
        }
        if window.samples_ms.len() >= MAX_SAMPLES_PER_QUERY {
            window.samples_ms.pop_front();
        }
        window.samples_ms.push_back(elapsed_ms);
        window.last_recorded_at = Some(Utc::now());
    }

    pub fn increment_degraded(&self, query: &str) {
        let mut windows = self.windows.lock();
        let window = windows.entry(query.to_string()).or_default();
        window.degraded_count += 1;
        if window.last_recorded_at.is_none() {
            window.last_recorded_at = Some(Utc::now());
        }
    }

    pub fn snapshot(&self) -> LatencyRollupsPayload {
        let windows = self.windows.lock();

        let mut queries: Vec<QueryLatencyRollup> = windows
            .iter()
            .map(|(query, window)| {
                let mut values: Vec<u128> = window.samples_ms.iter().copied().collect();
                values.sort_unstable();
                QueryLatencyRollup {
                    query: query.clone(),
                    sample_count: values.len(),
                    p50_ms: percentile(&values, 50.0).unwrap_or(0),
                    p95_ms: percentile(&values, 95.0).unwrap_or(0),
                    max_ms: values.last().copied().unwrap_or(0),
                    budget_ms: self.budget_ms,
                    budget_violations: window.budget_violations,
                    degraded_count: window.degraded_count,
                    last_recorded_at: window.last_recorded_at.map(|dt| dt.to_rfc3339()),
                }
            })
            .collect();

        queries.sort_by(|a, b| b.p95_ms.cmp(&a.p95_ms).then(a.query.cmp(&b.query)));

        LatencyRollupsPayload {
            generated_at: Utc::now().to_rfc3339(),
            queries,
        }
    }
}

fn percentile(values: &[u128], p: f64) -> Option<u128> {
    if values.is_empty() {
        return None;
    }
    let n = values.len();
    let rank = ((p / 100.0) * n as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(n - 1);
    Some(values[idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_empty() {
        assert_eq!(percentile(&[], 95.0), None);
    }

    #[test]
    fn test_percentile_small_sample_sizes() {
        let values = vec![10_u128, 20, 30];
        assert_eq!(percentile(&values, 50.0), Some(20));
        assert_eq!(percentile(&values, 95.0), Some(30));
    }

    #[test]
    fn test_window_is_bounded() {
        let latency = FetchLatency::new(100);
        for ms in 1..=300 {
            latency.record_fetch("dashboard-metrics", ms);
        }
        let snapshot = latency.snapshot();
        let rollup = snapshot
            .queries
            .iter()
            .find(|q| q.query == "dashboard-metrics")
            .expect("rollup");
        assert_eq!(rollup.sample_count, MAX_SAMPLES_PER_QUERY);
        assert_eq!(rollup.max_ms, 300);
    }

    #[test]
    fn test_budget_violations_increment_only_on_exceed() {
        let latency = FetchLatency::new(100);
        latency.record_fetch("active-alerts", 95);
        latency.record_fetch("active-alerts", 100);
        latency.record_fetch("active-alerts", 101);
        latency.record_fetch("active-alerts", 300);

        let snapshot = latency.snapshot();
        let rollup = snapshot
            .queries
            .iter()
            .find(|q| q.query == "active-alerts")
            .expect("rollup");
        assert_eq!(rollup.budget_violations, 2);
    }

    #[test]
    fn test_degraded_counts_separately_from_samples() {
        let latency = FetchLatency::new(100);
        latency.increment_degraded("dashboard-metrics");
        latency.increment_degraded("dashboard-metrics");

        let snapshot = latency.snapshot();
        let rollup = &snapshot.queries[0];
        assert_eq!(rollup.degraded_count, 2);
        assert_eq!(rollup.sample_count, 0);
    }
}
