//! `fieldops` binary: wires the refresh layer for one facility and logs
//! dashboard state until interrupted.

use std::sync::Arc;
use std::time::Duration;

use fieldops::cache::JsonSnapshotStore;
use fieldops::connectivity::{ConnectivityMonitor, ReachabilityProbe};
use fieldops::refresh::RefreshController;
use fieldops::remote::HttpRemoteSource;
use fieldops::services::dashboard::DashboardService;
use fieldops::state;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match state::load_config() {
        Ok(c) => c,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    let store = match state::snapshots_path().and_then(JsonSnapshotStore::open) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            log::error!("Failed to open snapshot cache: {}", e);
            std::process::exit(1);
        }
    };

    let request_timeout = Duration::from_secs(config.request_timeout_secs);
    let remote = match HttpRemoteSource::new(
        &config.api_base_url,
        &config.facility_id,
        request_timeout,
    ) {
        Ok(r) => Arc::new(r),
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    // Assume online until the first probe reading says otherwise
    let monitor = Arc::new(ConnectivityMonitor::new(true));
    match ReachabilityProbe::new(
        &config.api_base_url,
        Duration::from_secs(config.probe_interval_secs),
        request_timeout,
    ) {
        Ok(probe) => {
            let probe_monitor = monitor.clone();
            tokio::spawn(probe.run(probe_monitor));
        }
        Err(e) => {
            log::warn!("Connectivity probe disabled: {}", e);
        }
    }

    let controller = Arc::new(RefreshController::new(
        remote,
        store,
        monitor.subscribe(),
        config.fetch_latency_budget_ms,
    ));

    let mut service = DashboardService::start(&controller, &config);
    log::info!(
        "FieldOps: dashboard refresh running for facility {}",
        config.facility_id
    );

    let mut rollup_timer = tokio::time::interval(Duration::from_secs(60));
    rollup_timer.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            _ = service.changed() => {
                let metrics = service.metrics();
                if let Ok(json) = serde_json::to_string(&metrics) {
                    log::info!("Dashboard: metrics {}", json);
                }
            }
            _ = rollup_timer.tick() => {
                for rollup in controller.latency_rollups().queries {
                    log::info!(
                        "Latency: {} p95={}ms violations={} degraded={}",
                        rollup.query,
                        rollup.p95_ms,
                        rollup.budget_violations,
                        rollup.degraded_count
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("FieldOps: shutting down");
                service.stop();
                break;
            }
        }
    }
}
