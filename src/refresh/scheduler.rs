//! Per-query scheduler task.
//!
//! One long-lived task per subscribed query: arms the interval timer while
//! online, suspends it entirely while offline, and fires one immediate
//! fetch when connectivity is restored regardless of the interval elapsed.
//! Stops when the last subscriber leaves.

use std::sync::Arc;

use crate::types::RefreshReason;

use super::controller::{QueryEntry, RefreshController};

pub(crate) async fn run_query_scheduler(
    controller: Arc<RefreshController>,
    entry: Arc<QueryEntry>,
    epoch: u64,
) {
    let name = entry.spec.name.clone();
    let interval = entry.spec.refresh_interval;
    let mut connectivity = controller.connectivity_rx();

    log::debug!(
        "Refresh: {} scheduler started (interval {:?})",
        name,
        interval
    );

    let mut was_online = *connectivity.borrow_and_update();

    loop {
        // A resubscribe spawns a replacement task under a newer epoch
        if !entry.is_active() || entry.current_epoch() != epoch {
            break;
        }

        let online = *connectivity.borrow_and_update();
        if online && !was_online {
            // Resume with one immediate fetch, independent of the interval
            let _ = controller
                .trigger_fetch(&name, RefreshReason::ConnectivityRestored)
                .await;
        }
        was_online = online;

        if online && !interval.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let _ = controller
                        .trigger_fetch(&name, RefreshReason::Scheduled)
                        .await;
                }
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = entry.shutdown.notified() => break,
            }
        } else {
            // Offline (timer suspended) or interval disabled: only a
            // connectivity edge or shutdown wakes this task
            tokio::select! {
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = entry.shutdown.notified() => break,
            }
        }
    }

    log::debug!("Refresh: {} scheduler stopped", name);
}
