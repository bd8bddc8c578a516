//! Connectivity monitor and reachability probe.
//!
//! The monitor turns raw probe readings into discrete online/offline edges:
//! consecutive identical readings produce no event, and subscribing never
//! produces a synthetic edge at startup. Consumers read the current state
//! and await genuine transitions through a watch channel.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use url::Url;

/// Raw reading from a platform network-status primitive. Only the boolean
/// edge is consumed by the refresh layer; type and strength are carried for
/// diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityReading {
    pub is_connected: bool,
    #[serde(default)]
    pub network_type: NetworkType,
    #[serde(default)]
    pub strength: Option<u8>,
}

impl ConnectivityReading {
    pub fn online() -> Self {
        Self {
            is_connected: true,
            network_type: NetworkType::Unknown,
            strength: None,
        }
    }

    pub fn offline() -> Self {
        Self {
            is_connected: false,
            network_type: NetworkType::Unknown,
            strength: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Wifi,
    Cellular,
    Ethernet,
    #[default]
    Unknown,
}

/// A genuine online/offline transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    WentOnline,
    WentOffline,
}

/// Deduplicating edge detector over probe readings.
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// `initially_online` seeds the current state; the first reading that
    /// matches it emits nothing.
    pub fn new(initially_online: bool) -> Self {
        let (tx, _) = watch::channel(initially_online);
        Self { tx }
    }

    /// Feed one probe reading. Returns the edge if the state actually
    /// changed, None for a repeat reading.
    pub fn report(&self, reading: &ConnectivityReading) -> Option<ConnectivityEvent> {
        let next = reading.is_connected;
        let changed = self.tx.send_if_modified(|current| {
            if *current != next {
                *current = next;
                true
            } else {
                false
            }
        });

        if !changed {
            return None;
        }

        let event = if next {
            ConnectivityEvent::WentOnline
        } else {
            ConnectivityEvent::WentOffline
        };
        log::info!(
            "Connectivity: {}",
            match event {
                ConnectivityEvent::WentOnline => "went online",
                ConnectivityEvent::WentOffline => "went offline",
            }
        );
        Some(event)
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Subscribe to state changes. The receiver starts with the current
    /// value already marked seen, so only real edges wake the caller.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        let mut rx = self.tx.subscribe();
        rx.borrow_and_update();
        rx
    }
}

/// Background task that feeds the monitor from a lightweight HTTP request
/// against the operations API host. The monitor itself never polls.
pub struct ReachabilityProbe {
    client: reqwest::Client,
    endpoint: Url,
    interval: Duration,
}

impl ReachabilityProbe {
    pub fn new(base_url: &str, interval: Duration, timeout: Duration) -> Result<Self, String> {
        let endpoint = Url::parse(base_url).map_err(|e| format!("Invalid probe URL: {}", e))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("Failed to build probe client: {}", e))?;
        Ok(Self {
            client,
            endpoint,
            interval,
        })
    }

    /// Check reachability once. Any HTTP response, success or not, means the
    /// network path is up; only a transport failure reads as offline.
    pub async fn check(&self) -> ConnectivityReading {
        match self.client.head(self.endpoint.clone()).send().await {
            Ok(_) => ConnectivityReading::online(),
            Err(e) => {
                log::debug!("Connectivity probe: unreachable: {}", e);
                ConnectivityReading::offline()
            }
        }
    }

    /// Long-lived probe loop. Runs until the owning runtime shuts down.
    pub async fn run(self, monitor: Arc<ConnectivityMonitor>) {
        log::info!(
            "Connectivity probe: watching {} every {:?}",
            self.endpoint,
            self.interval
        );
        loop {
            let reading = self.check().await;
            monitor.report(&reading);
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_readings_emit_nothing() {
        let monitor = ConnectivityMonitor::new(true);
        assert_eq!(monitor.report(&ConnectivityReading::online()), None);
        assert_eq!(monitor.report(&ConnectivityReading::online()), None);
        assert!(monitor.is_online());
    }

    #[test]
    fn test_each_flip_emits_exactly_one_edge() {
        let monitor = ConnectivityMonitor::new(true);
        assert_eq!(
            monitor.report(&ConnectivityReading::offline()),
            Some(ConnectivityEvent::WentOffline)
        );
        assert_eq!(monitor.report(&ConnectivityReading::offline()), None);
        assert_eq!(
            monitor.report(&ConnectivityReading::online()),
            Some(ConnectivityEvent::WentOnline)
        );
    }

    #[tokio::test]
    async fn test_subscribe_sees_no_synthetic_startup_edge() {
        let monitor = ConnectivityMonitor::new(true);
        let rx = monitor.subscribe();

        // A repeat of the current state must not wake subscribers
        monitor.report(&ConnectivityReading::online());
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_subscriber_wakes_on_genuine_edge() {
        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.subscribe();

        monitor.report(&ConnectivityReading::offline());
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
    }

    #[test]
    fn test_reading_deserializes_from_platform_payload() {
        let reading: ConnectivityReading = serde_json::from_str(
            r#"{"isConnected": true, "networkType": "cellular", "strength": 3}"#,
        )
        .unwrap();
        assert!(reading.is_connected);
        assert_eq!(reading.network_type, NetworkType::Cellular);
        assert_eq!(reading.strength, Some(3));
    }
}
