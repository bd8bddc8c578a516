//! Offline-tolerant data refresh layer for field operations dashboards.
//!
//! The presentation layer (web and mobile dashboard surfaces) reads named
//! metric snapshots through the refresh controller, which decides per query
//! whether data comes from the operations API or the local snapshot cache,
//! applies the staleness policy, and reacts to connectivity transitions.

pub mod cache;
pub mod connectivity;
pub mod error;
pub mod latency;
pub mod refresh;
pub mod remote;
pub mod services;
pub mod state;
pub mod types;
