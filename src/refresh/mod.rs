//! Data refresh controller.
//!
//! Decides, per named query, whether data comes from the remote source or
//! the local snapshot cache, applies the staleness policy, and reacts to
//! connectivity transitions. Subscribers get immutable state snapshots over
//! a watch channel; per-query scheduler tasks drive interval refreshes.

pub mod controller;
mod scheduler;

pub use controller::{RefreshController, Subscription};
