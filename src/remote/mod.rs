//! Remote data source — the operations API serving per-facility metrics.
//!
//! The controller talks to the remote through the [`RemoteSource`] trait so
//! tests can script outcomes; production uses the HTTP client in
//! [`client`].

pub mod client;

pub use client::{HttpRemoteSource, RemoteSource};
