//! Presentation-facing services.
//!
//! Typed projections of controller state for the dashboard surfaces. The
//! services own the standard query subscriptions; rendering stays on the
//! other side of the serialized envelopes.

pub mod dashboard;
