//! Composition root for the realtime engine.
//!
//! Wires the codec, transport, stores and pipeline together exactly once
//! (explicit construction, no global singleton) and owns the glue that
//! turns inbound channel events into store transitions.

pub mod reconnect;
pub mod services;
pub mod telemetry;

pub use reconnect::{ReconnectState, ReconnectionCoordinator};
pub use services::{ClientIdentity, ClientServices, SendOutcome};
