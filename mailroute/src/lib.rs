//! The mailroute LMTP routing proxy
//!
//! Wires the inbound listener, the routing table and the delivery engine
//! together, and owns process-level concerns: configuration, signals and
//! logging.

pub mod controller;
pub mod handler;

pub use controller::{Mailroute, SHUTDOWN_BROADCAST, Service};
pub use handler::RelayHandler;
