//! Delivery engine for the mailroute proxy
//!
//! Every recipient of an envelope is routed and delivered independently:
//! - [`DeliveryOrchestrator`] fans an envelope out, one task per recipient
//! - [`BackendClient`] performs a single outbound LMTP/SMTP transaction
//! - [`DeliveryOutcome`] records what happened, and becomes the recipient's reply

mod client;
mod config;
mod error;
mod header;
mod orchestrator;
mod outcome;
mod status_map;

pub use client::{BackendClient, LmtpBackendClient};
pub use config::{BackendTimeouts, DeliveryConfig};
pub use error::TransactionError;
pub use header::{PEER_HEADER, inject_peer_header};
pub use orchestrator::DeliveryOrchestrator;
pub use outcome::DeliveryOutcome;
pub use status_map::{RecipientStatus, RecipientStatuses};
