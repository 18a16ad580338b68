//! Just enough LMTP to sit in the middle of a delivery.
//!
//! - [`server`]: accepts inbound LMTP sessions and hands each completed DATA
//!   transaction to an [`server::EnvelopeHandler`]
//! - [`client`]: speaks LMTP (or plain SMTP) to one backend for one message
//!
//! There is no extension negotiation, TLS or authentication on either side.

pub mod client;
pub mod data;
pub mod server;

pub use client::{ClientError, LmtpClient, Response};
pub use server::{
    BoundListener, EnvelopeHandler, ListenAddress, Listener, ServerTimeouts, Session,
    SessionConfig,
};
