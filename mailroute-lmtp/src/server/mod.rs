//! Inbound LMTP.

mod command;
mod listener;
mod session;

use std::future::Future;

use mailroute_common::{Envelope, ReplyLine};

pub use self::{
    command::Command,
    listener::{BoundListener, ListenAddress, Listener},
    session::{ServerTimeouts, Session, SessionConfig},
};

/// Receives every completed DATA transaction.
///
/// The returned replies are written to the peer in order, so there must be
/// exactly one per entry in [`Envelope::recipients`].
pub trait EnvelopeHandler: Send + Sync + 'static {
    fn handle(&self, envelope: Envelope) -> impl Future<Output = Vec<ReplyLine>> + Send;
}
