use std::sync::Arc;

/// One inbound DATA transaction: who sent it, who it is for, and the raw
/// message exactly as received (after dot-unstuffing).
///
/// An [`Envelope`] is immutable once built. The body is shared so that each
/// per-recipient delivery can hold it without copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    sender: String,
    recipients: Vec<String>,
    body: Arc<[u8]>,
    peer: String,
}

impl Envelope {
    #[must_use]
    pub fn new(
        sender: impl Into<String>,
        recipients: Vec<String>,
        body: impl Into<Arc<[u8]>>,
        peer: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipients,
            body: body.into(),
            peer: peer.into(),
        }
    }

    /// Returns the reverse-path given in `MAIL FROM`. May be empty for bounces.
    #[inline]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Returns the forward-paths in the order they were accepted
    #[inline]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Returns the raw message
    #[inline]
    pub fn body(&self) -> &Arc<[u8]> {
        &self.body
    }

    /// Returns the address of the peer which handed us this envelope
    #[inline]
    pub fn peer(&self) -> &str {
        &self.peer
    }
}
