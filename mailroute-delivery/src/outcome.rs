use mailroute_common::{ReplyLine, Status};

/// What happened to one recipient.
///
/// Backend failures are values, never panics or early returns, so that one
/// recipient's trouble cannot disturb another's reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The backend accepted the message for this recipient
    Delivered,

    /// Refused by local policy before any backend was contacted
    Rejected { code: u16, message: Vec<u8> },

    /// The backend could not be reached or misbehaved
    BackendUnavailable(String),

    /// The backend answered with a 4xx/5xx for this recipient
    Refused { code: u16, message: Vec<u8> },
}

impl DeliveryOutcome {
    /// The fixed policy rejection for a recipient routed to `reject`
    pub fn rejected(recipient: &str) -> Self {
        Self::Rejected {
            code: Status::MailboxUnavailable.into(),
            message: format!("LMTP user {recipient} rejected. Please try again.").into_bytes(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::BackendUnavailable(reason.into())
    }

    #[inline]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// The reply line reported to the inbound peer for this recipient
    pub fn to_reply(&self) -> ReplyLine {
        match self {
            Self::Delivered => ReplyLine::new(Status::Ok, "2.0.0 Ok"),
            Self::Rejected { code, message } | Self::Refused { code, message } => {
                ReplyLine::from_bytes(*code, message)
            }
            Self::BackendUnavailable(reason) => ReplyLine::new(
                Status::ActionUnavailable,
                format!("4.4.0 Backend unavailable: {reason}"),
            ),
        }
    }
}
