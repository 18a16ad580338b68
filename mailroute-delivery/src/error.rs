//! Typed failures of a single backend transaction.
//!
//! Only [`TransactionError::Refused`] carries a backend verdict; everything
//! else means the backend could not be used at all.

use mailroute_lmtp::ClientError;
use thiserror::Error;

use crate::DeliveryOutcome;

#[derive(Debug, Error)]
pub enum TransactionError {
    /// Failed to establish a connection to the backend.
    #[error("Connection to {endpoint} failed: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// A step did not complete in time.
    #[error("{0} timed out after {1}s")]
    Timeout(&'static str, u64),

    /// The backend refused the whole transaction at MAIL FROM or DATA.
    #[error("Backend refused {stage}: {code} {message}")]
    Refused {
        stage: &'static str,
        code: u16,
        message: String,
    },

    /// The backend answered with a reply that makes no sense at this point.
    #[error("Unexpected reply to {stage}: {code} {message}")]
    UnexpectedReply {
        stage: &'static str,
        code: u16,
        message: String,
    },

    /// Reading or writing failed, or the backend hung up.
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl From<TransactionError> for DeliveryOutcome {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::Refused { code, message, .. } => Self::Refused {
                code,
                message: message.into_bytes(),
            },
            other => Self::BackendUnavailable(other.to_string()),
        }
    }
}
