//! Error types for the LMTP client.

use std::io;

use thiserror::Error;

/// Errors that can occur when using the LMTP client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// IO error occurred during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Failed to parse a reply from the server.
    #[error("Failed to parse reply: {0}")]
    ParseError(String),

    /// Connection was closed unexpectedly.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,
}

/// Specialized `Result` type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
