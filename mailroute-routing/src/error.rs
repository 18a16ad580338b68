//! Typed errors for routing lookups and routing-file loading.
//!
//! Lookup errors are scoped to a single recipient; configuration errors are
//! fatal only at startup, when there is no previous table to keep.

use std::{io, path::PathBuf};

use thiserror::Error;

/// A recipient could not be mapped to somewhere to deliver it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// No user entry matched and no fallback backend is configured.
    #[error("No backend configured for {0}")]
    NoBackend(String),

    /// A route names a backend that the routing file does not define.
    #[error("Unknown backend: {0}")]
    UnknownBackend(String),
}

/// The routing file could not be turned into a routing table.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Unable to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file is not valid YAML, or does not have the expected shape.
    #[error("Unable to parse routing configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The file parsed, but describes something unusable.
    #[error("Invalid routing configuration: {0}")]
    Invalid(String),
}
