use core::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which dialect a backend speaks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendProtocol {
    #[default]
    Lmtp,
    Smtp,
}

impl BackendProtocol {
    /// The greeting verb used after the banner
    pub const fn greeting_verb(self) -> &'static str {
        match self {
            Self::Lmtp => "LHLO",
            Self::Smtp => "EHLO",
        }
    }
}

/// Login details configured for a backend.
///
/// These are carried with the endpoint but never sent: the proxy does not
/// authenticate to backends.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where a named backend can be reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEndpoint {
    Unix {
        path: PathBuf,
        protocol: BackendProtocol,
    },
    Tcp {
        host: String,
        port: u16,
        protocol: BackendProtocol,
        credentials: Option<Credentials>,
    },
}

impl BackendEndpoint {
    pub const fn protocol(&self) -> BackendProtocol {
        match self {
            Self::Unix { protocol, .. } | Self::Tcp { protocol, .. } => *protocol,
        }
    }

    pub const fn credentials(&self) -> Option<&Credentials> {
        match self {
            Self::Unix { .. } => None,
            Self::Tcp { credentials, .. } => credentials.as_ref(),
        }
    }
}

impl Display for BackendEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path, .. } => write!(f, "unix:{}", path.display()),
            Self::Tcp { host, port, .. } => write!(f, "{host}:{port}"),
        }
    }
}
