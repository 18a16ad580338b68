//! The YAML routing file.
//!
//! ```yaml
//! config:
//!   fallback_backend: cyrus-unix
//!   localPartSuffix: "+"
//!   ignoreDomain: true
//! backends:
//!   cyrus-unix:
//!     socket: /run/cyrus/socket/lmtp
//!   cyrus-tcp:
//!     host: imap2.internal
//!     port: 2003
//! users:
//!   alice: cyrus-unix
//!   bob: cyrus-tcp
//!   mallory: reject
//! ```

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use mailroute_common::tracing;
use serde::{Deserialize, Serialize};

use crate::{
    endpoint::{BackendEndpoint, BackendProtocol, Credentials},
    error::ConfigError,
    normalize::Policy,
    table::{Route, RoutingTable},
};

const DEFAULT_LMTP_PORT: u16 = 24;

const fn default_lmtp_port() -> u16 {
    DEFAULT_LMTP_PORT
}

/// Top level of the routing file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub config: Settings,
    #[serde(default)]
    pub backends: HashMap<String, BackendConfig>,
    #[serde(default)]
    pub users: HashMap<String, String>,
}

/// The `config:` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fallback_backend: Option<String>,

    #[serde(
        rename = "localPartSuffix",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub local_part_suffix: Option<String>,

    #[serde(rename = "ignoreDomain", default)]
    pub ignore_domain: bool,
}

/// One entry under `backends:`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BackendConfig {
    Socket {
        socket: PathBuf,
        #[serde(default)]
        protocol: BackendProtocol,
    },
    Tcp {
        host: String,
        #[serde(default = "default_lmtp_port")]
        port: u16,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        user: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        password: Option<String>,
        #[serde(default)]
        protocol: BackendProtocol,
    },
}

impl BackendConfig {
    fn into_endpoint(self, name: &str) -> Result<BackendEndpoint, ConfigError> {
        Ok(match self {
            Self::Socket { socket, protocol } => {
                if socket.as_os_str().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "backend {name} has an empty socket path"
                    )));
                }
                BackendEndpoint::Unix {
                    path: socket,
                    protocol,
                }
            }
            Self::Tcp {
                host,
                port,
                user,
                password,
                protocol,
            } => {
                if host.is_empty() {
                    return Err(ConfigError::Invalid(format!("backend {name} has an empty host")));
                }
                let credentials = match (user, password) {
                    (Some(user), Some(password)) => Some(Credentials { user, password }),
                    (None, None) => None,
                    _ => {
                        return Err(ConfigError::Invalid(format!(
                            "backend {name} needs both user and password, or neither"
                        )));
                    }
                };
                BackendEndpoint::Tcp {
                    host,
                    port,
                    protocol,
                    credentials,
                }
            }
        })
    }
}

impl TryFrom<RoutingConfig> for RoutingTable {
    type Error = ConfigError;

    fn try_from(config: RoutingConfig) -> Result<Self, Self::Error> {
        let policy = Policy {
            suffix_delimiter: config.config.local_part_suffix,
            strip_domain: config.config.ignore_domain,
        };

        let backends = config
            .backends
            .into_iter()
            .map(|(name, backend)| {
                let endpoint = backend.into_endpoint(&name)?;
                Ok((name, endpoint))
            })
            .collect::<Result<HashMap<_, _>, ConfigError>>()?;

        // Keys are matched against lower-cased normalizer output
        let users = config
            .users
            .into_iter()
            .map(|(user, backend)| (user.to_lowercase(), Route::from_name(&backend)))
            .collect();

        let fallback = config
            .config
            .fallback_backend
            .filter(|name| !name.is_empty())
            .map(|name| Route::from_name(&name));

        let table = Self::new(users, fallback, policy, backends);

        for (user, backend) in table.dangling_routes() {
            tracing::warn!(user, backend, "Route points at an undefined backend");
        }

        Ok(table)
    }
}

/// Parse routing YAML into a table
///
/// # Errors
/// If the text is not a valid routing file
pub fn parse(text: &str) -> Result<RoutingTable, ConfigError> {
    let config: RoutingConfig = serde_yaml::from_str(text)?;
    RoutingTable::try_from(config)
}

/// Read and parse the routing file at `path`
///
/// # Errors
/// If the file cannot be read or is not a valid routing file
pub async fn load(path: &Path) -> Result<RoutingTable, ConfigError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    parse(&text)
}
