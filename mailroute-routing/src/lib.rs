//! Recipient routing for the mailroute proxy
//!
//! This crate owns everything that decides *where* a recipient goes:
//! - Normalising raw recipient addresses into lookup keys
//! - The immutable [`RoutingTable`] snapshot and its backend endpoints
//! - Parsing the YAML routing file
//! - Atomically swapping snapshots on reload via [`ConfigReloader`]

mod config;
mod endpoint;
mod error;
mod normalize;
mod reloader;
mod shared;
mod table;

pub use config::{BackendConfig, RoutingConfig, Settings, load, parse};
pub use endpoint::{BackendEndpoint, BackendProtocol, Credentials};
pub use error::{ConfigError, RoutingError};
pub use normalize::{Policy, normalize};
pub use reloader::{ConfigReloader, ReloadHandle, ReloadRequest, ReloadState};
pub use shared::SharedRoutingTable;
pub use table::{REJECT, Route, RoutingTable};
