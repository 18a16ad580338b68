use std::{path::PathBuf, sync::Arc};

use mailroute_common::{Signal, internal, tracing};
use tokio::sync::{broadcast, mpsc};

use crate::{config, error::ConfigError, shared::SharedRoutingTable};

/// Ask the reloader to re-read the routing file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadRequest {
    pub source: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    Idle,
    Reloading,
}

/// Cloneable sender side of the reload queue
#[derive(Debug, Clone)]
pub struct ReloadHandle {
    sender: mpsc::Sender<ReloadRequest>,
}

impl ReloadHandle {
    /// Queue a reload.
    ///
    /// Returns `false` if the request was dropped, either because a reload is
    /// already queued (it will pick up the same file) or because the
    /// reloader has stopped.
    pub fn request(&self, source: &'static str) -> bool {
        match self.sender.try_send(ReloadRequest { source }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(source, "Reload already pending");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(source, "Reload requested but the reloader is not running");
                false
            }
        }
    }
}

/// Re-reads the routing file on request and publishes the result.
///
/// A failed reload leaves the published table exactly as it was.
#[derive(Debug)]
pub struct ConfigReloader {
    path: PathBuf,
    table: Arc<SharedRoutingTable>,
    state: ReloadState,
    requests: mpsc::Receiver<ReloadRequest>,
}

impl ConfigReloader {
    pub fn new(path: impl Into<PathBuf>, table: Arc<SharedRoutingTable>) -> (Self, ReloadHandle) {
        let (sender, requests) = mpsc::channel(1);

        (
            Self {
                path: path.into(),
                table,
                state: ReloadState::Idle,
                requests,
            },
            ReloadHandle { sender },
        )
    }

    #[inline]
    pub const fn state(&self) -> ReloadState {
        self.state
    }

    /// Read, parse and publish the routing file, returning the new user count
    ///
    /// # Errors
    /// If the file cannot be read or parsed; the current table is kept
    pub async fn reload(&mut self) -> Result<usize, ConfigError> {
        self.state = ReloadState::Reloading;
        let loaded = config::load(&self.path).await;
        self.state = ReloadState::Idle;

        let table = loaded?;
        let users = table.user_count();
        self.table.store(Arc::new(table));

        Ok(users)
    }

    /// Serve reload requests until shutdown, or until every handle is gone
    pub async fn serve(mut self, mut shutdown: broadcast::Receiver<Signal>) {
        internal!("Reloader watching {}", self.path.display());

        loop {
            tokio::select! {
                sig = shutdown.recv() => {
                    if matches!(sig, Ok(Signal::Shutdown) | Err(broadcast::error::RecvError::Closed)) {
                        internal!(level = DEBUG, "Reloader received shutdown");
                        return;
                    }
                }

                request = self.requests.recv() => {
                    let Some(request) = request else {
                        return;
                    };

                    match self.reload().await {
                        Ok(users) => tracing::info!(
                            source = request.source,
                            path = %self.path.display(),
                            users,
                            "Routing table reloaded"
                        ),
                        Err(err) => tracing::error!(
                            source = request.source,
                            path = %self.path.display(),
                            "Routing table reload failed, keeping previous table: {err}"
                        ),
                    }
                }
            }
        }
    }
}
