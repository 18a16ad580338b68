use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, LazyLock},
};

use anyhow::Context;
use mailroute_common::{Signal, internal, logging, tracing};
use mailroute_delivery::{DeliveryConfig, DeliveryOrchestrator, LmtpBackendClient};
use mailroute_lmtp::{BoundListener, Listener};
use mailroute_routing::{ConfigReloader, ReloadHandle, RoutingTable, SharedRoutingTable};
use serde::Deserialize;
use tokio::{
    signal::unix::{SignalKind, signal},
    sync::broadcast,
};

use crate::RelayHandler;

/// The service configuration, usually read from `mailroute.config.ron`
#[derive(Debug, Deserialize)]
pub struct Mailroute {
    pub listener: Listener,
    /// Path of the YAML routing file
    pub routing: PathBuf,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    // Sessions drain in the listener; a second CTRL+C stops waiting for them
    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

/// Forward every SIGHUP to the reloader. The signal handler does nothing else.
async fn forward_hangups(reload: ReloadHandle) -> anyhow::Result<()> {
    let mut hangup = signal(SignalKind::hangup())?;

    while hangup.recv().await.is_some() {
        internal!(level = INFO, "SIGHUP received, requesting routing reload");
        reload.request("SIGHUP");
    }

    Ok(())
}

/// Everything set up and bound, but not yet accepting connections
pub struct Service {
    listener: BoundListener,
    handler: Arc<RelayHandler<LmtpBackendClient>>,
    reloader: ConfigReloader,
    reload: ReloadHandle,
    table: Arc<SharedRoutingTable>,
}

impl Mailroute {
    /// Read a RON service configuration
    ///
    /// # Errors
    /// If the text is not a valid configuration
    pub fn from_ron(text: &str) -> anyhow::Result<Self> {
        ron::from_str(text).context("Invalid service configuration")
    }

    /// Validate the routing file without starting anything.
    ///
    /// Logging is installed first so that routes pointing at undefined
    /// backends are reported.
    ///
    /// # Errors
    /// If the routing file cannot be loaded
    pub async fn check(&self) -> anyhow::Result<RoutingTable> {
        logging::init();

        mailroute_routing::load(&self.routing)
            .await
            .with_context(|| format!("Unable to load routing from {}", self.routing.display()))
    }

    /// Load the routing table and bind the listener.
    ///
    /// An unreadable or invalid routing file is fatal here, unlike on reload.
    ///
    /// # Errors
    /// If the routing file cannot be loaded or the listener cannot be bound
    pub async fn init(self) -> anyhow::Result<Service> {
        let table = mailroute_routing::load(&self.routing)
            .await
            .with_context(|| format!("Unable to load routing from {}", self.routing.display()))?;

        internal!(
            level = INFO,
            "Loaded routing from {}: users = {}, backends = {}",
            self.routing.display(),
            table.user_count(),
            table.backend_count()
        );

        let table = Arc::new(SharedRoutingTable::new(table));
        let (reloader, reload) = ConfigReloader::new(self.routing.clone(), Arc::clone(&table));

        let listener = self.listener.bind().await?;

        let client = LmtpBackendClient::new(self.delivery.helo_name, self.delivery.timeouts);
        let orchestrator = DeliveryOrchestrator::new(client, self.delivery.parallelism);
        let handler = Arc::new(RelayHandler::new(Arc::clone(&table), orchestrator));

        Ok(Service {
            listener,
            handler,
            reloader,
            reload,
            table,
        })
    }

    /// Run the proxy until shutdown is signalled
    ///
    /// # Errors
    ///
    /// This function will return an error if startup fails, or if signal
    /// handlers cannot be installed.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let service = self.init().await?;
        let reload = service.reload_handle();

        internal!("Controller running");

        let ret = tokio::select! {
            r = service.serve(&SHUTDOWN_BROADCAST) => {
                r
            }
            r = shutdown() => {
                r
            }
            r = forward_hangups(reload) => {
                r
            }
        };

        internal!(level = INFO, "Shutting down...");

        ret
    }
}

impl Service {
    /// Ask for the routing file to be re-read
    pub fn reload_handle(&self) -> ReloadHandle {
        self.reload.clone()
    }

    /// The currently published routing table
    pub fn table(&self) -> Arc<SharedRoutingTable> {
        Arc::clone(&self.table)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections and process reloads until `shutdown` broadcasts
    /// [`Signal::Shutdown`].
    ///
    /// # Errors
    /// If the reloader task panicked
    pub async fn serve(self, shutdown: &broadcast::Sender<Signal>) -> anyhow::Result<()> {
        let reloader = tokio::spawn(self.reloader.serve(shutdown.subscribe()));

        self.listener
            .serve(self.handler, shutdown.subscribe())
            .await;

        reloader.await.context("Reloader task failed")?;

        Ok(())
    }
}
