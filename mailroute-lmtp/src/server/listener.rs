use std::{
    fmt::{self, Display, Formatter},
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures_util::future::join_all;
use mailroute_common::{Signal, error::ListenerError, internal, tracing};
use serde::{Deserialize, Serialize};
use tokio::{
    net::{TcpListener, UnixListener, UnixStream},
    sync::broadcast,
    task::JoinHandle,
};

use super::{
    EnvelopeHandler,
    session::{ServerTimeouts, Session, SessionConfig},
};

/// Where inbound LMTP connections are accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListenAddress {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl Display for ListenAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "{addr}"),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

fn default_banner() -> String {
    String::from("mailroute")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listener {
    pub socket: ListenAddress,
    #[serde(default = "default_banner")]
    pub banner: String,
    #[serde(default)]
    pub timeouts: ServerTimeouts,
    #[serde(default)]
    pub max_message_size: usize,
}

impl From<ListenAddress> for Listener {
    fn from(socket: ListenAddress) -> Self {
        Self {
            socket,
            banner: default_banner(),
            timeouts: ServerTimeouts::default(),
            max_message_size: 0,
        }
    }
}

impl Listener {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            banner: Arc::from(self.banner.as_str()),
            timeouts: self.timeouts,
            max_message_size: self.max_message_size,
        }
    }

    /// Bind the configured socket.
    ///
    /// A leftover Unix socket file is removed first, unless something is still
    /// accepting connections on it.
    ///
    /// # Errors
    /// If the address cannot be bound
    pub async fn bind(&self) -> Result<BoundListener, ListenerError> {
        let bind_failed = |source| ListenerError::BindFailed {
            address: self.socket.to_string(),
            source,
        };

        let socket = match &self.socket {
            ListenAddress::Tcp(addr) => {
                BoundSocket::Tcp(TcpListener::bind(addr).await.map_err(bind_failed)?)
            }
            ListenAddress::Unix(path) => {
                if path.exists() {
                    if UnixStream::connect(path).await.is_ok() {
                        return Err(bind_failed(std::io::Error::new(
                            std::io::ErrorKind::AddrInUse,
                            "socket is in use by a running instance",
                        )));
                    }
                    internal!(level = INFO, "Removing stale socket file: {}", path.display());
                    tokio::fs::remove_file(path).await.map_err(bind_failed)?;
                }

                BoundSocket::Unix(UnixListener::bind(path).map_err(bind_failed)?, path.clone())
            }
        };

        internal!(level = INFO, "Listening for LMTP on {}", self.socket);

        Ok(BoundListener {
            socket,
            config: Arc::new(self.session_config()),
        })
    }
}

enum BoundSocket {
    Tcp(TcpListener),
    Unix(UnixListener, PathBuf),
}

impl BoundSocket {
    /// Accept one connection, returning the stream-serving task and the peer
    /// as it should appear to the handler.
    async fn accept<H: EnvelopeHandler>(
        &self,
        config: &Arc<SessionConfig>,
        handler: &Arc<H>,
        signal: broadcast::Receiver<Signal>,
    ) -> Result<JoinHandle<()>, ListenerError> {
        let config = Arc::clone(config);
        let handler = Arc::clone(handler);

        Ok(match self {
            Self::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                let session = Session::new(stream, addr.ip().to_string(), config, handler);
                tokio::spawn(run_session(session, signal))
            }
            Self::Unix(listener, _) => {
                let (stream, _) = listener.accept().await?;
                let session = Session::new(stream, "localhost", config, handler);
                tokio::spawn(run_session(session, signal))
            }
        })
    }
}

async fn run_session<S, H>(session: Session<S, H>, signal: broadcast::Receiver<Signal>)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
    H: EnvelopeHandler,
{
    match session.run(signal).await {
        Ok(()) => {}
        Err(err) if err.is_shutdown() => internal!("Session ended: {err}"),
        Err(err) if err.is_client_error() => {
            internal!(level = WARN, "Session ended: {err}");
        }
        Err(err) => internal!(level = ERROR, "Session failed: {err}"),
    }
}

/// A listener that has successfully bound its socket
pub struct BoundListener {
    socket: BoundSocket,
    config: Arc<SessionConfig>,
}

impl BoundListener {
    /// The TCP address actually bound, useful when the port was 0
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.socket {
            BoundSocket::Tcp(listener) => listener.local_addr().ok(),
            BoundSocket::Unix(..) => None,
        }
    }

    fn socket_path(&self) -> Option<&Path> {
        match &self.socket {
            BoundSocket::Unix(_, path) => Some(path),
            BoundSocket::Tcp(_) => None,
        }
    }

    /// Accept connections until shutdown, running one [`Session`] per
    /// connection. On shutdown, waits for in-flight sessions to finish.
    ///
    /// Accept failures are logged and the loop carries on.
    pub async fn serve<H: EnvelopeHandler>(
        self,
        handler: Arc<H>,
        mut shutdown: broadcast::Receiver<Signal>,
    ) {
        let mut sessions: Vec<JoinHandle<()>> = Vec::new();

        loop {
            let signal = shutdown.resubscribe();

            tokio::select! {
                sig = shutdown.recv() => {
                    if matches!(sig, Ok(Signal::Shutdown) | Err(broadcast::error::RecvError::Closed)) {
                        internal!(level = INFO, "LMTP listener received shutdown, finishing {} sessions", sessions.len());
                        join_all(sessions).await;
                        break;
                    }
                }

                accepted = self.socket.accept(&self.config, &handler, signal) => {
                    match accepted {
                        Ok(session) => {
                            sessions.retain(|session| !session.is_finished());
                            sessions.push(session);
                        }
                        Err(err) => tracing::error!("{err}"),
                    }
                }
            }
        }

        if let Some(path) = self.socket_path()
            && path.exists()
        {
            tracing::debug!("Removing socket file: {}", path.display());
            if let Err(err) = tokio::fs::remove_file(path).await {
                tracing::warn!("Unable to remove socket file {}: {err}", path.display());
            }
        }
    }
}
