//! Mock LMTP mailbox store standing behind the proxy
//!
//! Each backend either accepts everything it is sent, recording the
//! conversation, or hangs up right after its greeting.

#![allow(dead_code)]

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, UnixListener},
    sync::RwLock,
    time::timeout,
};

/// Command received by the mock backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LmtpCommand {
    Lhlo(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// Message content, exactly as received between DATA and the final dot
    MessageContent(Vec<u8>),
    Quit,
    Other(String),
}

type Commands = Arc<RwLock<Vec<LmtpCommand>>>;

/// Mock LMTP backend
pub struct MockLmtpServer {
    addr: Option<SocketAddr>,
    socket_path: Option<PathBuf>,
    commands_received: Commands,
    hang_up_after_greeting: bool,
    shutdown: AtomicBool,
}

impl MockLmtpServer {
    #[must_use]
    pub fn builder() -> MockLmtpServerBuilder {
        MockLmtpServerBuilder::default()
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr.expect("mock backend is not listening on TCP")
    }

    #[must_use]
    pub fn socket_path(&self) -> &Path {
        self.socket_path
            .as_deref()
            .expect("mock backend is not listening on a UNIX socket")
    }

    pub async fn commands(&self) -> Vec<LmtpCommand> {
        self.commands_received.read().await.clone()
    }

    /// Message bodies received so far
    pub async fn messages(&self) -> Vec<Vec<u8>> {
        self.commands()
            .await
            .into_iter()
            .filter_map(|command| match command {
                LmtpCommand::MessageContent(content) => Some(content),
                _ => None,
            })
            .collect()
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn record(&self, command: LmtpCommand) {
        self.commands_received.write().await.push(command);
    }

    async fn handle_client<S>(self: Arc<Self>, stream: S) -> std::io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);

        writer.write_all(b"220 cyrus.test LMTP ready\r\n").await?;
        writer.flush().await?;
        if self.hang_up_after_greeting {
            return Ok(());
        }

        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }

            let command_line = line.trim();
            let (verb, argument) = command_line
                .split_once(' ')
                .unwrap_or((command_line, ""));
            let argument = argument.to_string();

            let reply: &[u8] = match verb.to_uppercase().as_str() {
                "LHLO" => {
                    self.record(LmtpCommand::Lhlo(argument)).await;
                    b"250-cyrus.test\r\n250 PIPELINING\r\n"
                }
                "MAIL" => {
                    self.record(LmtpCommand::MailFrom(argument)).await;
                    b"250 2.1.0 Ok\r\n"
                }
                "RCPT" => {
                    self.record(LmtpCommand::RcptTo(argument)).await;
                    b"250 2.1.5 Ok\r\n"
                }
                "DATA" => {
                    self.record(LmtpCommand::Data).await;
                    writer.write_all(b"354 Go ahead\r\n").await?;
                    writer.flush().await?;

                    let mut content = Vec::new();
                    let mut data_line = Vec::new();
                    loop {
                        data_line.clear();
                        if reader.read_until(b'\n', &mut data_line).await? == 0 {
                            return Ok(());
                        }
                        if data_line == b".\r\n" {
                            break;
                        }
                        content.extend_from_slice(&data_line);
                    }

                    self.record(LmtpCommand::MessageContent(content)).await;
                    b"250 2.0.0 Ok: delivered\r\n"
                }
                "QUIT" => {
                    self.record(LmtpCommand::Quit).await;
                    writer.write_all(b"221 2.0.0 Bye\r\n").await?;
                    writer.flush().await?;
                    return Ok(());
                }
                _ => {
                    self.record(LmtpCommand::Other(command_line.to_string()))
                        .await;
                    b"500 5.5.2 Unknown command\r\n"
                }
            };

            writer.write_all(reply).await?;
            writer.flush().await?;
        }
    }

    fn spawn_client<S>(self: &Arc<Self>, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let server = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = server.handle_client(stream).await {
                eprintln!("Mock backend client error: {e}");
            }
        });
    }
}

/// Builder for configuring a [`MockLmtpServer`]
#[derive(Default)]
pub struct MockLmtpServerBuilder {
    hang_up_after_greeting: bool,
}

impl MockLmtpServerBuilder {
    /// Close every connection straight after the 220 greeting
    #[must_use]
    pub const fn hanging_up_after_greeting(mut self) -> Self {
        self.hang_up_after_greeting = true;
        self
    }

    fn into_server(
        self,
        addr: Option<SocketAddr>,
        socket_path: Option<PathBuf>,
    ) -> Arc<MockLmtpServer> {
        Arc::new(MockLmtpServer {
            addr,
            socket_path,
            commands_received: Arc::default(),
            hang_up_after_greeting: self.hang_up_after_greeting,
            shutdown: AtomicBool::new(false),
        })
    }

    /// Start the mock backend on a random TCP port
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> std::io::Result<Arc<MockLmtpServer>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let server = self.into_server(Some(listener.local_addr()?), None);

        let handle = Arc::clone(&server);
        tokio::spawn(async move {
            while !handle.shutdown.load(Ordering::Relaxed) {
                if let Ok(Ok((stream, _))) =
                    timeout(Duration::from_millis(100), listener.accept()).await
                {
                    handle.spawn_client(stream);
                }
            }
        });

        Ok(server)
    }

    /// Start the mock backend on a UNIX domain socket at `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound
    pub fn build_unix(self, path: impl Into<PathBuf>) -> std::io::Result<Arc<MockLmtpServer>> {
        let path = path.into();
        let listener = UnixListener::bind(&path)?;
        let server = self.into_server(None, Some(path));

        let handle = Arc::clone(&server);
        tokio::spawn(async move {
            while !handle.shutdown.load(Ordering::Relaxed) {
                if let Ok(Ok((stream, _))) =
                    timeout(Duration::from_millis(100), listener.accept()).await
                {
                    handle.spawn_client(stream);
                }
            }
        });

        Ok(server)
    }
}
