//! Mock LMTP backend for testing delivery scenarios
//!
//! This module provides a configurable mock backend that can:
#![allow(dead_code)] // Test utility module - not all methods used in every test
//! - Answer each command with a configured reply
//! - Drop the connection or hang after a given number of commands
//! - Record everything it received for verification
//! - Listen on TCP or on a UNIX domain socket
//!
//! # Example
//!
//! ```rust,no_run
//! use support::mock_server::MockLmtpServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockLmtpServer::builder()
//!     .with_rcpt_to_response(550, "5.1.1 User unknown")
//!     .build()
//!     .await?;
//!
//! // Server is now running on server.addr()
//! server.shutdown();
//! # Ok(())
//! # }
//! ```

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
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
    Ehlo(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// Message content, exactly as received between DATA and the final dot
    MessageContent(Vec<u8>),
    Rset,
    Quit,
    Other(String),
}

#[derive(Debug, Clone)]
pub struct LmtpResponse {
    pub code: u16,
    pub message: String,
}

impl LmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct MockServerConfig {
    greeting: LmtpResponse,
    lhlo_response: LmtpResponse,
    mail_from_response: LmtpResponse,
    rcpt_to_response: LmtpResponse,
    data_response: LmtpResponse,
    data_end_response: LmtpResponse,
    quit_response: LmtpResponse,

    drop_after_commands: Option<usize>,
    timeout_on_command: Option<usize>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: LmtpResponse::new(220, "mock LMTP server ready"),
            lhlo_response: LmtpResponse::new(250, "mock"),
            mail_from_response: LmtpResponse::new(250, "2.1.0 Ok"),
            rcpt_to_response: LmtpResponse::new(250, "2.1.5 Ok"),
            data_response: LmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end_response: LmtpResponse::new(250, "2.0.0 Ok: delivered"),
            quit_response: LmtpResponse::new(221, "2.0.0 Bye"),
            drop_after_commands: None,
            timeout_on_command: None,
        }
    }
}

type Commands = Arc<RwLock<Vec<LmtpCommand>>>;

/// Mock LMTP backend
pub struct MockLmtpServer {
    addr: Option<SocketAddr>,
    socket_path: Option<PathBuf>,
    commands_received: Commands,
    shutdown: Arc<AtomicBool>,
    connections: Arc<AtomicUsize>,
}

impl MockLmtpServer {
    #[must_use]
    pub fn builder() -> MockLmtpServerBuilder {
        MockLmtpServerBuilder::new()
    }

    /// The TCP address, for servers built with [`MockLmtpServerBuilder::build`]
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr.expect("mock server is not listening on TCP")
    }

    #[must_use]
    pub fn socket_path(&self) -> &Path {
        self.socket_path
            .as_deref()
            .expect("mock server is not listening on a UNIX socket")
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

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn handle_client<S>(
        stream: S,
        config: Arc<MockServerConfig>,
        commands: Commands,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut local_command_count = 0;

        writer.write_all(&config.greeting.to_bytes()).await?;
        writer.flush().await?;

        loop {
            line.clear();

            if let Some(drop_after) = config.drop_after_commands
                && local_command_count >= drop_after
            {
                return Ok(());
            }

            if let Some(timeout_on) = config.timeout_on_command
                && local_command_count == timeout_on
            {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(());
            }

            let read_result = timeout(Duration::from_secs(10), reader.read_line(&mut line)).await;
            let Ok(bytes_read) = read_result else {
                return Ok(());
            };
            if bytes_read? == 0 {
                return Ok(());
            }

            local_command_count += 1;

            let cmd_line = line.trim();
            let (verb, argument) = cmd_line.split_once(' ').unwrap_or((cmd_line, ""));
            let argument = argument.to_string();

            let (response, command) = match verb.to_uppercase().as_str() {
                "LHLO" => (&config.lhlo_response, LmtpCommand::Lhlo(argument)),
                "EHLO" => (&config.lhlo_response, LmtpCommand::Ehlo(argument)),
                "MAIL" => (&config.mail_from_response, LmtpCommand::MailFrom(argument)),
                "RCPT" => (&config.rcpt_to_response, LmtpCommand::RcptTo(argument)),
                "DATA" => (&config.data_response, LmtpCommand::Data),
                "RSET" => {
                    commands.write().await.push(LmtpCommand::Rset);
                    writer.write_all(b"250 2.0.0 Ok\r\n").await?;
                    writer.flush().await?;
                    continue;
                }
                "QUIT" => {
                    commands.write().await.push(LmtpCommand::Quit);
                    writer.write_all(&config.quit_response.to_bytes()).await?;
                    writer.flush().await?;
                    return Ok(());
                }
                _ => {
                    commands
                        .write()
                        .await
                        .push(LmtpCommand::Other(cmd_line.to_string()));
                    writer.write_all(b"500 5.5.2 Unknown command\r\n").await?;
                    writer.flush().await?;
                    continue;
                }
            };

            commands.write().await.push(command.clone());
            writer.write_all(&response.to_bytes()).await?;
            writer.flush().await?;

            if matches!(command, LmtpCommand::Data) && response.code == 354 {
                let mut content = Vec::new();
                let mut data_line = Vec::new();

                loop {
                    data_line.clear();
                    if reader.read_until(b'\n', &mut data_line).await? == 0 {
                        return Ok(());
                    }

                    if data_line == b".\r\n" {
                        commands
                            .write()
                            .await
                            .push(LmtpCommand::MessageContent(content));
                        writer
                            .write_all(&config.data_end_response.to_bytes())
                            .await?;
                        writer.flush().await?;
                        break;
                    }

                    content.extend_from_slice(&data_line);
                }
            }
        }
    }

    fn spawn_client<S>(
        &self,
        stream: S,
        config: &Arc<MockServerConfig>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.connections.fetch_add(1, Ordering::Relaxed);
        let config = Arc::clone(config);
        let commands = Arc::clone(&self.commands_received);

        tokio::spawn(async move {
            if let Err(e) = Self::handle_client(stream, config, commands).await {
                eprintln!("Mock server client error: {e}");
            }
        });
    }
}

/// Builder for configuring a [`MockLmtpServer`]
pub struct MockLmtpServerBuilder {
    config: MockServerConfig,
}

impl MockLmtpServerBuilder {
    fn new() -> Self {
        Self {
            config: MockServerConfig::default(),
        }
    }

    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = LmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_lhlo_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.lhlo_response = LmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = LmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_response = LmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_data_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_response = LmtpResponse::new(code, message);
        self
    }

    /// Set the reply sent after the terminating dot
    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = LmtpResponse::new(code, message);
        self
    }

    /// Drop the connection after N commands
    #[must_use]
    pub const fn with_network_error_after_commands(mut self, count: usize) -> Self {
        self.config.drop_after_commands = Some(count);
        self
    }

    /// Hang on the Nth command (0-indexed)
    #[must_use]
    pub const fn with_timeout_on_command(mut self, command_index: usize) -> Self {
        self.config.timeout_on_command = Some(command_index);
        self
    }

    fn into_server(
        self,
        addr: Option<SocketAddr>,
        socket_path: Option<PathBuf>,
    ) -> (MockLmtpServer, Arc<MockServerConfig>) {
        (
            MockLmtpServer {
                addr,
                socket_path,
                commands_received: Arc::default(),
                shutdown: Arc::default(),
                connections: Arc::default(),
            },
            Arc::new(self.config),
        )
    }

    /// Start the mock backend on a random TCP port
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> Result<Arc<MockLmtpServer>, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let (server, config) = self.into_server(Some(listener.local_addr()?), None);
        let server = Arc::new(server);

        let handle = Arc::clone(&server);
        tokio::spawn(async move {
            while !handle.shutdown.load(Ordering::Relaxed) {
                if let Ok(Ok((stream, _))) =
                    timeout(Duration::from_millis(100), listener.accept()).await
                {
                    handle.spawn_client(stream, &config);
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
    pub fn build_unix(self, path: impl Into<PathBuf>) -> Result<Arc<MockLmtpServer>, std::io::Error> {
        let path = path.into();
        let listener = UnixListener::bind(&path)?;
        let (server, config) = self.into_server(None, Some(path));
        let server = Arc::new(server);

        let handle = Arc::clone(&server);
        tokio::spawn(async move {
            while !handle.shutdown.load(Ordering::Relaxed) {
                if let Ok(Ok((stream, _))) =
                    timeout(Duration::from_millis(100), listener.accept()).await
                {
                    handle.spawn_client(stream, &config);
                }
            }
        });

        Ok(server)
    }
}
