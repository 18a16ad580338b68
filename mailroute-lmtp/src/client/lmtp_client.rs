//! LMTP/SMTP client over TCP or a UNIX domain socket.

use std::path::Path;

use mailroute_common::{outgoing, tracing};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpStream, UnixStream},
};

use super::{
    error::{ClientError, Result},
    response::Response,
};
use crate::data;

/// Initial size of the read buffer for replies.
const BUFFER_SIZE: usize = 8192;

/// Maximum size of the read buffer to prevent unbounded growth (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

enum ClientConnection {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl ClientConnection {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Tcp(stream) => stream.write_all(data).await?,
            Self::Unix(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Tcp(stream) => stream.read(buf).await?,
            Self::Unix(stream) => stream.read(buf).await?,
        };
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(n)
    }

    async fn shutdown(&mut self) -> Result<()> {
        match self {
            Self::Tcp(stream) => stream.shutdown().await?,
            Self::Unix(stream) => stream.shutdown().await?,
        }
        Ok(())
    }
}

/// A client for one outbound session.
///
/// Dropping the client closes the connection.
pub struct LmtpClient {
    connection: Option<ClientConnection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
}

impl LmtpClient {
    fn with_connection(connection: ClientConnection) -> Self {
        Self {
            connection: Some(connection),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
        }
    }

    /// Connect to `host:port`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect_tcp(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Self::with_connection(ClientConnection::Tcp(stream)))
    }

    /// Connect to a UNIX domain socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect_unix(path: impl AsRef<Path>) -> Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self::with_connection(ClientConnection::Unix(stream)))
    }

    /// Reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the greeting is malformed.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    /// Sends a command line; CRLF is appended.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails.
    pub async fn send_command(&mut self, command: &str) -> Result<()> {
        outgoing!("{command}");
        let data = format!("{command}\r\n");
        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(data.as_bytes())
            .await
    }

    /// Sends a command and reads the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        self.send_command(command).await?;
        self.read_response().await
    }

    /// Sends LHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn lhlo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("LHLO {domain}")).await
    }

    /// Sends EHLO, for backends which only speak SMTP.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("EHLO {domain}")).await
    }

    /// Sends MAIL FROM.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    /// Sends RCPT TO.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// Sends DATA.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Sends the message, dot-stuffed and terminated, and reads the first
    /// reply. An LMTP server sends one reply per accepted recipient; read the
    /// rest with [`LmtpClient::read_response`].
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn send_data(&mut self, body: &[u8]) -> Result<Response> {
        let encoded = data::encode(body);
        outgoing!("<{} bytes of message data>", encoded.len());

        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(&encoded)
            .await?;

        self.read_response().await
    }

    /// Sends QUIT.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    /// Shuts the connection down. Further calls fail with
    /// [`ClientError::ConnectionClosed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown itself fails; the connection is
    /// released either way.
    pub async fn close(&mut self) -> Result<()> {
        match self.connection.take() {
            Some(mut connection) => connection.shutdown().await,
            None => Ok(()),
        }
    }

    /// Reads one complete reply.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the reply is malformed.
    pub async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) =
                Response::parse_response(&self.buffer[..self.buffer_pos])?
            {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                tracing::trace!(code = response.code, "{}", response.message());
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::ParseError(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let n = connection.read(&mut self.buffer[self.buffer_pos..]).await?;
            self.buffer_pos += n;
        }
    }
}
