use std::{sync::Arc, time::Duration};

use mailroute_common::{
    Envelope, ReplyLine, Signal, Status, error::SessionError, incoming, internal, outgoing, tracing,
};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream},
    sync::broadcast,
};

use super::{EnvelopeHandler, command::Command};
use crate::data;

/// Longest accepted command line, terminator included
const MAX_COMMAND_LINE: usize = 4096;

/// Most DATA bytes buffered by a single read; longer lines arrive in pieces
const MAX_DATA_CHUNK: usize = 8192;

/// Resolves once a shutdown is broadcast or every sender is gone
async fn shutdown_requested(signal: &mut broadcast::Receiver<Signal>) {
    loop {
        match signal.recv().await {
            Ok(Signal::Shutdown) | Err(broadcast::error::RecvError::Closed) => return,
            Err(broadcast::error::RecvError::Lagged(_)) => {}
        }
    }
}

/// Server-side timeouts, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTimeouts {
    /// Waiting for the next command
    #[serde(default = "default_command_timeout")]
    pub command_secs: u64,

    /// Waiting for each chunk of message data
    #[serde(default = "default_data_timeout")]
    pub data_secs: u64,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            command_secs: default_command_timeout(),
            data_secs: default_data_timeout(),
        }
    }
}

const fn default_command_timeout() -> u64 {
    300
}

const fn default_data_timeout() -> u64 {
    180
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub banner: Arc<str>,
    pub timeouts: ServerTimeouts,
    /// Largest accepted message in bytes; 0 disables the limit
    pub max_message_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            banner: Arc::from("localhost"),
            timeouts: ServerTimeouts::default(),
            max_message_size: 0,
        }
    }
}

enum Next {
    Continue,
    Close,
}

/// One inbound LMTP connection.
///
/// The session accepts exactly one DATA transaction: once the replies for it
/// have been written it says goodbye and closes.
pub struct Session<Stream, Handler> {
    stream: BufStream<Stream>,
    peer: String,
    config: Arc<SessionConfig>,
    handler: Arc<Handler>,
    greeted: bool,
    sender: Option<String>,
    recipients: Vec<String>,
}

impl<Stream, Handler> Session<Stream, Handler>
where
    Stream: AsyncRead + AsyncWrite + Unpin + Send,
    Handler: EnvelopeHandler,
{
    pub fn new(
        stream: Stream,
        peer: impl Into<String>,
        config: Arc<SessionConfig>,
        handler: Arc<Handler>,
    ) -> Self {
        Self {
            stream: BufStream::new(stream),
            peer: peer.into(),
            config,
            handler,
            greeted: false,
            sender: None,
            recipients: Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.sender = None;
        self.recipients.clear();
    }

    async fn send(&mut self, reply: &ReplyLine) -> Result<(), SessionError> {
        outgoing!("{reply}");
        self.stream.write_all(reply.to_string().as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn send_multiline(&mut self, code: Status, lines: &[&str]) -> Result<(), SessionError> {
        let Some((last, rest)) = lines.split_last() else {
            return Ok(());
        };

        let mut out = String::new();
        for line in rest {
            out.push_str(&format!("{code}-{line}\r\n"));
        }
        out.push_str(&format!("{code} {last}\r\n"));

        outgoing!("{}", out.trim_end());
        self.stream.write_all(out.as_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read one line of at most `limit` bytes. `None` on a clean EOF.
    async fn read_line(&mut self, limit: usize) -> Result<Option<Vec<u8>>, SessionError> {
        let mut line = Vec::new();
        let read = (&mut self.stream)
            .take(limit as u64)
            .read_until(b'\n', &mut line)
            .await?;

        if read == 0 {
            return Ok(None);
        }

        if !line.ends_with(b"\n") {
            if line.len() >= limit {
                return Err(SessionError::Protocol(format!(
                    "Line exceeds {limit} bytes"
                )));
            }
            return Err(SessionError::Cancelled);
        }

        Ok(Some(line))
    }

    async fn read_command(
        &mut self,
        signal: &mut broadcast::Receiver<Signal>,
    ) -> Result<Option<Command>, SessionError> {
        let secs = self.config.timeouts.command_secs;

        let read = tokio::select! {
            line = tokio::time::timeout(Duration::from_secs(secs), self.read_line(MAX_COMMAND_LINE)) => Some(line),
            () = shutdown_requested(signal) => None,
        };

        let Some(line) = read else {
            internal!("Session {} interrupted by shutdown", self.peer);
            return Err(SessionError::Shutdown);
        };
        let line = line.map_err(|_| SessionError::Timeout(secs))??;

        Ok(line.map(|line| {
            let line = String::from_utf8_lossy(&line);
            incoming!("{}", line.trim_end());
            Command::parse(&line)
        }))
    }

    /// Collect the DATA section, un-stuffed, up to the terminating dot.
    ///
    /// Lines are read in chunks of at most [`MAX_DATA_CHUNK`] bytes, so a
    /// line without a terminator never grows the buffer past one chunk.
    /// Returns `None` if the message exceeded the size limit; the rest of the
    /// section has still been consumed.
    async fn read_data(&mut self) -> Result<Option<Vec<u8>>, SessionError> {
        let timeout = Duration::from_secs(self.config.timeouts.data_secs);
        let limit = self.config.max_message_size;
        let mut body = Vec::new();
        let mut oversized = false;
        let mut at_line_start = true;

        loop {
            let mut chunk = Vec::new();
            let read = tokio::time::timeout(
                timeout,
                (&mut self.stream)
                    .take(MAX_DATA_CHUNK as u64)
                    .read_until(b'\n', &mut chunk),
            )
            .await
            .map_err(|_| SessionError::Timeout(self.config.timeouts.data_secs))??;

            if read == 0 {
                return Err(SessionError::Cancelled);
            }

            if at_line_start && data::is_terminator(&chunk) {
                break;
            }

            if !oversized {
                let content = if at_line_start {
                    data::unstuff(&chunk)
                } else {
                    chunk.as_slice()
                };
                body.extend_from_slice(content);

                if limit > 0 && body.len() > limit {
                    oversized = true;
                    body = Vec::new();
                }
            }

            at_line_start = chunk.ends_with(b"\n");
        }

        incoming!("<{} bytes of message data>", body.len());
        Ok((!oversized).then_some(body))
    }

    async fn handle_data(&mut self) -> Result<Next, SessionError> {
        self.send(&ReplyLine::new(
            Status::StartMailInput,
            "Start mail input; end with <CRLF>.<CRLF>",
        ))
        .await?;

        let recipients = std::mem::take(&mut self.recipients);
        let sender = self.sender.take().unwrap_or_default();
        let expected = recipients.len();

        let replies = match self.read_data().await? {
            Some(body) => {
                let envelope = Envelope::new(sender, recipients, body, self.peer.clone());
                let mut replies = self.handler.handle(envelope).await;

                if replies.len() != expected {
                    tracing::error!(
                        peer = %self.peer,
                        expected,
                        got = replies.len(),
                        "Handler returned the wrong number of replies"
                    );
                    replies.resize_with(expected, || {
                        ReplyLine::new(Status::ActionUnavailable, "4.4.0 Backend unavailable")
                    });
                }
                replies
            }
            None => {
                tracing::warn!(
                    peer = %self.peer,
                    limit = self.config.max_message_size,
                    "Message exceeds size limit"
                );
                vec![
                    ReplyLine::new(Status::ExceededStorage, "5.3.4 Message too big for system");
                    expected
                ]
            }
        };

        for reply in &replies {
            self.send(reply).await?;
        }

        self.send(&ReplyLine::new(Status::GoodBye, "2.0.0 Bye")).await?;
        Ok(Next::Close)
    }

    async fn dispatch(&mut self, command: Command) -> Result<Next, SessionError> {
        let reply = match command {
            Command::Lhlo(_) => {
                self.greeted = true;
                self.reset();
                let banner = Arc::clone(&self.config.banner);
                self.send_multiline(
                    Status::Ok,
                    &[&*banner, "PIPELINING", "ENHANCEDSTATUSCODES", "8BITMIME"],
                )
                .await?;
                return Ok(Next::Continue);
            }
            Command::Smtp(_) => ReplyLine::new(Status::SyntaxError, "5.5.1 This is LMTP, not SMTP"),
            Command::MailFrom(_) if !self.greeted => {
                ReplyLine::new(Status::InvalidCommandSequence, "5.5.1 Send LHLO first")
            }
            Command::MailFrom(_) if self.sender.is_some() => {
                ReplyLine::new(Status::InvalidCommandSequence, "5.5.1 Sender already specified")
            }
            Command::MailFrom(from) => {
                self.sender = Some(from);
                ReplyLine::new(Status::Ok, "2.1.0 Ok")
            }
            Command::RcptTo(_) if self.sender.is_none() => {
                ReplyLine::new(Status::InvalidCommandSequence, "5.5.1 Need MAIL command")
            }
            Command::RcptTo(to) => {
                self.recipients.push(to);
                ReplyLine::new(Status::Ok, "2.1.5 Ok")
            }
            Command::Data if self.recipients.is_empty() => {
                ReplyLine::new(Status::InvalidCommandSequence, "5.5.1 Need RCPT command")
            }
            Command::Data => return self.handle_data().await,
            Command::Rset => {
                self.reset();
                ReplyLine::new(Status::Ok, "2.0.0 Ok")
            }
            Command::Noop => ReplyLine::new(Status::Ok, "2.0.0 Ok"),
            Command::Quit => {
                self.send(&ReplyLine::new(Status::GoodBye, "2.0.0 Bye")).await?;
                return Ok(Next::Close);
            }
            Command::Invalid(_) => {
                ReplyLine::new(Status::ParameterSyntaxError, "5.5.4 Syntax error in parameters")
            }
            Command::Unknown(_) => {
                ReplyLine::new(Status::SyntaxError, "5.5.2 Command not recognised")
            }
        };

        self.send(&reply).await?;
        Ok(Next::Continue)
    }

    /// Drive the session until the peer quits, the transaction completes, or
    /// shutdown is signalled while waiting for a command.
    ///
    /// # Errors
    /// If the connection fails or the peer violates the protocol badly enough
    /// that the session cannot continue
    pub async fn run(mut self, mut signal: broadcast::Receiver<Signal>) -> Result<(), SessionError> {
        internal!("Connected: {}", self.peer);

        let banner = Arc::clone(&self.config.banner);
        self.send(&ReplyLine::new(
            Status::ServiceReady,
            format!("{banner} LMTP service ready"),
        ))
        .await?;

        loop {
            let command = match self.read_command(&mut signal).await {
                Ok(Some(command)) => command,
                Ok(None) => {
                    internal!("Peer {} closed the connection", self.peer);
                    return Ok(());
                }
                Err(SessionError::Shutdown) => {
                    let _ = self
                        .send(&ReplyLine::new(
                            Status::Unavailable,
                            "4.3.2 Service shutting down",
                        ))
                        .await;
                    return Err(SessionError::Shutdown);
                }
                Err(SessionError::Protocol(reason)) => {
                    let _ = self
                        .send(&ReplyLine::new(Status::SyntaxError, "5.5.2 Line too long"))
                        .await;
                    return Err(SessionError::Protocol(reason));
                }
                Err(SessionError::Timeout(secs)) => {
                    let _ = self
                        .send(&ReplyLine::new(
                            Status::Unavailable,
                            "4.4.2 Timeout waiting for command",
                        ))
                        .await;
                    return Err(SessionError::Timeout(secs));
                }
                Err(err) => return Err(err),
            };

            if matches!(self.dispatch(command).await?, Next::Close) {
                let _ = self.stream.shutdown().await;
                return Ok(());
            }
        }
    }
}
