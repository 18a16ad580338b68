//! Outbound delivery of one recipient to one backend.

use std::{future::Future, time::Duration};

use mailroute_common::tracing;
use mailroute_lmtp::{ClientError, LmtpClient, Response};
use mailroute_routing::{BackendEndpoint, BackendProtocol};

use crate::{BackendTimeouts, DeliveryOutcome, RecipientStatuses, TransactionError};

/// Delivers a message for exactly one recipient.
///
/// Implementations never fail: every problem is folded into the returned
/// [`DeliveryOutcome`].
pub trait BackendClient: Send + Sync + 'static {
    fn deliver(
        &self,
        endpoint: &BackendEndpoint,
        sender: &str,
        recipient: &str,
        body: &[u8],
    ) -> impl Future<Output = DeliveryOutcome> + Send;
}

/// [`BackendClient`] speaking LMTP (or SMTP, per endpoint) over a fresh
/// connection for every delivery
#[derive(Debug, Clone)]
pub struct LmtpBackendClient {
    helo_name: String,
    timeouts: BackendTimeouts,
}

impl LmtpBackendClient {
    pub fn new(helo_name: impl Into<String>, timeouts: BackendTimeouts) -> Self {
        Self {
            helo_name: helo_name.into(),
            timeouts,
        }
    }
}

impl BackendClient for LmtpBackendClient {
    async fn deliver(
        &self,
        endpoint: &BackendEndpoint,
        sender: &str,
        recipient: &str,
        body: &[u8],
    ) -> DeliveryOutcome {
        let transaction = Transaction {
            endpoint,
            helo_name: &self.helo_name,
            sender,
            recipient,
            body,
            timeouts: &self.timeouts,
        };

        match transaction.execute().await {
            Ok(statuses) => statuses.outcome_for(recipient),
            Err(err) => err.into(),
        }
    }
}

async fn timed<T>(
    stage: &'static str,
    secs: u64,
    fut: impl Future<Output = Result<T, ClientError>>,
) -> Result<T, TransactionError> {
    tokio::time::timeout(Duration::from_secs(secs), fut)
        .await
        .map_err(|_| TransactionError::Timeout(stage, secs))?
        .map_err(TransactionError::from)
}

/// 4xx/5xx refuse the transaction; anything else that is not `expected`
/// means the backend is confused.
fn check(
    stage: &'static str,
    response: &Response,
    expected: fn(&Response) -> bool,
) -> Result<(), TransactionError> {
    if expected(response) {
        Ok(())
    } else if response.is_error() {
        Err(TransactionError::Refused {
            stage,
            code: response.code,
            message: response.message(),
        })
    } else {
        Err(TransactionError::UnexpectedReply {
            stage,
            code: response.code,
            message: response.message(),
        })
    }
}

/// A single LMTP/SMTP transaction for one recipient
///
/// The connection lives only as long as [`Transaction::execute`], so it is
/// released on every exit path.
struct Transaction<'a> {
    endpoint: &'a BackendEndpoint,
    helo_name: &'a str,
    sender: &'a str,
    recipient: &'a str,
    body: &'a [u8],
    timeouts: &'a BackendTimeouts,
}

impl Transaction<'_> {
    async fn connect(&self) -> Result<LmtpClient, TransactionError> {
        let secs = self.timeouts.connect_secs;
        let connect = async {
            match self.endpoint {
                BackendEndpoint::Unix { path, .. } => LmtpClient::connect_unix(path).await,
                BackendEndpoint::Tcp { host, port, .. } => {
                    LmtpClient::connect_tcp(host, *port).await
                }
            }
        };

        let mut client = tokio::time::timeout(Duration::from_secs(secs), connect)
            .await
            .map_err(|_| TransactionError::Timeout("connect", secs))?
            .map_err(|err| TransactionError::ConnectionFailed {
                endpoint: self.endpoint.to_string(),
                reason: err.to_string(),
            })?;

        let greeting = timed("greeting", secs, client.read_greeting()).await?;
        if !greeting.is_success() {
            return Err(TransactionError::UnexpectedReply {
                stage: "greeting",
                code: greeting.code,
                message: greeting.message(),
            });
        }

        Ok(client)
    }

    async fn greet(&self, client: &mut LmtpClient) -> Result<(), TransactionError> {
        let protocol = self.endpoint.protocol();
        let stage = protocol.greeting_verb();
        let secs = self.timeouts.lhlo_secs;

        let response = match protocol {
            BackendProtocol::Lmtp => timed(stage, secs, client.lhlo(self.helo_name)).await?,
            BackendProtocol::Smtp => timed(stage, secs, client.ehlo(self.helo_name)).await?,
        };

        if response.is_success() {
            Ok(())
        } else {
            Err(TransactionError::UnexpectedReply {
                stage,
                code: response.code,
                message: response.message(),
            })
        }
    }

    /// Run the whole conversation, returning the per-recipient statuses the
    /// backend reported.
    async fn execute(&self) -> Result<RecipientStatuses, TransactionError> {
        let mut client = self.connect().await?;
        self.greet(&mut client).await?;

        let response = timed(
            "MAIL FROM",
            self.timeouts.mail_from_secs,
            client.mail_from(self.sender),
        )
        .await?;
        check("MAIL FROM", &response, Response::is_success)?;

        let mut statuses = RecipientStatuses::default();

        let response = timed(
            "RCPT TO",
            self.timeouts.rcpt_to_secs,
            client.rcpt_to(self.recipient),
        )
        .await?;
        if response.is_error() {
            statuses.record(self.recipient, response.code, response.message());
            self.quit(&mut client).await;
            return Ok(statuses);
        }
        check("RCPT TO", &response, Response::is_success)?;

        let response = timed("DATA", self.timeouts.data_secs, client.data()).await?;
        check("DATA", &response, Response::is_intermediate)?;

        // LMTP answers once per accepted recipient; we only ever send one
        let response = timed(
            "message data",
            self.timeouts.data_secs,
            client.send_data(self.body),
        )
        .await?;
        if !(response.is_success() || response.is_error()) {
            return Err(TransactionError::UnexpectedReply {
                stage: "message data",
                code: response.code,
                message: response.message(),
            });
        }
        statuses.record(self.recipient, response.code, response.message());

        self.quit(&mut client).await;
        Ok(statuses)
    }

    /// Best effort: the verdict is already known.
    async fn quit(&self, client: &mut LmtpClient) {
        let secs = self.timeouts.quit_secs;
        if let Err(err) = timed("QUIT", secs, client.quit()).await {
            tracing::debug!(backend = %self.endpoint, "QUIT failed after delivery: {err}");
        }
        if let Err(err) = client.close().await {
            tracing::debug!(backend = %self.endpoint, "Closing backend connection failed: {err}");
        }
    }
}
