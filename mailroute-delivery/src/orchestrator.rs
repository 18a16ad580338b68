use std::sync::Arc;

use futures_util::{StreamExt, stream};
use mailroute_common::{Envelope, ReplyLine, tracing};
use mailroute_routing::{Route, RoutingTable};

use crate::{BackendClient, DeliveryOutcome, inject_peer_header};

/// Fans an envelope out to its recipients' backends and gathers one reply per
/// recipient, in recipient order.
pub struct DeliveryOrchestrator<C> {
    client: Arc<C>,
    parallelism: usize,
}

impl<C: BackendClient> DeliveryOrchestrator<C> {
    /// `parallelism` bounds how many recipients of one envelope are in flight
    /// at once; `0` removes the bound.
    pub fn new(client: C, parallelism: usize) -> Self {
        Self {
            client: Arc::new(client),
            parallelism,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Deliver `envelope` using the `table` snapshot.
    ///
    /// Each recipient runs as its own task. Dropping the returned future (the
    /// peer went away) does not cancel deliveries already started; their
    /// replies are simply discarded.
    pub async fn process(&self, envelope: &Envelope, table: Arc<RoutingTable>) -> Vec<ReplyLine> {
        let body: Arc<[u8]> = inject_peer_header(envelope.body(), envelope.peer()).into();
        let sender: Arc<str> = Arc::from(envelope.sender());

        let limit = match self.parallelism {
            0 => envelope.recipients().len().max(1),
            n => n,
        };

        stream::iter(envelope.recipients().iter().cloned())
            .map(|recipient| {
                let attempt = Attempt {
                    client: Arc::clone(&self.client),
                    table: Arc::clone(&table),
                    sender: Arc::clone(&sender),
                    body: Arc::clone(&body),
                    recipient,
                };

                async move {
                    let recipient = attempt.recipient.clone();
                    let outcome = tokio::spawn(attempt.run()).await.unwrap_or_else(|err| {
                        tracing::error!(%recipient, "Delivery task failed: {err}");
                        DeliveryOutcome::unavailable("internal error during delivery")
                    });

                    outcome.to_reply()
                }
            })
            .buffered(limit)
            .collect()
            .await
    }
}

/// Everything one recipient's delivery task owns
struct Attempt<C> {
    client: Arc<C>,
    table: Arc<RoutingTable>,
    sender: Arc<str>,
    body: Arc<[u8]>,
    recipient: String,
}

impl<C: BackendClient> Attempt<C> {
    async fn run(self) -> DeliveryOutcome {
        let recipient = self.recipient.as_str();
        let key = self.table.key_for(recipient);

        let backend = match self.table.resolve_backend(&key) {
            Ok(Route::Backend(name)) => name,
            Ok(Route::Reject) => {
                tracing::info!(recipient, key, "Recipient rejected by routing policy");
                return DeliveryOutcome::rejected(recipient);
            }
            Err(err) => {
                tracing::warn!(recipient, key, "Unable to route recipient: {err}");
                return DeliveryOutcome::unavailable(err.to_string());
            }
        };

        let endpoint = match self.table.resolve_endpoint(&backend) {
            Ok(endpoint) => endpoint,
            Err(err) => {
                tracing::warn!(recipient, key, %backend, "Unable to route recipient: {err}");
                return DeliveryOutcome::unavailable(err.to_string());
            }
        };

        let outcome = self
            .client
            .deliver(endpoint, &self.sender, recipient, &self.body)
            .await;

        match &outcome {
            DeliveryOutcome::BackendUnavailable(reason) => {
                tracing::error!(recipient, %backend, %endpoint, "Backend unavailable: {reason}");
            }
            DeliveryOutcome::Refused { code, .. } | DeliveryOutcome::Rejected { code, .. } => {
                tracing::info!(recipient, %backend, code, "Backend refused recipient");
            }
            DeliveryOutcome::Delivered => {
                tracing::info!(recipient, %backend, "Delivered");
            }
        }

        outcome
    }
}
