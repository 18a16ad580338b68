use std::sync::Arc;

use mailroute_common::{Envelope, ReplyLine, tracing};
use mailroute_delivery::{BackendClient, DeliveryOrchestrator};
use mailroute_lmtp::EnvelopeHandler;
use mailroute_routing::SharedRoutingTable;

/// Relays every received envelope through the routing table current at the
/// moment the message arrived.
pub struct RelayHandler<C> {
    table: Arc<SharedRoutingTable>,
    orchestrator: DeliveryOrchestrator<C>,
}

impl<C: BackendClient> RelayHandler<C> {
    pub const fn new(table: Arc<SharedRoutingTable>, orchestrator: DeliveryOrchestrator<C>) -> Self {
        Self {
            table,
            orchestrator,
        }
    }
}

impl<C: BackendClient> EnvelopeHandler for RelayHandler<C> {
    async fn handle(&self, envelope: Envelope) -> Vec<ReplyLine> {
        // One snapshot for the whole envelope, even if a reload lands midway
        let table = self.table.load();

        tracing::debug!(
            peer = envelope.peer(),
            sender = envelope.sender(),
            recipients = envelope.recipients().len(),
            "Relaying message"
        );

        self.orchestrator.process(&envelope, table).await
    }
}
