//! Per-recipient replies collected from a backend transaction.

use std::collections::HashMap;

use crate::DeliveryOutcome;

/// A backend's verdict on one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientStatus {
    pub code: u16,
    pub message: Vec<u8>,
}

impl RecipientStatus {
    /// Only 4xx/5xx verdicts are relayed; any other code is a protocol
    /// violation by the backend.
    pub fn outcome(&self) -> DeliveryOutcome {
        match self.code {
            200..300 => DeliveryOutcome::Delivered,
            400..600 => DeliveryOutcome::Refused {
                code: self.code,
                message: self.message.clone(),
            },
            code => {
                DeliveryOutcome::unavailable(format!("backend replied with invalid code {code}"))
            }
        }
    }
}

/// Statuses keyed by the address the backend reported them for.
///
/// Lookup is an explicit two-step policy: the recipient's local part first,
/// then the full address. Recipients that share a local part across domains
/// can collide on the first step; the order is kept for compatibility with
/// existing deployments and is worth revisiting.
#[derive(Debug, Clone, Default)]
pub struct RecipientStatuses {
    statuses: HashMap<String, RecipientStatus>,
}

impl RecipientStatuses {
    pub fn record(&mut self, address: impl Into<String>, code: u16, message: impl Into<Vec<u8>>) {
        self.statuses.insert(
            address.into(),
            RecipientStatus {
                code,
                message: message.into(),
            },
        );
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn lookup(&self, recipient: &str) -> Option<&RecipientStatus> {
        let local_part = recipient
            .split_once('@')
            .map_or(recipient, |(local, _)| local);

        self.statuses
            .get(local_part)
            .or_else(|| self.statuses.get(recipient))
    }

    /// Resolve the recipient's outcome; no recorded status means the backend
    /// never told us, which is treated as unavailable.
    pub fn outcome_for(&self, recipient: &str) -> DeliveryOutcome {
        self.lookup(recipient).map_or_else(
            || DeliveryOutcome::unavailable(format!("no status reported for {recipient}")),
            RecipientStatus::outcome,
        )
    }
}
