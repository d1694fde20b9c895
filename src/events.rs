//! Domain events emitted when a payment changes status.
//!
//! The reconciler publishes; out-of-process concerns (receipt emails, the
//! export pipeline) subscribe. A broadcast channel keeps the reconciler
//! decoupled from however many listeners the embedder wires up; events for
//! which no receiver exists are dropped, not errors.

use crate::model::ExternalPaymentStatus;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentEvent {
    /// A payment's external status changed and was persisted.
    StatusUpdated {
        payment_id: Uuid,
        external_id: Option<String>,
        status: ExternalPaymentStatus,
        /// Present on success when the provider reported a payer email;
        /// the receipt sender needs it.
        payer_email: Option<String>,
    },
}

/// Broadcast bus for [`PaymentEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PaymentEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PaymentEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event. Having no subscribers is a valid deployment
    /// shape, so send errors are ignored.
    pub fn publish(&self, event: PaymentEvent) {
        if self.sender.send(event).is_err() {
            debug!("payment event dropped: no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
