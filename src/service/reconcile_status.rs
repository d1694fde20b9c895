//! Status reconciliation against the external provider.
//!
//! `reconcile` is idempotent: the provider is the source of truth for
//! external status, and an unchanged status produces no writes. The write
//! itself is guarded by compare-and-set inside the store transaction, so
//! concurrent triggers (webhook, poller, sweep) converge on one persisted
//! transition regardless of ordering.

use crate::error::{AppError, AppResult, IntegrityFault};
use crate::events::{EventBus, PaymentEvent};
use crate::gateway::{GatewayError, ProviderGateway};
use crate::model::ExternalPaymentStatus;
use crate::service::status_transition::StatusTransition;
use crate::store::Store;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of one reconciliation pass over a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The provider reported the status we already hold; nothing written.
    Unchanged,
    /// The payment (and possibly its charges) were updated.
    Updated { status: ExternalPaymentStatus },
}

pub struct ReconcileStatusService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn ProviderGateway>,
    events: EventBus,
}

impl ReconcileStatusService {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn ProviderGateway>, events: EventBus) -> Self {
        Self {
            store,
            gateway,
            events,
        }
    }

    /// Fetches the provider's current view of the payment and persists the
    /// difference, if any.
    pub async fn reconcile(&self, payment_id: Uuid) -> AppResult<Outcome> {
        let payment = self
            .store
            .find_payment(payment_id)
            .await?
            .ok_or_else(|| {
                AppError::integrity(IntegrityFault::MissingEntity {
                    entity: "Payment",
                    id: payment_id.to_string(),
                })
            })?;

        let Some(external_id) = payment.external_id.clone() else {
            // Nothing to ask the provider about yet.
            warn!(payment_id = %payment_id, "reconcile skipped: payment has no external id");
            return Ok(Outcome::Unchanged);
        };

        let latest = self.store.find_latest_charges_by_payment(payment_id).await?;
        let charges = if latest.is_empty() {
            // Every match may have been superseded by a newer payment. That
            // payment still deserves its terminal status; its former charges
            // belong to whichever payment holds them now.
            let linked = self.store.find_charges_by_payment(payment_id).await?;
            if linked.is_empty() {
                return Err(AppError::integrity(IntegrityFault::NoMatchedCharges {
                    payment_id,
                }));
            }
            Vec::new()
        } else {
            latest
        };

        let snapshot = self
            .gateway
            .query_transaction(&external_id)
            .await
            .map_err(|err| match err {
                GatewayError::NotFound { external_id } => {
                    AppError::integrity(IntegrityFault::ExternalPaymentMissing {
                        payment_id,
                        external_id,
                    })
                }
                other => AppError::from(other),
            })?;

        if snapshot.status == payment.external_status {
            return Ok(Outcome::Unchanged);
        }

        let transition =
            StatusTransition::build(&payment, &charges, snapshot.status, Utc::now())?;
        let applied = self
            .store
            .apply_status_update(
                &transition.payment,
                &transition.charges,
                transition.rematch,
                payment.external_status,
            )
            .await?;
        if !applied {
            // A concurrent reconcile won the race and already persisted a
            // transition from this status.
            return Ok(Outcome::Unchanged);
        }

        info!(
            payment_id = %payment_id,
            external_id = %external_id,
            from = %payment.external_status,
            to = %snapshot.status,
            charges_paid = transition.charges.len(),
            "payment status reconciled"
        );

        self.events.publish(PaymentEvent::StatusUpdated {
            payment_id,
            external_id: Some(external_id),
            status: snapshot.status,
            payer_email: snapshot.payer_email,
        });

        Ok(Outcome::Updated {
            status: snapshot.status,
        })
    }
}
