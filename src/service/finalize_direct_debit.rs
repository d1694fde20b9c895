//! Finalization of direct-debit collections confirmed out-of-band.
//!
//! The mandate provider confirms collections asynchronously; the embedding
//! application receives that confirmation and calls in here to move the
//! payment to `Success` and settle its charges.

use crate::error::{AppError, AppErrorKind, AppResult, IntegrityFault};
use crate::events::{EventBus, PaymentEvent};
use crate::model::ExternalPaymentStatus;
use crate::service::status_transition::StatusTransition;
use crate::store::Store;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct FinalizeDirectDebitService {
    store: Arc<dyn Store>,
    events: EventBus,
}

impl FinalizeDirectDebitService {
    pub fn new(store: Arc<dyn Store>, events: EventBus) -> Self {
        Self { store, events }
    }

    /// Marks a confirmed direct-debit payment successful: external id and
    /// submission timestamp are recorded, charges flip to `Paid` and the
    /// event for the receipt sender carries the payer's email.
    pub async fn finalize_successful(
        &self,
        payment_id: Uuid,
        external_id: &str,
        payer_email: Option<String>,
    ) -> AppResult<()> {
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

        let charges = self.store.find_latest_charges_by_payment(payment_id).await?;
        if charges.is_empty() {
            return Err(AppError::integrity(IntegrityFault::NoMatchedCharges {
                payment_id,
            }));
        }

        let now = Utc::now();
        let mut transition =
            StatusTransition::build(&payment, &charges, ExternalPaymentStatus::Success, now)?;
        transition.payment.external_id = Some(external_id.to_string());
        if transition.payment.submitted_timestamp.is_none() {
            transition.payment.submitted_timestamp = Some(now);
        }

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
            return Err(AppError::new(AppErrorKind::StaleTransition {
                payment_id,
                status: ExternalPaymentStatus::Success,
            })
            .with_context("payment was updated concurrently during finalization"));
        }

        info!(
            payment_id = %payment_id,
            external_id = %external_id,
            charges_paid = transition.charges.len(),
            "direct-debit payment finalized"
        );

        self.events.publish(PaymentEvent::StatusUpdated {
            payment_id,
            external_id: Some(external_id.to_string()),
            status: ExternalPaymentStatus::Success,
            payer_email,
        });
        Ok(())
    }
}
