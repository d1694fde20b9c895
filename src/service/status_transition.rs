//! Low-level builder for a payment status transition.
//!
//! The builder is pure: it takes the current payment, its matched charges
//! and the provider's new status, and produces the rows to persist. An
//! unchanged status is a programming error in the calling service. An empty
//! charge list is allowed and yields a payment-only update, the case of a
//! payment whose charges were all re-matched to a newer payment.

use crate::error::{AppError, AppErrorKind, AppResult, IntegrityFault};
use crate::model::{
    EntrantCharge, ExternalPaymentStatus, InternalChargeStatus, Payment, UpdateActor,
};
use chrono::{DateTime, Utc};

/// The persistable outcome of one status transition.
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub payment: Payment,
    /// Charge rows to update; empty unless the transition derives `Paid`.
    pub charges: Vec<EntrantCharge>,
    /// Whether the ledger must be rewritten to point at this payment.
    pub rematch: bool,
}

impl StatusTransition {
    pub fn build(
        payment: &Payment,
        matched_charges: &[EntrantCharge],
        new_status: ExternalPaymentStatus,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        let payment_id = payment
            .id
            .ok_or_else(|| AppError::integrity(IntegrityFault::MissingEntity {
                entity: "Payment",
                id: "transient".to_string(),
            }))?;

        if new_status == payment.external_status {
            return Err(AppError::new(AppErrorKind::StaleTransition {
                payment_id,
                status: new_status,
            }));
        }

        let mut updated = payment.clone();
        updated.external_status = new_status;
        if new_status == ExternalPaymentStatus::Success {
            updated.authorised_timestamp = Some(now);
        }

        let internal = InternalChargeStatus::from_external(new_status);
        let charges = if internal == InternalChargeStatus::Paid {
            matched_charges
                .iter()
                .map(|charge| {
                    let mut c = charge.clone();
                    c.status = InternalChargeStatus::Paid;
                    c.update_actor = UpdateActor::ProviderSync;
                    c
                })
                .collect()
        } else {
            Vec::new()
        };

        let rematch = !charges.is_empty();
        Ok(Self {
            payment: updated,
            charges,
            rematch,
        })
    }
}
