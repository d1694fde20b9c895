//! Local-authority settlement corrections.
//!
//! Refunds, chargebacks and failed representments arrive from the local
//! authority's case workers, never from provider sync. A correction rewrites
//! the charge's current status and appends to the audit trail; the Match
//! Ledger is untouched, so history lookups still show which payment settled
//! the charge at the time.

use crate::error::{AppError, AppErrorKind, AppResult, IntegrityFault, ValidationFault};
use crate::model::{ChargeKey, InternalChargeStatus, UpdateActor};
use crate::store::Store;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// One correction to apply.
#[derive(Debug, Clone)]
pub struct ChargeCorrection {
    pub clean_air_zone_id: Uuid,
    pub vrn: String,
    pub travel_date: NaiveDate,
    /// Must be one of the modification statuses (Refunded, Chargeback,
    /// Failed).
    pub target_status: InternalChargeStatus,
    pub case_reference: String,
}

/// Typed answer to a charge-status lookup. "Not found" is an expected
/// outcome for a vehicle that never paid, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeStatusLookup {
    Found {
        external_id: Option<String>,
        status: InternalChargeStatus,
        case_reference: Option<String>,
    },
    NotFound,
}

pub struct SettlementService {
    store: Arc<dyn Store>,
}

impl SettlementService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Applies a batch of corrections. Each correction must target a `Paid`
    /// charge with a modification status; the whole batch is validated
    /// before the first write.
    pub async fn apply_corrections(&self, corrections: &[ChargeCorrection]) -> AppResult<()> {
        if corrections.is_empty() {
            return Err(AppError::validation(ValidationFault::EmptyChargeSet));
        }

        let mut prepared = Vec::with_capacity(corrections.len());
        for correction in corrections {
            if !correction.target_status.is_modification() {
                return Err(AppError::validation(
                    ValidationFault::CorrectionNotApplicable {
                        vrn: correction.vrn.clone(),
                        status: correction.target_status.to_string(),
                    },
                )
                .with_context("correction target must be a modification status"));
            }

            let key = ChargeKey::new(
                correction.clean_air_zone_id,
                correction.vrn.clone(),
                correction.travel_date,
            );
            let charge = self.store.find_charge_by_key(&key).await?.ok_or_else(|| {
                AppError::integrity(IntegrityFault::MissingEntity {
                    entity: "EntrantCharge",
                    id: format!("{}/{}", key.vrn, key.travel_date),
                })
            })?;

            if charge.status != InternalChargeStatus::Paid {
                return Err(AppError::validation(
                    ValidationFault::CorrectionNotApplicable {
                        vrn: charge.vrn.clone(),
                        status: charge.status.to_string(),
                    },
                )
                .with_context("only paid charges can be corrected"));
            }

            let charge_id = charge.id_or_panic();
            let related = self
                .store
                .find_payments_by_entrant_charge(charge_id)
                .await?;
            if related.len() > 1 {
                return Err(AppError::integrity(
                    IntegrityFault::MultiplePaymentsForCharge {
                        entrant_charge_id: charge_id,
                        count: related.len(),
                    },
                ));
            }
            let payment = related.into_iter().next().ok_or_else(|| {
                AppError::integrity(IntegrityFault::MissingEntity {
                    entity: "Payment",
                    id: format!("latest match of charge {}", charge_id),
                })
            })?;

            let mut corrected = charge;
            corrected.status = correction.target_status;
            corrected.case_reference = Some(correction.case_reference.clone());
            corrected.update_actor = UpdateActor::LocalAuthority;
            prepared.push((payment, corrected));
        }

        for (payment, corrected) in prepared {
            // Payment row is written unchanged; the composite operation
            // keeps charge update and audit append in one transaction.
            let applied = self
                .store
                .apply_status_update(
                    &payment,
                    &[corrected.clone()],
                    false,
                    payment.external_status,
                )
                .await?;
            if !applied {
                return Err(AppError::new(AppErrorKind::StaleTransition {
                    payment_id: payment.id_or_panic(),
                    status: payment.external_status,
                })
                .with_context("payment was updated concurrently during correction"));
            }
            info!(
                vrn = %corrected.vrn,
                travel_date = %corrected.travel_date,
                status = %corrected.status,
                case_reference = %corrected.case_reference.as_deref().unwrap_or(""),
                "settlement correction applied"
            );
        }
        Ok(())
    }

    /// Current standing of one charge, with the external payment id of its
    /// latest match when one exists.
    pub async fn charge_status(
        &self,
        clean_air_zone_id: Uuid,
        vrn: &str,
        travel_date: NaiveDate,
    ) -> AppResult<ChargeStatusLookup> {
        let key = ChargeKey::new(clean_air_zone_id, vrn, travel_date);
        let Some(charge) = self.store.find_charge_by_key(&key).await? else {
            return Ok(ChargeStatusLookup::NotFound);
        };

        let charge_id = charge.id_or_panic();
        let related = self
            .store
            .find_payments_by_entrant_charge(charge_id)
            .await?;
        if related.len() > 1 {
            return Err(AppError::integrity(
                IntegrityFault::MultiplePaymentsForCharge {
                    entrant_charge_id: charge_id,
                    count: related.len(),
                },
            ));
        }

        Ok(ChargeStatusLookup::Found {
            external_id: related.into_iter().next().and_then(|p| p.external_id),
            status: charge.status,
            case_reference: charge.case_reference,
        })
    }
}
