//! Vehicle entrant capture.
//!
//! The zone's camera feed reports vehicle entries in bulk. An entry for an
//! unseen (zone, VRN, date) key creates a `NotPaid` captured charge; an
//! entry for a charge created earlier by an advance payment marks that
//! charge as captured. Either way the caller learns whether the entry is
//! already paid for, and by which payment.

use crate::error::{AppError, AppResult, IntegrityFault};
use crate::model::{
    ChargeKey, EntrantCharge, InternalChargeStatus, Payment, UpdateActor,
};
use crate::store::Store;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// One observed vehicle entry.
#[derive(Debug, Clone)]
pub struct VehicleEntry {
    pub clean_air_zone_id: Uuid,
    pub vrn: String,
    pub travel_date: NaiveDate,
}

/// The charge backing an observed entry, with the settling payment when the
/// charge is paid.
#[derive(Debug, Clone)]
pub struct EntrantRecord {
    pub charge: EntrantCharge,
    pub payment: Option<Payment>,
}

pub struct VehicleEntrantService {
    store: Arc<dyn Store>,
}

impl VehicleEntrantService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Processes a batch of entries. Duplicate keys within the batch are
    /// collapsed; the feed frequently replays sightings.
    pub async fn record_entrants(
        &self,
        entries: &[VehicleEntry],
    ) -> AppResult<Vec<EntrantRecord>> {
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for entry in entries {
            let key = ChargeKey::new(entry.clean_air_zone_id, entry.vrn.clone(), entry.travel_date);
            if !seen.insert(key.clone()) {
                continue;
            }

            let charge = match self.store.find_charge_by_key(&key).await? {
                Some(mut existing) => {
                    if !existing.vehicle_entrant_captured {
                        existing.vehicle_entrant_captured = true;
                        existing.update_actor = UpdateActor::VccsApi;
                        self.store.update_charges(&[existing.clone()]).await?;
                    }
                    existing
                }
                None => {
                    let fresh = EntrantCharge {
                        id: None,
                        clean_air_zone_id: key.clean_air_zone_id,
                        vrn: key.vrn.clone(),
                        travel_date: key.travel_date,
                        tariff_code: None,
                        charge: 0,
                        status: InternalChargeStatus::NotPaid,
                        case_reference: None,
                        vehicle_entrant_captured: true,
                        update_actor: UpdateActor::VccsApi,
                    };
                    self.store
                        .insert_charges(&[fresh])
                        .await?
                        .into_iter()
                        .next()
                        .ok_or_else(|| {
                            AppError::integrity(IntegrityFault::MissingEntity {
                                entity: "EntrantCharge",
                                id: format!("{}/{}", key.vrn, key.travel_date),
                            })
                        })?
                }
            };

            let payment = if charge.status == InternalChargeStatus::Paid {
                self.latest_payment(&charge).await?
            } else {
                None
            };

            records.push(EntrantRecord { charge, payment });
        }

        info!(
            entries = entries.len(),
            recorded = records.len(),
            "vehicle entrants recorded"
        );
        Ok(records)
    }

    async fn latest_payment(&self, charge: &EntrantCharge) -> AppResult<Option<Payment>> {
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
        Ok(related.into_iter().next())
    }
}
