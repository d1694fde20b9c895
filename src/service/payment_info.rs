//! Read models for the audit/export consumers.

use crate::error::AppResult;
use crate::model::{ChargeSettlementInfo, InternalChargeStatus, PaymentModification, UpdateActor};
use crate::store::Store;
use std::sync::Arc;
use uuid::Uuid;

pub struct PaymentInfoService {
    store: Arc<dyn Store>,
}

impl PaymentInfoService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Latest-matched charges of the given payments with their current
    /// standing. Unknown payment ids contribute nothing.
    pub async fn find_charges_for_payments(
        &self,
        payment_ids: &[Uuid],
    ) -> AppResult<Vec<ChargeSettlementInfo>> {
        let mut infos = Vec::new();
        for &payment_id in payment_ids {
            let Some(payment) = self.store.find_payment(payment_id).await? else {
                continue;
            };
            let charges = self.store.find_latest_charges_by_payment(payment_id).await?;
            for charge in charges {
                infos.push(ChargeSettlementInfo {
                    payment_id,
                    external_id: payment.external_id.clone(),
                    entrant_charge_id: charge.id_or_panic(),
                    vrn: charge.vrn,
                    travel_date: charge.travel_date,
                    tariff_code: charge.tariff_code,
                    charge: charge.charge,
                    status: charge.status,
                    case_reference: charge.case_reference,
                });
            }
        }
        Ok(infos)
    }

    /// Post-hoc local-authority corrections of the given payments, newest
    /// first.
    pub async fn find_modification_history(
        &self,
        payment_ids: &[Uuid],
    ) -> AppResult<Vec<PaymentModification>> {
        let history = self
            .store
            .modification_history(
                payment_ids,
                UpdateActor::LocalAuthority,
                &InternalChargeStatus::modified_statuses(),
            )
            .await?;
        Ok(history)
    }
}
