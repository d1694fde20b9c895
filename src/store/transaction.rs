//! Composite store operations used by the reconciler.
//!
//! Payment insertion, charge upserts, ledger rematch and audit append share
//! one database transaction so a crash mid-way leaves no partial state.

use crate::model::{EntrantCharge, ExternalPaymentStatus, Payment};
use crate::store::audit_repository::append_audit_rows;
use crate::store::charge_repository::{insert_charge, update_charge};
use crate::store::error::{StoreError, StoreResult};
use crate::store::match_repository::rematch_charges;
use crate::store::payment_repository::{insert_payment, update_payment_guarded};
use crate::store::repository::ReconciliationStore;
use crate::store::PgStore;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
impl ReconciliationStore for PgStore {
    async fn create_payment_with_charges(
        &self,
        payment: &Payment,
        new_charges: &[EntrantCharge],
        reused_charges: &[EntrantCharge],
    ) -> StoreResult<Payment> {
        if new_charges.is_empty() && reused_charges.is_empty() {
            return Err(StoreError::invalid_input("payment covers no charges"));
        }

        let mut tx = self.pool().begin().await.map_err(StoreError::from_sqlx)?;

        let persisted = insert_payment(&mut *tx, payment).await?;
        let payment_id = persisted
            .id
            .ok_or_else(|| StoreError::corrupted("insert returned a payment without an id"))?;

        let mut all_charges = Vec::with_capacity(new_charges.len() + reused_charges.len());
        for charge in new_charges {
            all_charges.push(insert_charge(&mut *tx, charge).await?);
        }
        for charge in reused_charges {
            update_charge(&mut *tx, charge).await?;
            all_charges.push(charge.clone());
        }

        let charge_ids: Vec<Uuid> = all_charges
            .iter()
            .map(|c| {
                c.id.ok_or_else(|| StoreError::corrupted("charge without an id after upsert"))
            })
            .collect::<StoreResult<_>>()?;

        rematch_charges(&mut *tx, &charge_ids, payment_id).await?;
        append_audit_rows(&mut *tx, &all_charges, Some(payment_id)).await?;

        tx.commit().await.map_err(StoreError::from_sqlx)?;
        Ok(persisted)
    }

    async fn apply_status_update(
        &self,
        payment: &Payment,
        charges: &[EntrantCharge],
        rematch: bool,
        expected_status: ExternalPaymentStatus,
    ) -> StoreResult<bool> {
        let payment_id = payment
            .id
            .ok_or_else(|| StoreError::invalid_input("cannot update a transient payment"))?;

        let mut tx = self.pool().begin().await.map_err(StoreError::from_sqlx)?;

        // The status guard and every dependent write share this transaction;
        // a concurrent updater that won the race rolls us back to a no-op.
        if !update_payment_guarded(&mut *tx, payment, expected_status).await? {
            return Ok(false);
        }
        for charge in charges {
            update_charge(&mut *tx, charge).await?;
        }

        if rematch && !charges.is_empty() {
            let charge_ids: Vec<Uuid> = charges
                .iter()
                .map(|c| {
                    c.id.ok_or_else(|| StoreError::invalid_input("transient charge in rematch"))
                })
                .collect::<StoreResult<_>>()?;
            rematch_charges(&mut *tx, &charge_ids, payment_id).await?;
        }

        if !charges.is_empty() {
            append_audit_rows(&mut *tx, charges, Some(payment_id)).await?;
        }

        tx.commit().await.map_err(StoreError::from_sqlx)?;
        Ok(true)
    }
}
