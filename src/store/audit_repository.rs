//! Postgres persistence for the audit trail
//! (`t_payment_audit_master` / `t_payment_audit_detail`).
//!
//! Master rows key the trail per (VRN, zone); detail rows record every
//! charge mutation. Both are append-only until the retention cleanup.

use crate::model::{EntrantCharge, InternalChargeStatus, PaymentModification, UpdateActor};
use crate::store::error::{StoreError, StoreResult};
use crate::store::repository::{AuditCleanupSummary, AuditLog};
use crate::store::PgStore;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgConnection};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
struct ModificationRow {
    payment_id: Uuid,
    vrn: String,
    travel_date: NaiveDate,
    charge: i64,
    case_reference: Option<String>,
    status: String,
    inserted_at: DateTime<Utc>,
}

impl ModificationRow {
    fn into_domain(self) -> StoreResult<PaymentModification> {
        Ok(PaymentModification {
            payment_id: self.payment_id,
            vrn: self.vrn,
            travel_date: self.travel_date,
            amount: self.charge,
            case_reference: self.case_reference,
            status: InternalChargeStatus::from_stored(&self.status)
                .map_err(StoreError::corrupted)?,
            modified_at: self.inserted_at,
        })
    }
}

async fn find_or_create_master(
    conn: &mut PgConnection,
    vrn: &str,
    clean_air_zone_id: Uuid,
) -> StoreResult<Uuid> {
    let existing: Option<(Uuid,)> = sqlx::query_as(
        "SELECT master_id FROM t_payment_audit_master \
         WHERE vrn = $1 AND clean_air_zone_id = $2",
    )
    .bind(vrn)
    .bind(clean_air_zone_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(StoreError::from_sqlx)?;

    if let Some((master_id,)) = existing {
        return Ok(master_id);
    }

    let (master_id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO t_payment_audit_master (vrn, clean_air_zone_id) \
         VALUES ($1, $2) \
         RETURNING master_id",
    )
    .bind(vrn)
    .bind(clean_air_zone_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(StoreError::from_sqlx)?;
    Ok(master_id)
}

pub(crate) async fn append_audit_rows(
    conn: &mut PgConnection,
    charges: &[EntrantCharge],
    payment_id: Option<Uuid>,
) -> StoreResult<()> {
    for charge in charges {
        let charge_id = charge
            .id
            .ok_or_else(|| StoreError::invalid_input("cannot audit a transient charge"))?;
        let master_id = find_or_create_master(conn, &charge.vrn, charge.clean_air_zone_id).await?;
        sqlx::query(
            "INSERT INTO t_payment_audit_detail \
               (master_id, payment_id, entrant_charge_id, charge, travel_date, \
                case_reference, status, update_actor) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(master_id)
        .bind(payment_id)
        .bind(charge_id)
        .bind(charge.charge)
        .bind(charge.travel_date)
        .bind(&charge.case_reference)
        .bind(charge.status.as_str())
        .bind(charge.update_actor.as_str())
        .execute(&mut *conn)
        .await
        .map_err(StoreError::from_sqlx)?;
    }
    Ok(())
}

#[async_trait]
impl AuditLog for PgStore {
    async fn append_audit(
        &self,
        charges: &[EntrantCharge],
        payment_id: Option<Uuid>,
    ) -> StoreResult<()> {
        let mut tx = self.pool().begin().await.map_err(StoreError::from_sqlx)?;
        append_audit_rows(&mut *tx, charges, payment_id).await?;
        tx.commit().await.map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn modification_history(
        &self,
        payment_ids: &[Uuid],
        actor: UpdateActor,
        statuses: &[InternalChargeStatus],
    ) -> StoreResult<Vec<PaymentModification>> {
        let status_strings: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let rows = sqlx::query_as::<_, ModificationRow>(
            "SELECT d.payment_id, m.vrn, d.travel_date, d.charge, d.case_reference, \
                    d.status, d.inserted_at \
             FROM t_payment_audit_detail d \
             JOIN t_payment_audit_master m ON m.master_id = d.master_id \
             WHERE d.payment_id = ANY($1) \
               AND d.update_actor = $2 \
               AND d.status = ANY($3) \
             ORDER BY d.inserted_at DESC",
        )
        .bind(payment_ids)
        .bind(actor.as_str())
        .bind(&status_strings)
        .fetch_all(self.pool())
        .await
        .map_err(StoreError::from_sqlx)?;

        rows.into_iter().map(ModificationRow::into_domain).collect()
    }

    async fn cleanup_audit(&self, cutoff: DateTime<Utc>) -> StoreResult<AuditCleanupSummary> {
        let mut tx = self.pool().begin().await.map_err(StoreError::from_sqlx)?;

        let details = sqlx::query("DELETE FROM t_payment_audit_detail WHERE inserted_at < $1")
            .bind(cutoff)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from_sqlx)?;

        let masters = sqlx::query(
            "DELETE FROM t_payment_audit_master m \
             WHERE m.inserted_at < $1 \
               AND NOT EXISTS (SELECT 1 FROM t_payment_audit_detail d \
                               WHERE d.master_id = m.master_id)",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        // A master older than the cutoff that still has children cannot be
        // deleted; its timestamp is pulled forward to its earliest remaining
        // child so the next run retries from a consistent state.
        let reset = sqlx::query(
            "UPDATE t_payment_audit_master m \
             SET inserted_at = child.min_inserted_at \
             FROM (SELECT master_id, MIN(inserted_at) AS min_inserted_at \
                   FROM t_payment_audit_detail GROUP BY master_id) child \
             WHERE child.master_id = m.master_id \
               AND m.inserted_at < $1",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        tx.commit().await.map_err(StoreError::from_sqlx)?;

        let summary = AuditCleanupSummary {
            details_deleted: details.rows_affected(),
            masters_deleted: masters.rows_affected(),
            masters_reset: reset.rows_affected(),
        };
        info!(
            details_deleted = summary.details_deleted,
            masters_deleted = summary.masters_deleted,
            masters_reset = summary.masters_reset,
            "audit retention cleanup completed"
        );
        Ok(summary)
    }
}
