//! Postgres persistence for the Match Ledger (`t_entrant_charge_match`).
//!
//! Rows are append-only. A rematch never deletes or re-points: it flips the
//! charge's current `latest = true` row to `false` and appends a fresh row.

use crate::model::MatchLedgerEntry;
use crate::store::error::{StoreError, StoreResult};
use crate::store::repository::MatchLedger;
use crate::store::PgStore;
use async_trait::async_trait;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub(crate) struct MatchRow {
    pub match_id: Uuid,
    pub payment_id: Uuid,
    pub entrant_charge_id: Uuid,
    pub latest: bool,
}

impl MatchRow {
    fn into_domain(self) -> MatchLedgerEntry {
        MatchLedgerEntry {
            id: Some(self.match_id),
            payment_id: self.payment_id,
            entrant_charge_id: self.entrant_charge_id,
            latest: self.latest,
        }
    }
}

pub(crate) async fn rematch_charges(
    conn: &mut PgConnection,
    charge_ids: &[Uuid],
    new_payment_id: Uuid,
) -> StoreResult<()> {
    if charge_ids.is_empty() {
        return Err(StoreError::invalid_input("empty rematch batch"));
    }

    sqlx::query(
        "UPDATE t_entrant_charge_match \
         SET latest = false \
         WHERE entrant_charge_id = ANY($1) AND latest = true",
    )
    .bind(charge_ids)
    .execute(&mut *conn)
    .await
    .map_err(StoreError::from_sqlx)?;

    for charge_id in charge_ids {
        sqlx::query(
            "INSERT INTO t_entrant_charge_match (payment_id, entrant_charge_id, latest) \
             VALUES ($1, $2, true)",
        )
        .bind(new_payment_id)
        .bind(charge_id)
        .execute(&mut *conn)
        .await
        .map_err(StoreError::from_sqlx)?;
    }
    Ok(())
}

#[async_trait]
impl MatchLedger for PgStore {
    async fn rematch(&self, charge_ids: &[Uuid], new_payment_id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool().begin().await.map_err(StoreError::from_sqlx)?;
        rematch_charges(&mut *tx, charge_ids, new_payment_id).await?;
        tx.commit().await.map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn latest_match_for_charge(
        &self,
        entrant_charge_id: Uuid,
    ) -> StoreResult<Option<MatchLedgerEntry>> {
        let rows = sqlx::query_as::<_, MatchRow>(
            "SELECT match_id, payment_id, entrant_charge_id, latest \
             FROM t_entrant_charge_match \
             WHERE entrant_charge_id = $1 AND latest = true",
        )
        .bind(entrant_charge_id)
        .fetch_all(self.pool())
        .await
        .map_err(StoreError::from_sqlx)?;

        if rows.len() > 1 {
            return Err(StoreError::corrupted(format!(
                "{} latest matches for entrant charge {}",
                rows.len(),
                entrant_charge_id
            )));
        }
        Ok(rows.into_iter().next().map(MatchRow::into_domain))
    }

    async fn match_history_for_charge(
        &self,
        entrant_charge_id: Uuid,
    ) -> StoreResult<Vec<MatchLedgerEntry>> {
        let rows = sqlx::query_as::<_, MatchRow>(
            "SELECT match_id, payment_id, entrant_charge_id, latest \
             FROM t_entrant_charge_match \
             WHERE entrant_charge_id = $1 \
             ORDER BY inserted_at ASC",
        )
        .bind(entrant_charge_id)
        .fetch_all(self.pool())
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(rows.into_iter().map(MatchRow::into_domain).collect())
    }
}
