//! Postgres persistence for entrant charges (`t_entrant_charge`).

use crate::model::{ChargeKey, EntrantCharge, InternalChargeStatus, UpdateActor};
use crate::store::error::{StoreError, StoreResult};
use crate::store::repository::EntrantChargeStore;
use crate::store::PgStore;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

const CHARGE_COLUMNS: &str = "entrant_charge_id, clean_air_zone_id, vrn, travel_date, \
     tariff_code, charge, status, case_reference, vehicle_entrant_captured, update_actor";

#[derive(Debug, Clone, FromRow)]
pub(crate) struct EntrantChargeRow {
    pub entrant_charge_id: Uuid,
    pub clean_air_zone_id: Uuid,
    pub vrn: String,
    pub travel_date: NaiveDate,
    pub tariff_code: Option<String>,
    pub charge: i64,
    pub status: String,
    pub case_reference: Option<String>,
    pub vehicle_entrant_captured: bool,
    pub update_actor: String,
}

impl EntrantChargeRow {
    pub(crate) fn into_domain(self) -> StoreResult<EntrantCharge> {
        Ok(EntrantCharge {
            id: Some(self.entrant_charge_id),
            clean_air_zone_id: self.clean_air_zone_id,
            vrn: self.vrn,
            travel_date: self.travel_date,
            tariff_code: self.tariff_code,
            charge: self.charge,
            status: InternalChargeStatus::from_stored(&self.status)
                .map_err(StoreError::corrupted)?,
            case_reference: self.case_reference,
            vehicle_entrant_captured: self.vehicle_entrant_captured,
            update_actor: UpdateActor::from_stored(&self.update_actor)
                .map_err(StoreError::corrupted)?,
        })
    }
}

pub(crate) async fn insert_charge(
    conn: &mut PgConnection,
    charge: &EntrantCharge,
) -> StoreResult<EntrantCharge> {
    if charge.id.is_some() {
        return Err(StoreError::invalid_input(
            "entrant charge IDs are store-assigned",
        ));
    }
    sqlx::query_as::<_, EntrantChargeRow>(&format!(
        "INSERT INTO t_entrant_charge \
           (clean_air_zone_id, vrn, travel_date, tariff_code, charge, status, \
            case_reference, vehicle_entrant_captured, update_actor) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING {CHARGE_COLUMNS}"
    ))
    .bind(charge.clean_air_zone_id)
    .bind(&charge.vrn)
    .bind(charge.travel_date)
    .bind(&charge.tariff_code)
    .bind(charge.charge)
    .bind(charge.status.as_str())
    .bind(&charge.case_reference)
    .bind(charge.vehicle_entrant_captured)
    .bind(charge.update_actor.as_str())
    .fetch_one(conn)
    .await
    .map_err(StoreError::from_sqlx)?
    .into_domain()
}

pub(crate) async fn update_charge(
    conn: &mut PgConnection,
    charge: &EntrantCharge,
) -> StoreResult<()> {
    let id = charge
        .id
        .ok_or_else(|| StoreError::invalid_input("cannot update a transient entrant charge"))?;
    let result = sqlx::query(
        "UPDATE t_entrant_charge \
         SET tariff_code = $2, charge = $3, status = $4, case_reference = $5, \
             vehicle_entrant_captured = $6, update_actor = $7 \
         WHERE entrant_charge_id = $1",
    )
    .bind(id)
    .bind(&charge.tariff_code)
    .bind(charge.charge)
    .bind(charge.status.as_str())
    .bind(&charge.case_reference)
    .bind(charge.vehicle_entrant_captured)
    .bind(charge.update_actor.as_str())
    .execute(conn)
    .await
    .map_err(StoreError::from_sqlx)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::not_found("EntrantCharge", id.to_string()));
    }
    Ok(())
}

#[async_trait]
impl EntrantChargeStore for PgStore {
    async fn insert_charges(&self, charges: &[EntrantCharge]) -> StoreResult<Vec<EntrantCharge>> {
        if charges.is_empty() {
            return Err(StoreError::invalid_input("empty charge batch"));
        }
        let mut tx = self.pool().begin().await.map_err(StoreError::from_sqlx)?;
        let mut inserted = Vec::with_capacity(charges.len());
        for charge in charges {
            inserted.push(insert_charge(&mut *tx, charge).await?);
        }
        tx.commit().await.map_err(StoreError::from_sqlx)?;
        Ok(inserted)
    }

    async fn update_charges(&self, charges: &[EntrantCharge]) -> StoreResult<()> {
        let mut tx = self.pool().begin().await.map_err(StoreError::from_sqlx)?;
        for charge in charges {
            update_charge(&mut *tx, charge).await?;
        }
        tx.commit().await.map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn find_charge_by_key(&self, key: &ChargeKey) -> StoreResult<Option<EntrantCharge>> {
        sqlx::query_as::<_, EntrantChargeRow>(&format!(
            "SELECT {CHARGE_COLUMNS} FROM t_entrant_charge \
             WHERE clean_air_zone_id = $1 AND vrn = $2 AND travel_date = $3"
        ))
        .bind(key.clean_air_zone_id)
        .bind(&key.vrn)
        .bind(key.travel_date)
        .fetch_optional(self.pool())
        .await
        .map_err(StoreError::from_sqlx)?
        .map(EntrantChargeRow::into_domain)
        .transpose()
    }

    async fn find_charges_by_keys(
        &self,
        clean_air_zone_id: Uuid,
        vrn: &str,
        travel_dates: &[NaiveDate],
    ) -> StoreResult<Vec<EntrantCharge>> {
        sqlx::query_as::<_, EntrantChargeRow>(&format!(
            "SELECT {CHARGE_COLUMNS} FROM t_entrant_charge \
             WHERE clean_air_zone_id = $1 AND vrn = $2 AND travel_date = ANY($3) \
             ORDER BY travel_date ASC"
        ))
        .bind(clean_air_zone_id)
        .bind(vrn)
        .bind(travel_dates)
        .fetch_all(self.pool())
        .await
        .map_err(StoreError::from_sqlx)?
        .into_iter()
        .map(EntrantChargeRow::into_domain)
        .collect()
    }

    async fn find_charges_by_payment(&self, payment_id: Uuid) -> StoreResult<Vec<EntrantCharge>> {
        sqlx::query_as::<_, EntrantChargeRow>(
            "SELECT DISTINCT c.entrant_charge_id, c.clean_air_zone_id, c.vrn, c.travel_date, \
                    c.tariff_code, c.charge, c.status, c.case_reference, \
                    c.vehicle_entrant_captured, c.update_actor \
             FROM t_entrant_charge c \
             JOIN t_entrant_charge_match m ON m.entrant_charge_id = c.entrant_charge_id \
             WHERE m.payment_id = $1 \
             ORDER BY c.vrn ASC, c.travel_date ASC",
        )
        .bind(payment_id)
        .fetch_all(self.pool())
        .await
        .map_err(StoreError::from_sqlx)?
        .into_iter()
        .map(EntrantChargeRow::into_domain)
        .collect()
    }

    async fn find_latest_charges_by_payment(
        &self,
        payment_id: Uuid,
    ) -> StoreResult<Vec<EntrantCharge>> {
        sqlx::query_as::<_, EntrantChargeRow>(
            "SELECT c.entrant_charge_id, c.clean_air_zone_id, c.vrn, c.travel_date, \
                    c.tariff_code, c.charge, c.status, c.case_reference, \
                    c.vehicle_entrant_captured, c.update_actor \
             FROM t_entrant_charge c \
             JOIN t_entrant_charge_match m ON m.entrant_charge_id = c.entrant_charge_id \
             WHERE m.payment_id = $1 AND m.latest = true \
             ORDER BY c.vrn ASC, c.travel_date ASC",
        )
        .bind(payment_id)
        .fetch_all(self.pool())
        .await
        .map_err(StoreError::from_sqlx)?
        .into_iter()
        .map(EntrantChargeRow::into_domain)
        .collect()
    }
}
