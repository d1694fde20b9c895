//! Postgres persistence for payments (`t_payment`).

use crate::model::{ExternalPaymentStatus, PayerIdentity, Payment, PaymentMethod};
use crate::store::error::{StoreError, StoreResult};
use crate::store::repository::PaymentStore;
use crate::store::PgStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

const PAYMENT_COLUMNS: &str = "payment_id, external_id, clean_air_zone_id, method, \
     external_status, total_paid, user_id, operator_id, telephone_payment, mandate_id, \
     case_reference, submitted_timestamp, authorised_timestamp, correlation_id";

#[derive(Debug, Clone, FromRow)]
pub(crate) struct PaymentRow {
    pub payment_id: Uuid,
    pub external_id: Option<String>,
    pub clean_air_zone_id: Uuid,
    pub method: String,
    pub external_status: String,
    pub total_paid: i64,
    pub user_id: Option<Uuid>,
    pub operator_id: Option<Uuid>,
    pub telephone_payment: bool,
    pub mandate_id: Option<String>,
    pub case_reference: Option<String>,
    pub submitted_timestamp: Option<DateTime<Utc>>,
    pub authorised_timestamp: Option<DateTime<Utc>>,
    pub correlation_id: Uuid,
}

impl PaymentRow {
    pub(crate) fn into_domain(self) -> StoreResult<Payment> {
        Ok(Payment {
            id: Some(self.payment_id),
            external_id: self.external_id,
            clean_air_zone_id: self.clean_air_zone_id,
            method: PaymentMethod::from_stored(&self.method).map_err(StoreError::corrupted)?,
            external_status: ExternalPaymentStatus::from_stored(&self.external_status)
                .map_err(StoreError::corrupted)?,
            total_paid: self.total_paid,
            payer: PayerIdentity {
                user_id: self.user_id,
                operator_id: self.operator_id,
                telephone_payment: self.telephone_payment,
            },
            mandate_id: self.mandate_id,
            case_reference: self.case_reference,
            submitted_timestamp: self.submitted_timestamp,
            authorised_timestamp: self.authorised_timestamp,
            correlation_id: self.correlation_id,
            next_url: None,
        })
    }
}

fn check_mandate_consistency(payment: &Payment) -> StoreResult<()> {
    match (payment.method, payment.mandate_id.is_some()) {
        (PaymentMethod::Card, true) => Err(StoreError::invalid_input(
            "card payments must not carry a mandate",
        )),
        (PaymentMethod::DirectDebit, false) => Err(StoreError::invalid_input(
            "direct-debit payments require a mandate",
        )),
        _ => Ok(()),
    }
}

pub(crate) async fn insert_payment(
    conn: &mut PgConnection,
    payment: &Payment,
) -> StoreResult<Payment> {
    if payment.id.is_some() {
        return Err(StoreError::invalid_input("payment IDs are store-assigned"));
    }
    check_mandate_consistency(payment)?;

    sqlx::query_as::<_, PaymentRow>(&format!(
        "INSERT INTO t_payment \
           (external_id, clean_air_zone_id, method, external_status, total_paid, \
            user_id, operator_id, telephone_payment, mandate_id, case_reference, \
            submitted_timestamp, authorised_timestamp, correlation_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(&payment.external_id)
    .bind(payment.clean_air_zone_id)
    .bind(payment.method.as_str())
    .bind(payment.external_status.as_str())
    .bind(payment.total_paid)
    .bind(payment.payer.user_id)
    .bind(payment.payer.operator_id)
    .bind(payment.payer.telephone_payment)
    .bind(&payment.mandate_id)
    .bind(&payment.case_reference)
    .bind(payment.submitted_timestamp)
    .bind(payment.authorised_timestamp)
    .bind(payment.correlation_id)
    .fetch_one(conn)
    .await
    .map_err(StoreError::from_sqlx)?
    .into_domain()
}

pub(crate) async fn update_payment(
    conn: &mut PgConnection,
    payment: &Payment,
) -> StoreResult<()> {
    let id = payment
        .id
        .ok_or_else(|| StoreError::invalid_input("cannot update a transient payment"))?;
    let result = sqlx::query(
        "UPDATE t_payment \
         SET external_id = $2, external_status = $3, case_reference = $4, \
             submitted_timestamp = $5, authorised_timestamp = $6 \
         WHERE payment_id = $1",
    )
    .bind(id)
    .bind(&payment.external_id)
    .bind(payment.external_status.as_str())
    .bind(&payment.case_reference)
    .bind(payment.submitted_timestamp)
    .bind(payment.authorised_timestamp)
    .execute(conn)
    .await
    .map_err(StoreError::from_sqlx)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::not_found("Payment", id.to_string()));
    }
    Ok(())
}

/// Compare-and-set variant of [`update_payment`]: the row is only written
/// while it still holds `expected_status`. Returns `false` when a concurrent
/// update changed the status first.
pub(crate) async fn update_payment_guarded(
    conn: &mut PgConnection,
    payment: &Payment,
    expected_status: ExternalPaymentStatus,
) -> StoreResult<bool> {
    let id = payment
        .id
        .ok_or_else(|| StoreError::invalid_input("cannot update a transient payment"))?;
    let result = sqlx::query(
        "UPDATE t_payment \
         SET external_id = $2, external_status = $3, case_reference = $4, \
             submitted_timestamp = $5, authorised_timestamp = $6 \
         WHERE payment_id = $1 AND external_status = $7",
    )
    .bind(id)
    .bind(&payment.external_id)
    .bind(payment.external_status.as_str())
    .bind(&payment.case_reference)
    .bind(payment.submitted_timestamp)
    .bind(payment.authorised_timestamp)
    .bind(expected_status.as_str())
    .execute(&mut *conn)
    .await
    .map_err(StoreError::from_sqlx)?;

    if result.rows_affected() > 0 {
        return Ok(true);
    }

    let exists: Option<(Uuid,)> =
        sqlx::query_as("SELECT payment_id FROM t_payment WHERE payment_id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(StoreError::from_sqlx)?;
    if exists.is_none() {
        return Err(StoreError::not_found("Payment", id.to_string()));
    }
    Ok(false)
}

#[async_trait]
impl PaymentStore for PgStore {
    async fn insert_payment(&self, payment: &Payment) -> StoreResult<Payment> {
        let mut conn = self.pool().acquire().await.map_err(StoreError::from_sqlx)?;
        insert_payment(&mut *conn, payment).await
    }

    async fn update_payment(&self, payment: &Payment) -> StoreResult<()> {
        let mut conn = self.pool().acquire().await.map_err(StoreError::from_sqlx)?;
        update_payment(&mut *conn, payment).await
    }

    async fn find_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM t_payment WHERE payment_id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(StoreError::from_sqlx)?
        .map(PaymentRow::into_domain)
        .transpose()
    }

    async fn find_payment_by_external_id(
        &self,
        external_id: &str,
    ) -> StoreResult<Option<Payment>> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM t_payment WHERE external_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(self.pool())
        .await
        .map_err(StoreError::from_sqlx)?
        .map(PaymentRow::into_domain)
        .transpose()
    }

    async fn find_payments_by_entrant_charge(
        &self,
        entrant_charge_id: Uuid,
    ) -> StoreResult<Vec<Payment>> {
        sqlx::query_as::<_, PaymentRow>(
            "SELECT p.payment_id, p.external_id, p.clean_air_zone_id, p.method, \
                    p.external_status, p.total_paid, p.user_id, p.operator_id, \
                    p.telephone_payment, p.mandate_id, p.case_reference, \
                    p.submitted_timestamp, p.authorised_timestamp, p.correlation_id \
             FROM t_payment p \
             JOIN t_entrant_charge_match m ON m.payment_id = p.payment_id \
             WHERE m.entrant_charge_id = $1 AND m.latest = true",
        )
        .bind(entrant_charge_id)
        .fetch_all(self.pool())
        .await
        .map_err(StoreError::from_sqlx)?
        .into_iter()
        .map(PaymentRow::into_domain)
        .collect()
    }

    async fn find_dangling_payments(
        &self,
        older_than: DateTime<Utc>,
    ) -> StoreResult<Vec<Payment>> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM t_payment \
             WHERE external_id IS NOT NULL \
               AND submitted_timestamp < $1 \
               AND external_status NOT IN ('SUCCESS', 'FAILED', 'CANCELLED', 'ERROR') \
             ORDER BY submitted_timestamp ASC"
        ))
        .bind(older_than)
        .fetch_all(self.pool())
        .await
        .map_err(StoreError::from_sqlx)?
        .into_iter()
        .map(PaymentRow::into_domain)
        .collect()
    }
}
