//! Store traits of the reconciliation core.
//!
//! Each trait covers one table family; [`ReconciliationStore`] adds the
//! composite operations that must run atomically across all of them. The
//! Postgres implementation backs every trait with one `PgStore`; the
//! in-memory implementation backs them with one mutex-guarded state.

use crate::model::{
    ChargeKey, EntrantCharge, ExternalPaymentStatus, InternalChargeStatus, MatchLedgerEntry,
    Payment, PaymentModification, UpdateActor,
};
use crate::store::error::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// One row per (zone, VRN, travel date).
#[async_trait]
pub trait EntrantChargeStore: Send + Sync {
    /// Inserts new charges. Charges carrying a pre-set ID or duplicating an
    /// existing (zone, VRN, date) key are rejected.
    async fn insert_charges(&self, charges: &[EntrantCharge]) -> StoreResult<Vec<EntrantCharge>>;

    /// Updates the mutable fields (status, tariff, charge, case reference,
    /// captured flag, actor) of persisted charges.
    async fn update_charges(&self, charges: &[EntrantCharge]) -> StoreResult<()>;

    async fn find_charge_by_key(&self, key: &ChargeKey) -> StoreResult<Option<EntrantCharge>>;

    /// Batch lookup for one vehicle across several travel dates.
    async fn find_charges_by_keys(
        &self,
        clean_air_zone_id: Uuid,
        vrn: &str,
        travel_dates: &[NaiveDate],
    ) -> StoreResult<Vec<EntrantCharge>>;

    /// All charges currently or historically linked to the payment through
    /// the Match Ledger, including links superseded by a later rematch.
    async fn find_charges_by_payment(&self, payment_id: Uuid) -> StoreResult<Vec<EntrantCharge>>;

    /// Only the charges whose `latest = true` ledger entry points at the
    /// payment.
    async fn find_latest_charges_by_payment(
        &self,
        payment_id: Uuid,
    ) -> StoreResult<Vec<EntrantCharge>>;
}

/// One row per external transaction.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts a new payment. Pre-set IDs and method/mandate inconsistencies
    /// (Card with a mandate, DirectDebit without one) are rejected.
    async fn insert_payment(&self, payment: &Payment) -> StoreResult<Payment>;

    async fn update_payment(&self, payment: &Payment) -> StoreResult<()>;

    async fn find_payment(&self, id: Uuid) -> StoreResult<Option<Payment>>;

    async fn find_payment_by_external_id(&self, external_id: &str)
        -> StoreResult<Option<Payment>>;

    /// Payments reachable from a charge's `latest = true` match. More than
    /// one element breaks the single-latest invariant; callers must treat it
    /// as fatal, never pick one.
    async fn find_payments_by_entrant_charge(
        &self,
        entrant_charge_id: Uuid,
    ) -> StoreResult<Vec<Payment>>;

    /// Payments with an external id, submitted before `older_than`, whose
    /// status is non-terminal.
    async fn find_dangling_payments(
        &self,
        older_than: DateTime<Utc>,
    ) -> StoreResult<Vec<Payment>>;
}

/// Append-only link table between charges and payments.
#[async_trait]
pub trait MatchLedger: Send + Sync {
    /// Flips the current `latest = true` row of each charge to `false` and
    /// appends fresh `latest = true` rows pointing at `new_payment_id`, in
    /// one atomic unit. Nothing is deleted or re-pointed.
    async fn rematch(&self, charge_ids: &[Uuid], new_payment_id: Uuid) -> StoreResult<()>;

    async fn latest_match_for_charge(
        &self,
        entrant_charge_id: Uuid,
    ) -> StoreResult<Option<MatchLedgerEntry>>;

    /// Full match history of a charge in insertion order.
    async fn match_history_for_charge(
        &self,
        entrant_charge_id: Uuid,
    ) -> StoreResult<Vec<MatchLedgerEntry>>;
}

/// Outcome of one retention cleanup run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditCleanupSummary {
    pub details_deleted: u64,
    pub masters_deleted: u64,
    pub masters_reset: u64,
}

/// Append-only audit master/detail records, written on every charge
/// mutation and kept independent of the Match Ledger.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Appends one detail row per charge, creating the per-(VRN, zone)
    /// master row if none exists yet.
    async fn append_audit(
        &self,
        charges: &[EntrantCharge],
        payment_id: Option<Uuid>,
    ) -> StoreResult<()>;

    /// Audit rows matching the given payments, actor and statuses, newest
    /// first.
    async fn modification_history(
        &self,
        payment_ids: &[Uuid],
        actor: UpdateActor,
        statuses: &[InternalChargeStatus],
    ) -> StoreResult<Vec<PaymentModification>>;

    /// Deletes detail rows older than `cutoff`, then masters whose details
    /// are all gone. A master that still has children gets its insertion
    /// timestamp reset to the earliest remaining child's.
    async fn cleanup_audit(&self, cutoff: DateTime<Utc>) -> StoreResult<AuditCleanupSummary>;
}

/// Composite operations spanning several tables in one transaction.
#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    /// Persists a freshly initiated payment together with its charges: new
    /// charges inserted, reused charges updated, the ledger rematched to the
    /// new payment and the audit trail appended. All or nothing.
    async fn create_payment_with_charges(
        &self,
        payment: &Payment,
        new_charges: &[EntrantCharge],
        reused_charges: &[EntrantCharge],
    ) -> StoreResult<Payment>;

    /// Persists the result of a status transition: the payment row, the
    /// updated charge rows (may be empty), optionally a ledger rematch, and
    /// the audit trail. All or nothing, and guarded by compare-and-set: the
    /// write only applies while the payment row still holds
    /// `expected_status`. Returns `false`, writing nothing at all, when a
    /// concurrent update got there first.
    async fn apply_status_update(
        &self,
        payment: &Payment,
        charges: &[EntrantCharge],
        rematch: bool,
        expected_status: ExternalPaymentStatus,
    ) -> StoreResult<bool>;
}

/// Everything the services need from persistence, as one object-safe bound.
pub trait Store:
    EntrantChargeStore + PaymentStore + MatchLedger + AuditLog + ReconciliationStore
{
}

impl<T> Store for T where
    T: EntrantChargeStore + PaymentStore + MatchLedger + AuditLog + ReconciliationStore
{
}
