//! In-memory implementation of the store traits.
//!
//! One `Mutex` guards the whole state; each trait method (and each composite
//! operation) takes the lock exactly once, which gives the same atomicity
//! the Postgres implementation gets from a database transaction. Used by the
//! integration tests and available to embedders for testing.

use crate::model::{
    ChargeKey, EntrantCharge, ExternalPaymentStatus, InternalChargeStatus, MatchLedgerEntry,
    Payment, PaymentMethod, PaymentModification, UpdateActor,
};
use crate::store::error::{StoreError, StoreErrorKind, StoreResult};
use crate::store::repository::{
    AuditCleanupSummary, AuditLog, EntrantChargeStore, MatchLedger, PaymentStore,
    ReconciliationStore,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredMatch {
    id: Uuid,
    payment_id: Uuid,
    entrant_charge_id: Uuid,
    latest: bool,
}

#[derive(Debug, Clone)]
struct AuditMaster {
    id: Uuid,
    inserted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct AuditDetail {
    master_id: Uuid,
    payment_id: Option<Uuid>,
    #[allow(dead_code)]
    entrant_charge_id: Uuid,
    vrn: String,
    charge: i64,
    travel_date: NaiveDate,
    case_reference: Option<String>,
    status: InternalChargeStatus,
    update_actor: UpdateActor,
    inserted_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    charges: HashMap<Uuid, EntrantCharge>,
    charge_keys: HashMap<ChargeKey, Uuid>,
    payments: HashMap<Uuid, Payment>,
    matches: Vec<StoredMatch>,
    audit_masters: HashMap<(String, Uuid), AuditMaster>,
    audit_details: Vec<AuditDetail>,
}

/// In-memory store with the same semantics as the Postgres repositories.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| {
            StoreError::new(StoreErrorKind::Unknown {
                message: "store mutex poisoned".to_string(),
            })
        })
    }

    /// Test helper: appends audit rows with an explicit timestamp so that
    /// retention behavior can be exercised without waiting for months.
    pub fn append_audit_at(
        &self,
        charges: &[EntrantCharge],
        payment_id: Option<Uuid>,
        inserted_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.lock()?;
        append_audit_locked(&mut state, charges, payment_id, inserted_at)
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

fn insert_charge_locked(state: &mut State, charge: &EntrantCharge) -> StoreResult<EntrantCharge> {
    if charge.id.is_some() {
        return Err(StoreError::invalid_input(
            "entrant charge IDs are store-assigned",
        ));
    }
    let key = charge.key();
    if state.charge_keys.contains_key(&key) {
        return Err(StoreError::new(StoreErrorKind::UniqueViolation {
            constraint: "uq_entrant_charge_key".to_string(),
        }));
    }
    let id = Uuid::new_v4();
    let mut persisted = charge.clone();
    persisted.id = Some(id);
    state.charge_keys.insert(key, id);
    state.charges.insert(id, persisted.clone());
    Ok(persisted)
}

fn update_charge_locked(state: &mut State, charge: &EntrantCharge) -> StoreResult<()> {
    let id = charge
        .id
        .ok_or_else(|| StoreError::invalid_input("cannot update a transient entrant charge"))?;
    let existing = state
        .charges
        .get_mut(&id)
        .ok_or_else(|| StoreError::not_found("EntrantCharge", id.to_string()))?;
    existing.tariff_code = charge.tariff_code.clone();
    existing.charge = charge.charge;
    existing.status = charge.status;
    existing.case_reference = charge.case_reference.clone();
    existing.vehicle_entrant_captured = charge.vehicle_entrant_captured;
    existing.update_actor = charge.update_actor;
    Ok(())
}

fn insert_payment_locked(state: &mut State, payment: &Payment) -> StoreResult<Payment> {
    if payment.id.is_some() {
        return Err(StoreError::invalid_input("payment IDs are store-assigned"));
    }
    check_mandate_consistency(payment)?;
    let id = Uuid::new_v4();
    let mut persisted = payment.clone();
    persisted.id = Some(id);
    persisted.next_url = None;
    state.payments.insert(id, persisted.clone());
    Ok(persisted)
}

fn update_payment_locked(state: &mut State, payment: &Payment) -> StoreResult<()> {
    let id = payment
        .id
        .ok_or_else(|| StoreError::invalid_input("cannot update a transient payment"))?;
    let existing = state
        .payments
        .get_mut(&id)
        .ok_or_else(|| StoreError::not_found("Payment", id.to_string()))?;
    existing.external_id = payment.external_id.clone();
    existing.external_status = payment.external_status;
    existing.case_reference = payment.case_reference.clone();
    existing.submitted_timestamp = payment.submitted_timestamp;
    existing.authorised_timestamp = payment.authorised_timestamp;
    Ok(())
}

fn rematch_locked(state: &mut State, charge_ids: &[Uuid], new_payment_id: Uuid) -> StoreResult<()> {
    if charge_ids.is_empty() {
        return Err(StoreError::invalid_input("empty rematch batch"));
    }
    for entry in state.matches.iter_mut() {
        if entry.latest && charge_ids.contains(&entry.entrant_charge_id) {
            entry.latest = false;
        }
    }
    for charge_id in charge_ids {
        state.matches.push(StoredMatch {
            id: Uuid::new_v4(),
            payment_id: new_payment_id,
            entrant_charge_id: *charge_id,
            latest: true,
        });
    }
    Ok(())
}

fn append_audit_locked(
    state: &mut State,
    charges: &[EntrantCharge],
    payment_id: Option<Uuid>,
    inserted_at: DateTime<Utc>,
) -> StoreResult<()> {
    for charge in charges {
        let charge_id = charge
            .id
            .ok_or_else(|| StoreError::invalid_input("cannot audit a transient charge"))?;
        let master_key = (charge.vrn.clone(), charge.clean_air_zone_id);
        let master_id = state
            .audit_masters
            .entry(master_key)
            .or_insert_with(|| AuditMaster {
                id: Uuid::new_v4(),
                inserted_at,
            })
            .id;
        state.audit_details.push(AuditDetail {
            master_id,
            payment_id,
            entrant_charge_id: charge_id,
            vrn: charge.vrn.clone(),
            charge: charge.charge,
            travel_date: charge.travel_date,
            case_reference: charge.case_reference.clone(),
            status: charge.status,
            update_actor: charge.update_actor,
            inserted_at,
        });
    }
    Ok(())
}

#[async_trait]
impl EntrantChargeStore for InMemoryStore {
    async fn insert_charges(&self, charges: &[EntrantCharge]) -> StoreResult<Vec<EntrantCharge>> {
        if charges.is_empty() {
            return Err(StoreError::invalid_input("empty charge batch"));
        }
        let mut state = self.lock()?;
        let mut inserted = Vec::with_capacity(charges.len());
        for charge in charges {
            inserted.push(insert_charge_locked(&mut state, charge)?);
        }
        Ok(inserted)
    }

    async fn update_charges(&self, charges: &[EntrantCharge]) -> StoreResult<()> {
        let mut state = self.lock()?;
        for charge in charges {
            update_charge_locked(&mut state, charge)?;
        }
        Ok(())
    }

    async fn find_charge_by_key(&self, key: &ChargeKey) -> StoreResult<Option<EntrantCharge>> {
        let state = self.lock()?;
        Ok(state
            .charge_keys
            .get(key)
            .and_then(|id| state.charges.get(id))
            .cloned())
    }

    async fn find_charges_by_keys(
        &self,
        clean_air_zone_id: Uuid,
        vrn: &str,
        travel_dates: &[NaiveDate],
    ) -> StoreResult<Vec<EntrantCharge>> {
        let state = self.lock()?;
        let mut found: Vec<EntrantCharge> = travel_dates
            .iter()
            .filter_map(|date| {
                let key = ChargeKey::new(clean_air_zone_id, vrn, *date);
                state
                    .charge_keys
                    .get(&key)
                    .and_then(|id| state.charges.get(id))
                    .cloned()
            })
            .collect();
        found.sort_by_key(|c| c.travel_date);
        Ok(found)
    }

    async fn find_charges_by_payment(&self, payment_id: Uuid) -> StoreResult<Vec<EntrantCharge>> {
        let state = self.lock()?;
        let mut seen = std::collections::HashSet::new();
        let mut found: Vec<EntrantCharge> = state
            .matches
            .iter()
            .filter(|m| m.payment_id == payment_id && seen.insert(m.entrant_charge_id))
            .filter_map(|m| state.charges.get(&m.entrant_charge_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| (&a.vrn, a.travel_date).cmp(&(&b.vrn, b.travel_date)));
        Ok(found)
    }

    async fn find_latest_charges_by_payment(
        &self,
        payment_id: Uuid,
    ) -> StoreResult<Vec<EntrantCharge>> {
        let state = self.lock()?;
        let mut found: Vec<EntrantCharge> = state
            .matches
            .iter()
            .filter(|m| m.payment_id == payment_id && m.latest)
            .filter_map(|m| state.charges.get(&m.entrant_charge_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| (&a.vrn, a.travel_date).cmp(&(&b.vrn, b.travel_date)));
        Ok(found)
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn insert_payment(&self, payment: &Payment) -> StoreResult<Payment> {
        let mut state = self.lock()?;
        insert_payment_locked(&mut state, payment)
    }

    async fn update_payment(&self, payment: &Payment) -> StoreResult<()> {
        let mut state = self.lock()?;
        update_payment_locked(&mut state, payment)
    }

    async fn find_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        let state = self.lock()?;
        Ok(state.payments.get(&id).cloned())
    }

    async fn find_payment_by_external_id(
        &self,
        external_id: &str,
    ) -> StoreResult<Option<Payment>> {
        let state = self.lock()?;
        Ok(state
            .payments
            .values()
            .find(|p| p.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn find_payments_by_entrant_charge(
        &self,
        entrant_charge_id: Uuid,
    ) -> StoreResult<Vec<Payment>> {
        let state = self.lock()?;
        Ok(state
            .matches
            .iter()
            .filter(|m| m.entrant_charge_id == entrant_charge_id && m.latest)
            .filter_map(|m| state.payments.get(&m.payment_id))
            .cloned()
            .collect())
    }

    async fn find_dangling_payments(
        &self,
        older_than: DateTime<Utc>,
    ) -> StoreResult<Vec<Payment>> {
        let state = self.lock()?;
        let mut found: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| {
                p.external_id.is_some()
                    && p.external_status.is_not_finished()
                    && p.submitted_timestamp
                        .map(|t| t < older_than)
                        .unwrap_or(false)
            })
            .cloned()
            .collect();
        found.sort_by_key(|p| p.submitted_timestamp);
        Ok(found)
    }
}

#[async_trait]
impl MatchLedger for InMemoryStore {
    async fn rematch(&self, charge_ids: &[Uuid], new_payment_id: Uuid) -> StoreResult<()> {
        let mut state = self.lock()?;
        rematch_locked(&mut state, charge_ids, new_payment_id)
    }

    async fn latest_match_for_charge(
        &self,
        entrant_charge_id: Uuid,
    ) -> StoreResult<Option<MatchLedgerEntry>> {
        let state = self.lock()?;
        let latest: Vec<&StoredMatch> = state
            .matches
            .iter()
            .filter(|m| m.entrant_charge_id == entrant_charge_id && m.latest)
            .collect();
        if latest.len() > 1 {
            return Err(StoreError::corrupted(format!(
                "{} latest matches for entrant charge {}",
                latest.len(),
                entrant_charge_id
            )));
        }
        Ok(latest.first().map(|m| MatchLedgerEntry {
            id: Some(m.id),
            payment_id: m.payment_id,
            entrant_charge_id: m.entrant_charge_id,
            latest: m.latest,
        }))
    }

    async fn match_history_for_charge(
        &self,
        entrant_charge_id: Uuid,
    ) -> StoreResult<Vec<MatchLedgerEntry>> {
        let state = self.lock()?;
        Ok(state
            .matches
            .iter()
            .filter(|m| m.entrant_charge_id == entrant_charge_id)
            .map(|m| MatchLedgerEntry {
                id: Some(m.id),
                payment_id: m.payment_id,
                entrant_charge_id: m.entrant_charge_id,
                latest: m.latest,
            })
            .collect())
    }
}

#[async_trait]
impl AuditLog for InMemoryStore {
    async fn append_audit(
        &self,
        charges: &[EntrantCharge],
        payment_id: Option<Uuid>,
    ) -> StoreResult<()> {
        let mut state = self.lock()?;
        append_audit_locked(&mut state, charges, payment_id, Utc::now())
    }

    async fn modification_history(
        &self,
        payment_ids: &[Uuid],
        actor: UpdateActor,
        statuses: &[InternalChargeStatus],
    ) -> StoreResult<Vec<PaymentModification>> {
        let state = self.lock()?;
        let mut rows: Vec<PaymentModification> = state
            .audit_details
            .iter()
            .filter(|d| {
                d.payment_id.map(|id| payment_ids.contains(&id)).unwrap_or(false)
                    && d.update_actor == actor
                    && statuses.contains(&d.status)
            })
            .map(|d| PaymentModification {
                payment_id: d.payment_id.expect("filtered on payment_id"),
                vrn: d.vrn.clone(),
                travel_date: d.travel_date,
                amount: d.charge,
                case_reference: d.case_reference.clone(),
                status: d.status,
                modified_at: d.inserted_at,
            })
            .collect();
        rows.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        Ok(rows)
    }

    async fn cleanup_audit(&self, cutoff: DateTime<Utc>) -> StoreResult<AuditCleanupSummary> {
        let mut state = self.lock()?;
        let mut summary = AuditCleanupSummary::default();

        let before = state.audit_details.len();
        state.audit_details.retain(|d| d.inserted_at >= cutoff);
        summary.details_deleted = (before - state.audit_details.len()) as u64;

        let mut min_child: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
        for detail in &state.audit_details {
            min_child
                .entry(detail.master_id)
                .and_modify(|t| *t = (*t).min(detail.inserted_at))
                .or_insert(detail.inserted_at);
        }

        state.audit_masters.retain(|_, master| {
            if master.inserted_at >= cutoff {
                return true;
            }
            match min_child.get(&master.id) {
                Some(min) => {
                    master.inserted_at = *min;
                    summary.masters_reset += 1;
                    true
                }
                None => {
                    summary.masters_deleted += 1;
                    false
                }
            }
        });

        Ok(summary)
    }
}

#[async_trait]
impl ReconciliationStore for InMemoryStore {
    async fn create_payment_with_charges(
        &self,
        payment: &Payment,
        new_charges: &[EntrantCharge],
        reused_charges: &[EntrantCharge],
    ) -> StoreResult<Payment> {
        if new_charges.is_empty() && reused_charges.is_empty() {
            return Err(StoreError::invalid_input("payment covers no charges"));
        }
        let mut state = self.lock()?;

        let persisted = insert_payment_locked(&mut state, payment)?;
        let payment_id = persisted.id.expect("just assigned");

        let mut all_charges = Vec::with_capacity(new_charges.len() + reused_charges.len());
        for charge in new_charges {
            all_charges.push(insert_charge_locked(&mut state, charge)?);
        }
        for charge in reused_charges {
            update_charge_locked(&mut state, charge)?;
            all_charges.push(charge.clone());
        }

        let charge_ids: Vec<Uuid> = all_charges
            .iter()
            .map(|c| c.id.expect("persisted above"))
            .collect();
        rematch_locked(&mut state, &charge_ids, payment_id)?;
        append_audit_locked(&mut state, &all_charges, Some(payment_id), Utc::now())?;

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
        let mut state = self.lock()?;

        // Status guard and writes run under the same lock, mirroring the
        // single database transaction of the Postgres implementation.
        let current = state
            .payments
            .get(&payment_id)
            .ok_or_else(|| StoreError::not_found("Payment", payment_id.to_string()))?;
        if current.external_status != expected_status {
            return Ok(false);
        }

        update_payment_locked(&mut state, payment)?;
        for charge in charges {
            update_charge_locked(&mut state, charge)?;
        }

        if rematch && !charges.is_empty() {
            let charge_ids: Vec<Uuid> = charges
                .iter()
                .map(|c| {
                    c.id.ok_or_else(|| StoreError::invalid_input("transient charge in rematch"))
                })
                .collect::<StoreResult<_>>()?;
            rematch_locked(&mut state, &charge_ids, payment_id)?;
        }

        if !charges.is_empty() {
            append_audit_locked(&mut state, charges, Some(payment_id), Utc::now())?;
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExternalPaymentStatus, PayerIdentity};
    use chrono::Duration;

    fn charge(zone: Uuid, vrn: &str, day: u32) -> EntrantCharge {
        EntrantCharge {
            id: None,
            clean_air_zone_id: zone,
            vrn: vrn.to_string(),
            travel_date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            tariff_code: Some("C1".to_string()),
            charge: 4200,
            status: InternalChargeStatus::NotPaid,
            case_reference: None,
            vehicle_entrant_captured: false,
            update_actor: UpdateActor::User,
        }
    }

    fn card_payment(zone: Uuid) -> Payment {
        Payment {
            id: None,
            external_id: Some("ext-1".to_string()),
            clean_air_zone_id: zone,
            method: PaymentMethod::Card,
            external_status: ExternalPaymentStatus::Created,
            total_paid: 4200,
            payer: PayerIdentity::default(),
            mandate_id: None,
            case_reference: None,
            submitted_timestamp: Some(Utc::now()),
            authorised_timestamp: None,
            correlation_id: Uuid::new_v4(),
            next_url: None,
        }
    }

    #[tokio::test]
    async fn duplicate_charge_key_is_rejected() {
        let store = InMemoryStore::new();
        let zone = Uuid::new_v4();
        store.insert_charges(&[charge(zone, "AB12CDE", 14)]).await.unwrap();
        let err = store
            .insert_charges(&[charge(zone, "AB12CDE", 14)])
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn rematch_keeps_single_latest_and_appends() {
        let store = InMemoryStore::new();
        let zone = Uuid::new_v4();
        let inserted = store.insert_charges(&[charge(zone, "AB12CDE", 14)]).await.unwrap();
        let charge_id = inserted[0].id.unwrap();
        let first = store.insert_payment(&card_payment(zone)).await.unwrap();
        let second = store.insert_payment(&card_payment(zone)).await.unwrap();

        store.rematch(&[charge_id], first.id.unwrap()).await.unwrap();
        store.rematch(&[charge_id], second.id.unwrap()).await.unwrap();

        let latest = store.latest_match_for_charge(charge_id).await.unwrap().unwrap();
        assert_eq!(latest.payment_id, second.id.unwrap());

        let history = store.match_history_for_charge(charge_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().filter(|m| m.latest).count(), 1);
        assert_eq!(history[0].payment_id, first.id.unwrap());
        assert!(!history[0].latest);
    }

    #[tokio::test]
    async fn dangling_query_skips_terminal_and_recent_payments() {
        let store = InMemoryStore::new();
        let zone = Uuid::new_v4();

        let mut stale = card_payment(zone);
        stale.submitted_timestamp = Some(Utc::now() - Duration::hours(3));
        stale.external_status = ExternalPaymentStatus::Started;
        let stale = store.insert_payment(&stale).await.unwrap();

        let mut done = card_payment(zone);
        done.external_id = Some("ext-2".to_string());
        done.submitted_timestamp = Some(Utc::now() - Duration::hours(3));
        done.external_status = ExternalPaymentStatus::Success;
        store.insert_payment(&done).await.unwrap();

        let mut fresh = card_payment(zone);
        fresh.external_id = Some("ext-3".to_string());
        fresh.external_status = ExternalPaymentStatus::Started;
        store.insert_payment(&fresh).await.unwrap();

        let cutoff = Utc::now() - Duration::minutes(90);
        let dangling = store.find_dangling_payments(cutoff).await.unwrap();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].id, stale.id);
    }

    #[tokio::test]
    async fn mandate_consistency_is_enforced() {
        let store = InMemoryStore::new();
        let zone = Uuid::new_v4();

        let mut bad_card = card_payment(zone);
        bad_card.mandate_id = Some("mandate-1".to_string());
        assert!(store.insert_payment(&bad_card).await.is_err());

        let mut bad_dd = card_payment(zone);
        bad_dd.method = PaymentMethod::DirectDebit;
        bad_dd.mandate_id = None;
        assert!(store.insert_payment(&bad_dd).await.is_err());
    }

    #[tokio::test]
    async fn payments_are_found_by_external_id() {
        let store = InMemoryStore::new();
        let zone = Uuid::new_v4();
        let inserted = store.insert_payment(&card_payment(zone)).await.unwrap();

        let found = store.find_payment_by_external_id("ext-1").await.unwrap();
        assert_eq!(found.map(|p| p.id), Some(inserted.id));
        assert!(store
            .find_payment_by_external_id("ext-unknown")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn guarded_status_update_rejects_a_stale_expectation() {
        let store = InMemoryStore::new();
        let zone = Uuid::new_v4();
        let payment = store.insert_payment(&card_payment(zone)).await.unwrap();

        let mut updated = payment.clone();
        updated.external_status = ExternalPaymentStatus::Success;

        // The row holds Created; a guard expecting Started must not write.
        let applied = store
            .apply_status_update(&updated, &[], false, ExternalPaymentStatus::Started)
            .await
            .unwrap();
        assert!(!applied);
        let stored = store.find_payment(payment.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.external_status, ExternalPaymentStatus::Created);

        let applied = store
            .apply_status_update(&updated, &[], false, ExternalPaymentStatus::Created)
            .await
            .unwrap();
        assert!(applied);
        let stored = store.find_payment(payment.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.external_status, ExternalPaymentStatus::Success);
    }

    #[tokio::test]
    async fn historic_charge_lookup_includes_superseded_links() {
        let store = InMemoryStore::new();
        let zone = Uuid::new_v4();
        let inserted = store.insert_charges(&[charge(zone, "AB12CDE", 14)]).await.unwrap();
        let charge_id = inserted[0].id.unwrap();
        let first = store.insert_payment(&card_payment(zone)).await.unwrap();
        let second = store.insert_payment(&card_payment(zone)).await.unwrap();

        store.rematch(&[charge_id], first.id.unwrap()).await.unwrap();
        store.rematch(&[charge_id], second.id.unwrap()).await.unwrap();

        let historic = store
            .find_charges_by_payment(first.id.unwrap())
            .await
            .unwrap();
        assert_eq!(historic.len(), 1);
        let latest = store
            .find_latest_charges_by_payment(first.id.unwrap())
            .await
            .unwrap();
        assert!(latest.is_empty());
    }

    #[tokio::test]
    async fn create_payment_with_charges_is_atomic_per_key() {
        let store = InMemoryStore::new();
        let zone = Uuid::new_v4();
        let payment = card_payment(zone);

        let persisted = store
            .create_payment_with_charges(
                &payment,
                &[charge(zone, "AB12CDE", 14), charge(zone, "CU57ABC", 14)],
                &[],
            )
            .await
            .unwrap();

        let charges = store
            .find_charges_by_payment(persisted.id.unwrap())
            .await
            .unwrap();
        assert_eq!(charges.len(), 2);
        for c in &charges {
            let latest = store
                .latest_match_for_charge(c.id.unwrap())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(latest.payment_id, persisted.id.unwrap());
        }
    }
}
