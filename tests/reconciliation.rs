//! End-to-end flows over the in-memory store and a scripted mock gateway:
//! payment initiation, status reconciliation, corrections and the dangling
//! sweep.

use async_trait::async_trait;
use caz_payments_core::error::{AppErrorKind, ValidationFault};
use caz_payments_core::events::{EventBus, PaymentEvent};
use caz_payments_core::gateway::{
    CollectDirectDebitRequest, CollectResponse, CreateTransactionRequest,
    CreateTransactionResponse, GatewayError, GatewayResult, ProviderGateway,
    TransactionSnapshot,
};
use caz_payments_core::model::{
    ExternalPaymentStatus, InternalChargeStatus, PayerIdentity, PaymentMethod,
};
use caz_payments_core::service::{
    ChargeCorrection, ChargeRequest, ChargeStatusLookup, DanglingPaymentSweeper,
    InitiatePaymentService, Outcome, PaymentInfoService, PaymentRequest,
    ReconcileStatusService, SettlementService, SweeperConfig,
};
use caz_payments_core::store::{
    EntrantChargeStore, InMemoryStore, MatchLedger, PaymentStore, Store,
};
use chrono::{Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;
use uuid::Uuid;

#[derive(Default)]
struct MockGateway {
    snapshots: Mutex<HashMap<String, TransactionSnapshot>>,
    next_id: AtomicUsize,
}

impl MockGateway {
    fn set_status(&self, external_id: &str, status: ExternalPaymentStatus) {
        self.set_snapshot(external_id, status, None);
    }

    fn set_snapshot(
        &self,
        external_id: &str,
        status: ExternalPaymentStatus,
        payer_email: Option<&str>,
    ) {
        self.snapshots.lock().unwrap().insert(
            external_id.to_string(),
            TransactionSnapshot {
                status,
                amount_captured: None,
                payer_email: payer_email.map(|e| e.to_string()),
            },
        );
    }
}

#[async_trait]
impl ProviderGateway for MockGateway {
    async fn create_transaction(
        &self,
        _request: CreateTransactionRequest,
    ) -> GatewayResult<CreateTransactionResponse> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let external_id = format!("card-{}", n);
        self.set_status(&external_id, ExternalPaymentStatus::Created);
        Ok(CreateTransactionResponse {
            external_id,
            next_action_url: Some("https://pay.example.com/next".to_string()),
            status: ExternalPaymentStatus::Created,
        })
    }

    async fn query_transaction(&self, external_id: &str) -> GatewayResult<TransactionSnapshot> {
        self.snapshots
            .lock()
            .unwrap()
            .get(external_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound {
                external_id: external_id.to_string(),
            })
    }

    async fn collect_direct_debit(
        &self,
        _request: CollectDirectDebitRequest,
    ) -> GatewayResult<CollectResponse> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let external_id = format!("dd-{}", n);
        self.set_status(&external_id, ExternalPaymentStatus::Submitted);
        Ok(CollectResponse {
            external_id,
            status: ExternalPaymentStatus::Submitted,
        })
    }
}

struct TestContext {
    store: Arc<InMemoryStore>,
    gateway: Arc<MockGateway>,
    events: EventBus,
    initiate: InitiatePaymentService,
    reconcile: ReconcileStatusService,
}

fn context() -> TestContext {
    let store = Arc::new(InMemoryStore::new());
    let gateway = Arc::new(MockGateway::default());
    let events = EventBus::new();
    let store_dyn: Arc<dyn Store> = store.clone();
    let gateway_dyn: Arc<dyn ProviderGateway> = gateway.clone();
    let initiate = InitiatePaymentService::new(
        store_dyn.clone(),
        gateway_dyn.clone(),
        events.clone(),
    );
    let reconcile = ReconcileStatusService::new(store_dyn, gateway_dyn, events.clone());
    TestContext {
        store,
        gateway,
        events,
        initiate,
        reconcile,
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

fn charge_request(vrn: &str, d: u32) -> ChargeRequest {
    ChargeRequest {
        vrn: vrn.to_string(),
        travel_date: day(d),
        tariff_code: "C1".to_string(),
        charge: 4200,
    }
}

fn card_request(zone: Uuid, charges: Vec<ChargeRequest>) -> PaymentRequest {
    PaymentRequest {
        clean_air_zone_id: zone,
        method: PaymentMethod::Card,
        charges,
        return_url: "https://example.com/return".to_string(),
        payer: PayerIdentity::default(),
        mandate_id: None,
    }
}

fn dd_request(zone: Uuid, charges: Vec<ChargeRequest>) -> PaymentRequest {
    PaymentRequest {
        mandate_id: Some("mandate-1".to_string()),
        method: PaymentMethod::DirectDebit,
        ..card_request(zone, charges)
    }
}

#[tokio::test]
async fn six_charges_produce_one_payment_with_six_latest_matches() {
    let ctx = context();
    let zone = Uuid::new_v4();
    let charges = vec![
        charge_request("AB12CDE", 14),
        charge_request("AB12CDE", 15),
        charge_request("CU57ABC", 14),
        charge_request("CU57ABC", 15),
        charge_request("XY99ZZZ", 14),
        charge_request("XY99ZZZ", 15),
    ];

    let payment = ctx
        .initiate
        .create_payment(card_request(zone, charges))
        .await
        .unwrap();

    assert_eq!(payment.total_paid, 25200);
    assert!(payment.next_url.is_some());
    assert_eq!(payment.external_status, ExternalPaymentStatus::Created);

    let matched = ctx
        .store
        .find_charges_by_payment(payment.id.unwrap())
        .await
        .unwrap();
    assert_eq!(matched.len(), 6);

    // Amount conservation: the payment total equals the sum of its
    // latest-matched charges.
    let sum: i64 = matched.iter().map(|c| c.charge).sum();
    assert_eq!(sum, payment.total_paid);

    for charge in &matched {
        let latest = ctx
            .store
            .latest_match_for_charge(charge.id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.payment_id, payment.id.unwrap());
    }
}

#[tokio::test]
async fn successful_reconcile_pays_charges_and_emits_event() {
    let ctx = context();
    let zone = Uuid::new_v4();
    let mut receiver = ctx.events.subscribe();

    let payment = ctx
        .initiate
        .create_payment(card_request(zone, vec![charge_request("AB12CDE", 14)]))
        .await
        .unwrap();
    let payment_id = payment.id.unwrap();
    let external_id = payment.external_id.clone().unwrap();

    ctx.gateway.set_snapshot(
        &external_id,
        ExternalPaymentStatus::Success,
        Some("payer@example.com"),
    );

    let outcome = ctx.reconcile.reconcile(payment_id).await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Updated {
            status: ExternalPaymentStatus::Success
        }
    );

    let stored = ctx.store.find_payment(payment_id).await.unwrap().unwrap();
    assert_eq!(stored.external_status, ExternalPaymentStatus::Success);
    assert!(stored.authorised_timestamp.is_some());

    let charges = ctx.store.find_charges_by_payment(payment_id).await.unwrap();
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0].status, InternalChargeStatus::Paid);

    let event = receiver.recv().await.unwrap();
    match event {
        PaymentEvent::StatusUpdated {
            payment_id: id,
            status,
            payer_email,
            ..
        } => {
            assert_eq!(id, payment_id);
            assert_eq!(status, ExternalPaymentStatus::Success);
            assert_eq!(payer_email.as_deref(), Some("payer@example.com"));
        }
    }
}

#[tokio::test]
async fn reconcile_is_idempotent_for_unchanged_provider_state() {
    let ctx = context();
    let zone = Uuid::new_v4();

    let payment = ctx
        .initiate
        .create_payment(card_request(zone, vec![charge_request("AB12CDE", 14)]))
        .await
        .unwrap();
    let payment_id = payment.id.unwrap();
    let external_id = payment.external_id.clone().unwrap();
    let charge_id = ctx.store.find_charges_by_payment(payment_id).await.unwrap()[0]
        .id
        .unwrap();

    ctx.gateway
        .set_status(&external_id, ExternalPaymentStatus::Success);
    ctx.reconcile.reconcile(payment_id).await.unwrap();
    let history_after_first = ctx.store.match_history_for_charge(charge_id).await.unwrap();

    // Provider state unchanged: second pass writes nothing.
    let outcome = ctx.reconcile.reconcile(payment_id).await.unwrap();
    assert_eq!(outcome, Outcome::Unchanged);
    let history_after_second = ctx.store.match_history_for_charge(charge_id).await.unwrap();
    assert_eq!(history_after_first.len(), history_after_second.len());
}

#[tokio::test]
async fn unknown_provider_status_never_pays_charges() {
    let ctx = context();
    let zone = Uuid::new_v4();

    let payment = ctx
        .initiate
        .create_payment(card_request(zone, vec![charge_request("AB12CDE", 14)]))
        .await
        .unwrap();
    let payment_id = payment.id.unwrap();
    let external_id = payment.external_id.clone().unwrap();

    // The normalizer maps unrecognized provider strings to Unknown.
    let status = ExternalPaymentStatus::from_provider("capture_approved_retry");
    assert_eq!(status, ExternalPaymentStatus::Unknown);
    ctx.gateway.set_status(&external_id, status);

    let outcome = ctx.reconcile.reconcile(payment_id).await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Updated {
            status: ExternalPaymentStatus::Unknown
        }
    );

    let charges = ctx.store.find_charges_by_payment(payment_id).await.unwrap();
    assert_eq!(charges[0].status, InternalChargeStatus::NotPaid);
    let stored = ctx.store.find_payment(payment_id).await.unwrap().unwrap();
    assert!(stored.authorised_timestamp.is_none());
}

#[tokio::test]
async fn direct_debit_success_flips_charges_and_keeps_old_ledger_rows() {
    let ctx = context();
    let zone = Uuid::new_v4();
    let charges = vec![charge_request("AB12CDE", 14), charge_request("AB12CDE", 15)];

    // First attempt by card fails at the provider.
    let failed = ctx
        .initiate
        .create_payment(card_request(zone, charges.clone()))
        .await
        .unwrap();
    let failed_id = failed.id.unwrap();
    ctx.gateway.set_status(
        failed.external_id.as_deref().unwrap(),
        ExternalPaymentStatus::Failed,
    );
    ctx.reconcile.reconcile(failed_id).await.unwrap();

    // Retry by direct debit succeeds.
    let retry = ctx
        .initiate
        .create_payment(dd_request(zone, charges))
        .await
        .unwrap();
    let retry_id = retry.id.unwrap();
    ctx.gateway.set_status(
        retry.external_id.as_deref().unwrap(),
        ExternalPaymentStatus::Success,
    );
    ctx.reconcile.reconcile(retry_id).await.unwrap();

    let matched = ctx.store.find_charges_by_payment(retry_id).await.unwrap();
    assert_eq!(matched.len(), 2);
    for charge in &matched {
        assert_eq!(charge.status, InternalChargeStatus::Paid);

        let history = ctx
            .store
            .match_history_for_charge(charge.id.unwrap())
            .await
            .unwrap();
        // Old rows are flipped, never deleted.
        assert!(history.len() >= 2);
        assert_eq!(history.iter().filter(|m| m.latest).count(), 1);
        assert!(history
            .iter()
            .any(|m| m.payment_id == failed_id && !m.latest));
        let latest = history.iter().find(|m| m.latest).unwrap();
        assert_eq!(latest.payment_id, retry_id);
    }
}

#[tokio::test]
async fn concurrent_reconciles_persist_the_transition_once() {
    let ctx = context();
    let zone = Uuid::new_v4();

    let payment = ctx
        .initiate
        .create_payment(card_request(zone, vec![charge_request("AB12CDE", 14)]))
        .await
        .unwrap();
    let payment_id = payment.id.unwrap();
    let charge_id = ctx.store.find_charges_by_payment(payment_id).await.unwrap()[0]
        .id
        .unwrap();

    // Holds both reconciles at the provider query until each has read the
    // same stale payment row, then answers Success to both.
    struct RacingGateway {
        barrier: Barrier,
    }

    #[async_trait]
    impl ProviderGateway for RacingGateway {
        async fn create_transaction(
            &self,
            _request: CreateTransactionRequest,
        ) -> GatewayResult<CreateTransactionResponse> {
            Err(GatewayError::Timeout { seconds: 30 })
        }

        async fn query_transaction(
            &self,
            _external_id: &str,
        ) -> GatewayResult<TransactionSnapshot> {
            self.barrier.wait().await;
            Ok(TransactionSnapshot {
                status: ExternalPaymentStatus::Success,
                amount_captured: None,
                payer_email: None,
            })
        }

        async fn collect_direct_debit(
            &self,
            _request: CollectDirectDebitRequest,
        ) -> GatewayResult<CollectResponse> {
            Err(GatewayError::Timeout { seconds: 30 })
        }
    }

    let store_dyn: Arc<dyn Store> = ctx.store.clone();
    let racing: Arc<dyn ProviderGateway> = Arc::new(RacingGateway {
        barrier: Barrier::new(2),
    });
    let reconcile = Arc::new(ReconcileStatusService::new(
        store_dyn,
        racing,
        ctx.events.clone(),
    ));

    let first = tokio::spawn({
        let reconcile = Arc::clone(&reconcile);
        async move { reconcile.reconcile(payment_id).await.unwrap() }
    });
    let second = tokio::spawn({
        let reconcile = Arc::clone(&reconcile);
        async move { reconcile.reconcile(payment_id).await.unwrap() }
    });
    let outcomes = [first.await.unwrap(), second.await.unwrap()];

    // Exactly one writer wins; the loser converges without writing.
    let updated = outcomes
        .iter()
        .filter(|o| {
            matches!(
                o,
                Outcome::Updated {
                    status: ExternalPaymentStatus::Success
                }
            )
        })
        .count();
    assert_eq!(updated, 1);
    assert_eq!(
        outcomes.iter().filter(|o| **o == Outcome::Unchanged).count(),
        1
    );

    // One row from initiation, one from the winning rematch. A duplicate
    // write would have left a third.
    let history = ctx.store.match_history_for_charge(charge_id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.iter().filter(|m| m.latest).count(), 1);

    let stored = ctx.store.find_payment(payment_id).await.unwrap().unwrap();
    assert_eq!(stored.external_status, ExternalPaymentStatus::Success);
    let charges = ctx.store.find_charges_by_payment(payment_id).await.unwrap();
    assert_eq!(charges[0].status, InternalChargeStatus::Paid);
}

#[tokio::test]
async fn reconciling_a_superseded_payment_updates_only_the_payment() {
    let ctx = context();
    let zone = Uuid::new_v4();

    // First attempt fails; a retry takes over the charge's latest match.
    let first = ctx
        .initiate
        .create_payment(card_request(zone, vec![charge_request("AB12CDE", 14)]))
        .await
        .unwrap();
    let first_id = first.id.unwrap();
    let first_external = first.external_id.clone().unwrap();
    ctx.gateway
        .set_status(&first_external, ExternalPaymentStatus::Failed);

    let retry = ctx
        .initiate
        .create_payment(card_request(zone, vec![charge_request("AB12CDE", 14)]))
        .await
        .unwrap();
    let retry_id = retry.id.unwrap();

    let charge_id = ctx.store.find_charges_by_payment(first_id).await.unwrap()[0]
        .id
        .unwrap();
    assert!(ctx
        .store
        .find_latest_charges_by_payment(first_id)
        .await
        .unwrap()
        .is_empty());

    // The provider's last word on the superseded payment changes once more.
    ctx.gateway
        .set_status(&first_external, ExternalPaymentStatus::Cancelled);
    let outcome = ctx.reconcile.reconcile(first_id).await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Updated {
            status: ExternalPaymentStatus::Cancelled
        }
    );

    let stored = ctx.store.find_payment(first_id).await.unwrap().unwrap();
    assert_eq!(stored.external_status, ExternalPaymentStatus::Cancelled);

    // The charge and its latest match stay with the retry payment.
    let latest = ctx
        .store
        .latest_match_for_charge(charge_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.payment_id, retry_id);
}

#[tokio::test]
async fn paid_charge_cannot_be_paid_again() {
    let ctx = context();
    let zone = Uuid::new_v4();

    let payment = ctx
        .initiate
        .create_payment(card_request(zone, vec![charge_request("AB12CDE", 14)]))
        .await
        .unwrap();
    ctx.gateway.set_status(
        payment.external_id.as_deref().unwrap(),
        ExternalPaymentStatus::Success,
    );
    ctx.reconcile.reconcile(payment.id.unwrap()).await.unwrap();

    let err = ctx
        .initiate
        .create_payment(card_request(zone, vec![charge_request("AB12CDE", 14)]))
        .await
        .unwrap_err();
    assert!(matches!(
        err.kind,
        AppErrorKind::Validation(ValidationFault::AlreadyPaid { .. })
    ));
}

#[tokio::test]
async fn in_flight_payment_blocks_but_stale_failed_one_does_not() {
    let ctx = context();
    let zone = Uuid::new_v4();

    let first = ctx
        .initiate
        .create_payment(card_request(zone, vec![charge_request("AB12CDE", 14)]))
        .await
        .unwrap();
    let external_id = first.external_id.clone().unwrap();

    // The provider still reports the journey in progress.
    let err = ctx
        .initiate
        .create_payment(card_request(zone, vec![charge_request("AB12CDE", 14)]))
        .await
        .unwrap_err();
    assert!(matches!(
        err.kind,
        AppErrorKind::Validation(ValidationFault::PaymentInFlight { .. })
    ));

    // Once the provider reports failure, initiation re-reconciles the stale
    // payment and proceeds.
    ctx.gateway
        .set_status(&external_id, ExternalPaymentStatus::Failed);
    let retry = ctx
        .initiate
        .create_payment(card_request(zone, vec![charge_request("AB12CDE", 14)]))
        .await
        .unwrap();
    assert_ne!(retry.id, first.id);
}

#[tokio::test]
async fn chargeback_correction_preserves_history() {
    let ctx = context();
    let zone = Uuid::new_v4();
    let store_dyn: Arc<dyn Store> = ctx.store.clone();
    let settlement = SettlementService::new(store_dyn.clone());
    let info = PaymentInfoService::new(store_dyn);

    let payment = ctx
        .initiate
        .create_payment(card_request(zone, vec![charge_request("AB12CDE", 14)]))
        .await
        .unwrap();
    let payment_id = payment.id.unwrap();
    ctx.gateway.set_status(
        payment.external_id.as_deref().unwrap(),
        ExternalPaymentStatus::Success,
    );
    ctx.reconcile.reconcile(payment_id).await.unwrap();

    settlement
        .apply_corrections(&[ChargeCorrection {
            clean_air_zone_id: zone,
            vrn: "AB12CDE".to_string(),
            travel_date: day(14),
            target_status: InternalChargeStatus::Chargeback,
            case_reference: "CASE-001".to_string(),
        }])
        .await
        .unwrap();

    // Current status reads Chargeback with the case reference attached.
    let lookup = settlement.charge_status(zone, "AB12CDE", day(14)).await.unwrap();
    match lookup {
        ChargeStatusLookup::Found {
            status,
            case_reference,
            external_id,
        } => {
            assert_eq!(status, InternalChargeStatus::Chargeback);
            assert_eq!(case_reference.as_deref(), Some("CASE-001"));
            assert_eq!(external_id, payment.external_id);
        }
        ChargeStatusLookup::NotFound => panic!("charge should exist"),
    }

    // The ledger still points at the settling payment.
    let charges = ctx.store.find_charges_by_payment(payment_id).await.unwrap();
    assert_eq!(charges.len(), 1);

    // The correction is visible in the modification history.
    let history = info.find_modification_history(&[payment_id]).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, InternalChargeStatus::Chargeback);
    assert_eq!(history[0].case_reference.as_deref(), Some("CASE-001"));
}

#[tokio::test]
async fn corrected_charge_cannot_be_corrected_again() {
    let ctx = context();
    let zone = Uuid::new_v4();
    let store_dyn: Arc<dyn Store> = ctx.store.clone();
    let settlement = SettlementService::new(store_dyn);

    let payment = ctx
        .initiate
        .create_payment(card_request(zone, vec![charge_request("AB12CDE", 14)]))
        .await
        .unwrap();
    ctx.gateway.set_status(
        payment.external_id.as_deref().unwrap(),
        ExternalPaymentStatus::Success,
    );
    ctx.reconcile.reconcile(payment.id.unwrap()).await.unwrap();

    let correction = |status: InternalChargeStatus, case: &str| ChargeCorrection {
        clean_air_zone_id: zone,
        vrn: "AB12CDE".to_string(),
        travel_date: day(14),
        target_status: status,
        case_reference: case.to_string(),
    };

    settlement
        .apply_corrections(&[correction(InternalChargeStatus::Chargeback, "CASE-001")])
        .await
        .unwrap();

    // Only a Paid charge is correctable; a second correction must be
    // refused, not layered on top of the first.
    let err = settlement
        .apply_corrections(&[correction(InternalChargeStatus::Refunded, "CASE-002")])
        .await
        .unwrap_err();
    assert!(matches!(
        err.kind,
        AppErrorKind::Validation(ValidationFault::CorrectionNotApplicable { .. })
    ));

    let lookup = settlement
        .charge_status(zone, "AB12CDE", day(14))
        .await
        .unwrap();
    match lookup {
        ChargeStatusLookup::Found {
            status,
            case_reference,
            ..
        } => {
            assert_eq!(status, InternalChargeStatus::Chargeback);
            assert_eq!(case_reference.as_deref(), Some("CASE-001"));
        }
        ChargeStatusLookup::NotFound => panic!("charge should exist"),
    }
}

#[tokio::test]
async fn dangling_sweep_resolves_stale_payment_and_is_then_a_noop() {
    let ctx = context();
    let zone = Uuid::new_v4();
    let store_dyn: Arc<dyn Store> = ctx.store.clone();
    let gateway_dyn: Arc<dyn ProviderGateway> = ctx.gateway.clone();
    let sweeper = DanglingPaymentSweeper::new(
        store_dyn,
        gateway_dyn,
        ctx.events.clone(),
        SweeperConfig::default(),
    );

    let payment = ctx
        .initiate
        .create_payment(card_request(zone, vec![charge_request("AB12CDE", 14)]))
        .await
        .unwrap();
    let payment_id = payment.id.unwrap();
    let external_id = payment.external_id.clone().unwrap();

    // Backdate the submission beyond the threshold; the provider meanwhile
    // reports the journey finished successfully.
    let mut stale = ctx.store.find_payment(payment_id).await.unwrap().unwrap();
    stale.external_status = ExternalPaymentStatus::Started;
    stale.submitted_timestamp = Some(Utc::now() - Duration::hours(25));
    ctx.store.update_payment(&stale).await.unwrap();
    ctx.gateway
        .set_status(&external_id, ExternalPaymentStatus::Success);

    let summary = sweeper.sweep_once().await.unwrap();
    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.resolved, 1);

    let charges = ctx.store.find_charges_by_payment(payment_id).await.unwrap();
    assert_eq!(charges[0].status, InternalChargeStatus::Paid);

    // Resolved payments are terminal; the next pass scans nothing.
    let second = sweeper.sweep_once().await.unwrap();
    assert_eq!(second.scanned, 0);
    assert_eq!(second.resolved, 0);
}

#[tokio::test]
async fn sweep_leaves_payment_dangling_when_gateway_cannot_answer() {
    let ctx = context();
    let zone = Uuid::new_v4();
    let store_dyn: Arc<dyn Store> = ctx.store.clone();

    struct UnreachableGateway;

    #[async_trait]
    impl ProviderGateway for UnreachableGateway {
        async fn create_transaction(
            &self,
            _request: CreateTransactionRequest,
        ) -> GatewayResult<CreateTransactionResponse> {
            Err(GatewayError::Timeout { seconds: 30 })
        }

        async fn query_transaction(
            &self,
            _external_id: &str,
        ) -> GatewayResult<TransactionSnapshot> {
            Err(GatewayError::Timeout { seconds: 30 })
        }

        async fn collect_direct_debit(
            &self,
            _request: CollectDirectDebitRequest,
        ) -> GatewayResult<CollectResponse> {
            Err(GatewayError::Timeout { seconds: 30 })
        }
    }

    let payment = ctx
        .initiate
        .create_payment(card_request(zone, vec![charge_request("AB12CDE", 14)]))
        .await
        .unwrap();
    let payment_id = payment.id.unwrap();
    let mut stale = ctx.store.find_payment(payment_id).await.unwrap().unwrap();
    stale.external_status = ExternalPaymentStatus::Started;
    stale.submitted_timestamp = Some(Utc::now() - Duration::hours(3));
    ctx.store.update_payment(&stale).await.unwrap();

    let sweeper = DanglingPaymentSweeper::new(
        store_dyn,
        Arc::new(UnreachableGateway),
        ctx.events.clone(),
        SweeperConfig::default(),
    );

    // Timeout is an unknown outcome: the payment is never force-failed.
    let summary = sweeper.sweep_once().await.unwrap();
    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.resolved, 0);
    assert_eq!(summary.failures, 1);

    let untouched = ctx.store.find_payment(payment_id).await.unwrap().unwrap();
    assert_eq!(untouched.external_status, ExternalPaymentStatus::Started);
}
