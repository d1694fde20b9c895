//! Vehicle entrant capture and out-of-band direct-debit finalization,
//! exercised directly against the in-memory store.

use caz_payments_core::events::{EventBus, PaymentEvent};
use caz_payments_core::model::{
    EntrantCharge, ExternalPaymentStatus, InternalChargeStatus, PayerIdentity, Payment,
    PaymentMethod, UpdateActor,
};
use caz_payments_core::service::{
    FinalizeDirectDebitService, PaymentInfoService, VehicleEntrantService, VehicleEntry,
};
use caz_payments_core::store::{
    EntrantChargeStore, InMemoryStore, MatchLedger, PaymentStore, Store,
};
use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

fn charge(zone: Uuid, vrn: &str, d: u32, status: InternalChargeStatus) -> EntrantCharge {
    EntrantCharge {
        id: None,
        clean_air_zone_id: zone,
        vrn: vrn.to_string(),
        travel_date: day(d),
        tariff_code: Some("C1".to_string()),
        charge: 4200,
        status,
        case_reference: None,
        vehicle_entrant_captured: false,
        update_actor: UpdateActor::User,
    }
}

fn dd_payment(zone: Uuid, status: ExternalPaymentStatus) -> Payment {
    Payment {
        id: None,
        external_id: None,
        clean_air_zone_id: zone,
        method: PaymentMethod::DirectDebit,
        external_status: status,
        total_paid: 4200,
        payer: PayerIdentity::default(),
        mandate_id: Some("mandate-1".to_string()),
        case_reference: None,
        submitted_timestamp: None,
        authorised_timestamp: None,
        correlation_id: Uuid::new_v4(),
        next_url: None,
    }
}

fn entry(zone: Uuid, vrn: &str, d: u32) -> VehicleEntry {
    VehicleEntry {
        clean_air_zone_id: zone,
        vrn: vrn.to_string(),
        travel_date: day(d),
    }
}

#[tokio::test]
async fn unseen_entry_creates_a_captured_not_paid_charge() {
    let store = Arc::new(InMemoryStore::new());
    let service = VehicleEntrantService::new(store.clone() as Arc<dyn Store>);
    let zone = Uuid::new_v4();

    let records = service
        .record_entrants(&[entry(zone, "ab12 cde", 14)])
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.charge.vrn, "AB12CDE");
    assert_eq!(record.charge.status, InternalChargeStatus::NotPaid);
    assert!(record.charge.vehicle_entrant_captured);
    assert_eq!(record.charge.update_actor, UpdateActor::VccsApi);
    assert!(record.payment.is_none());
}

#[tokio::test]
async fn paid_advance_charge_is_marked_captured_and_reports_its_payment() {
    let store = Arc::new(InMemoryStore::new());
    let service = VehicleEntrantService::new(store.clone() as Arc<dyn Store>);
    let zone = Uuid::new_v4();

    let inserted = store
        .insert_charges(&[charge(zone, "AB12CDE", 14, InternalChargeStatus::Paid)])
        .await
        .unwrap();
    let charge_id = inserted[0].id.unwrap();
    let mut paying = dd_payment(zone, ExternalPaymentStatus::Success);
    paying.external_id = Some("dd-7".to_string());
    let paying = store.insert_payment(&paying).await.unwrap();
    store.rematch(&[charge_id], paying.id.unwrap()).await.unwrap();

    let records = service
        .record_entrants(&[entry(zone, "AB12CDE", 14)])
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert!(record.charge.vehicle_entrant_captured);
    assert_eq!(record.charge.status, InternalChargeStatus::Paid);
    let payment = record.payment.as_ref().expect("paid charge reports payment");
    assert_eq!(payment.id, paying.id);
    assert_eq!(payment.external_id.as_deref(), Some("dd-7"));
}

#[tokio::test]
async fn replayed_sightings_are_collapsed() {
    let store = Arc::new(InMemoryStore::new());
    let service = VehicleEntrantService::new(store.clone() as Arc<dyn Store>);
    let zone = Uuid::new_v4();

    let records = service
        .record_entrants(&[
            entry(zone, "AB12CDE", 14),
            entry(zone, "ab12cde", 14),
            entry(zone, "AB12 CDE", 14),
        ])
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn finalize_direct_debit_pays_charges_and_carries_payer_email() {
    let store = Arc::new(InMemoryStore::new());
    let events = EventBus::new();
    let mut receiver = events.subscribe();
    let service = FinalizeDirectDebitService::new(store.clone() as Arc<dyn Store>, events);
    let zone = Uuid::new_v4();

    let inserted = store
        .insert_charges(&[charge(zone, "AB12CDE", 14, InternalChargeStatus::NotPaid)])
        .await
        .unwrap();
    let charge_id = inserted[0].id.unwrap();
    let payment = store
        .insert_payment(&dd_payment(zone, ExternalPaymentStatus::Initiated))
        .await
        .unwrap();
    let payment_id = payment.id.unwrap();
    store.rematch(&[charge_id], payment_id).await.unwrap();

    service
        .finalize_successful(payment_id, "dd-42", Some("payer@example.com".to_string()))
        .await
        .unwrap();

    let stored = store.find_payment(payment_id).await.unwrap().unwrap();
    assert_eq!(stored.external_status, ExternalPaymentStatus::Success);
    assert_eq!(stored.external_id.as_deref(), Some("dd-42"));
    assert!(stored.submitted_timestamp.is_some());
    assert!(stored.authorised_timestamp.is_some());

    let charges = store.find_charges_by_payment(payment_id).await.unwrap();
    assert_eq!(charges[0].status, InternalChargeStatus::Paid);

    let event = receiver.recv().await.unwrap();
    match event {
        PaymentEvent::StatusUpdated {
            status,
            payer_email,
            external_id,
            ..
        } => {
            assert_eq!(status, ExternalPaymentStatus::Success);
            assert_eq!(payer_email.as_deref(), Some("payer@example.com"));
            assert_eq!(external_id.as_deref(), Some("dd-42"));
        }
    }
}

#[tokio::test]
async fn charge_settlement_read_model_joins_payment_and_charges() {
    let store = Arc::new(InMemoryStore::new());
    let info = PaymentInfoService::new(store.clone() as Arc<dyn Store>);
    let zone = Uuid::new_v4();

    let inserted = store
        .insert_charges(&[
            charge(zone, "AB12CDE", 14, InternalChargeStatus::Paid),
            charge(zone, "AB12CDE", 15, InternalChargeStatus::Paid),
        ])
        .await
        .unwrap();
    let ids: Vec<Uuid> = inserted.iter().map(|c| c.id.unwrap()).collect();
    let mut payment = dd_payment(zone, ExternalPaymentStatus::Success);
    payment.external_id = Some("dd-9".to_string());
    payment.total_paid = 8400;
    let payment = store.insert_payment(&payment).await.unwrap();
    store.rematch(&ids, payment.id.unwrap()).await.unwrap();

    let infos = info
        .find_charges_for_payments(&[payment.id.unwrap(), Uuid::new_v4()])
        .await
        .unwrap();

    assert_eq!(infos.len(), 2);
    for row in &infos {
        assert_eq!(row.external_id.as_deref(), Some("dd-9"));
        assert_eq!(row.status, InternalChargeStatus::Paid);
        assert_eq!(row.charge, 4200);
    }
}
