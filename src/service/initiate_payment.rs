//! Payment initiation: validation, charge reuse, the gateway call and the
//! atomic write of payment, charges and ledger.
//!
//! Nothing is persisted until the gateway accepts the transaction, so a
//! provider failure leaves no partial state behind.

use crate::error::{AppError, AppResult, IntegrityFault, ValidationFault};
use crate::events::EventBus;
use crate::gateway::{
    CollectDirectDebitRequest, CreateTransactionRequest, ProviderGateway,
};
use crate::model::{
    normalize_vrn, ChargeKey, EntrantCharge, InternalChargeStatus, PayerIdentity, Payment,
    PaymentMethod, UpdateActor,
};
use crate::service::reconcile_status::ReconcileStatusService;
use crate::store::Store;
use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// One charge the payer wants to settle.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub vrn: String,
    pub travel_date: NaiveDate,
    pub tariff_code: String,
    /// Amount in integer minor units.
    pub charge: i64,
}

/// A request to open a payment covering one or more charges in one zone.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub clean_air_zone_id: Uuid,
    pub method: PaymentMethod,
    pub charges: Vec<ChargeRequest>,
    /// Where the provider redirects the payer after a card journey.
    pub return_url: String,
    pub payer: PayerIdentity,
    /// Required for `DirectDebit`, forbidden for `Card`.
    pub mandate_id: Option<String>,
}

pub struct InitiatePaymentService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn ProviderGateway>,
    reconciler: ReconcileStatusService,
}

impl InitiatePaymentService {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn ProviderGateway>, events: EventBus) -> Self {
        let reconciler =
            ReconcileStatusService::new(Arc::clone(&store), Arc::clone(&gateway), events);
        Self {
            store,
            gateway,
            reconciler,
        }
    }

    /// Validates the request, resolves each charge against existing rows,
    /// opens the transaction at the provider and persists everything in one
    /// atomic store operation. Returns the persisted payment carrying the
    /// provider's `next_url` when the journey continues there.
    pub async fn create_payment(&self, request: PaymentRequest) -> AppResult<Payment> {
        validate_request(&request)?;

        // One batch lookup per vehicle instead of one query per travel day.
        let mut dates_by_vrn: HashMap<String, Vec<NaiveDate>> = HashMap::new();
        for item in &request.charges {
            dates_by_vrn
                .entry(normalize_vrn(item.vrn.clone()))
                .or_default()
                .push(item.travel_date);
        }
        let mut existing_by_key: HashMap<ChargeKey, EntrantCharge> = HashMap::new();
        for (vrn, dates) in &dates_by_vrn {
            for existing in self
                .store
                .find_charges_by_keys(request.clean_air_zone_id, vrn, dates)
                .await?
            {
                existing_by_key.insert(existing.key(), existing);
            }
        }

        let mut new_charges = Vec::new();
        let mut reused_charges = Vec::new();
        for item in &request.charges {
            let key = ChargeKey::new(request.clean_air_zone_id, item.vrn.clone(), item.travel_date);
            match existing_by_key.remove(&key) {
                Some(existing) => {
                    self.check_related_payment(&existing).await?;
                    let mut reused = existing;
                    reused.tariff_code = Some(item.tariff_code.clone());
                    reused.charge = item.charge;
                    reused.status = InternalChargeStatus::NotPaid;
                    reused.update_actor = UpdateActor::User;
                    reused_charges.push(reused);
                }
                None => new_charges.push(EntrantCharge {
                    id: None,
                    clean_air_zone_id: request.clean_air_zone_id,
                    vrn: key.vrn.clone(),
                    travel_date: item.travel_date,
                    tariff_code: Some(item.tariff_code.clone()),
                    charge: item.charge,
                    status: InternalChargeStatus::NotPaid,
                    case_reference: None,
                    vehicle_entrant_captured: false,
                    update_actor: UpdateActor::User,
                }),
            }
        }

        let total: i64 = request.charges.iter().map(|c| c.charge).sum();
        let correlation_id = Uuid::new_v4();
        let reference = correlation_id.to_string();

        // The provider call happens before any row exists; a failure here
        // leaves the store untouched.
        let (external_id, external_status, next_url, submitted) = match request.method {
            PaymentMethod::Card => {
                let response = self
                    .gateway
                    .create_transaction(CreateTransactionRequest {
                        amount: total,
                        reference,
                        return_url: request.return_url.clone(),
                        description: None,
                    })
                    .await?;
                (
                    response.external_id,
                    response.status,
                    response.next_action_url,
                    Utc::now(),
                )
            }
            PaymentMethod::DirectDebit => {
                let mandate_id = request
                    .mandate_id
                    .clone()
                    .expect("validated: direct debit carries a mandate");
                let response = self
                    .gateway
                    .collect_direct_debit(CollectDirectDebitRequest {
                        mandate_id,
                        amount: total,
                        reference,
                    })
                    .await?;
                (response.external_id, response.status, None, Utc::now())
            }
        };

        let payment = Payment {
            id: None,
            external_id: Some(external_id),
            clean_air_zone_id: request.clean_air_zone_id,
            method: request.method,
            external_status,
            total_paid: total,
            payer: request.payer.clone(),
            mandate_id: request.mandate_id.clone(),
            case_reference: None,
            submitted_timestamp: Some(submitted),
            authorised_timestamp: None,
            correlation_id,
            next_url: None,
        };

        let mut persisted = self
            .store
            .create_payment_with_charges(&payment, &new_charges, &reused_charges)
            .await?;
        persisted.next_url = next_url;

        info!(
            payment_id = %persisted.id_or_panic(),
            clean_air_zone_id = %request.clean_air_zone_id,
            method = %request.method,
            total_paid = total,
            charges = request.charges.len(),
            "payment initiated"
        );
        Ok(persisted)
    }

    /// An existing charge may only be re-paid if it is not already paid and
    /// no related payment is still in flight. A stale in-flight payment is
    /// first re-reconciled, the same way the dangling sweep would.
    async fn check_related_payment(&self, charge: &EntrantCharge) -> AppResult<()> {
        if charge.status == InternalChargeStatus::Paid {
            return Err(AppError::validation(ValidationFault::AlreadyPaid {
                vrn: charge.vrn.clone(),
            }));
        }

        let charge_id = charge.id_or_panic();
        let related = self.store.find_payments_by_entrant_charge(charge_id).await?;
        if related.len() > 1 {
            return Err(AppError::integrity(
                IntegrityFault::MultiplePaymentsForCharge {
                    entrant_charge_id: charge_id,
                    count: related.len(),
                },
            ));
        }

        let Some(related) = related.into_iter().next() else {
            return Ok(());
        };
        if related.external_status.is_terminal() {
            return Ok(());
        }

        // Non-terminal related payment: ask the provider before refusing.
        let related_id = related.id_or_panic();
        self.reconciler.reconcile(related_id).await?;

        let refreshed = self.store.find_payment(related_id).await?.ok_or_else(|| {
            AppError::integrity(IntegrityFault::MissingEntity {
                entity: "Payment",
                id: related_id.to_string(),
            })
        })?;
        if refreshed.external_status.is_not_finished() {
            return Err(AppError::validation(ValidationFault::PaymentInFlight {
                vrn: charge.vrn.clone(),
                status: refreshed.external_status.to_string(),
            }));
        }
        Ok(())
    }
}

fn validate_request(request: &PaymentRequest) -> AppResult<()> {
    if request.charges.is_empty() {
        return Err(AppError::validation(ValidationFault::EmptyChargeSet));
    }

    match (request.method, request.mandate_id.is_some()) {
        (PaymentMethod::Card, true) | (PaymentMethod::DirectDebit, false) => {
            return Err(AppError::validation(ValidationFault::MandateMismatch {
                method: request.method.to_string(),
            }));
        }
        _ => {}
    }

    let mut seen = HashSet::new();
    for item in &request.charges {
        if item.charge <= 0 {
            return Err(AppError::validation(ValidationFault::NonPositiveAmount {
                vrn: item.vrn.clone(),
                amount: item.charge,
            }));
        }
        let normalized = normalize_vrn(item.vrn.clone());
        if !seen.insert((normalized, item.travel_date)) {
            return Err(AppError::validation(ValidationFault::DuplicateEntrant {
                vrn: item.vrn.clone(),
            }));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppErrorKind;

    fn request(charges: Vec<ChargeRequest>) -> PaymentRequest {
        PaymentRequest {
            clean_air_zone_id: Uuid::new_v4(),
            method: PaymentMethod::Card,
            charges,
            return_url: "https://example.com/return".to_string(),
            payer: PayerIdentity::default(),
            mandate_id: None,
        }
    }

    fn item(vrn: &str, day: u32, amount: i64) -> ChargeRequest {
        ChargeRequest {
            vrn: vrn.to_string(),
            travel_date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            tariff_code: "C1".to_string(),
            charge: amount,
        }
    }

    #[test]
    fn empty_charge_set_is_rejected() {
        let err = validate_request(&request(vec![])).unwrap_err();
        assert!(matches!(
            err.kind,
            AppErrorKind::Validation(ValidationFault::EmptyChargeSet)
        ));
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        let err = validate_request(&request(vec![item("AB12CDE", 14, 0)])).unwrap_err();
        assert!(matches!(
            err.kind,
            AppErrorKind::Validation(ValidationFault::NonPositiveAmount { .. })
        ));
    }

    #[test]
    fn duplicate_entrant_detection_normalizes_vrns() {
        let err = validate_request(&request(vec![
            item("ab12 cde", 14, 4200),
            item("AB12CDE", 14, 4200),
        ]))
        .unwrap_err();
        assert!(matches!(
            err.kind,
            AppErrorKind::Validation(ValidationFault::DuplicateEntrant { .. })
        ));
    }

    #[test]
    fn same_vrn_on_different_days_is_allowed() {
        assert!(validate_request(&request(vec![
            item("AB12CDE", 14, 4200),
            item("AB12CDE", 15, 4200),
        ]))
        .is_ok());
    }

    #[test]
    fn card_with_mandate_is_rejected() {
        let mut r = request(vec![item("AB12CDE", 14, 4200)]);
        r.mandate_id = Some("mandate-1".to_string());
        let err = validate_request(&r).unwrap_err();
        assert!(matches!(
            err.kind,
            AppErrorKind::Validation(ValidationFault::MandateMismatch { .. })
        ));
    }

    #[test]
    fn direct_debit_without_mandate_is_rejected() {
        let mut r = request(vec![item("AB12CDE", 14, 4200)]);
        r.method = PaymentMethod::DirectDebit;
        let err = validate_request(&r).unwrap_err();
        assert!(matches!(
            err.kind,
            AppErrorKind::Validation(ValidationFault::MandateMismatch { .. })
        ));
    }
}
