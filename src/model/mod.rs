//! Domain entities of the payment reconciliation core.
//!
//! `EntrantCharge` is the unit of liability (one vehicle, one zone, one
//! travel date), `Payment` the unit of money movement, and
//! `MatchLedgerEntry` the append-only link between the two. A charge's
//! history is never rewritten: re-matching flips the previous link's
//! `latest` flag and appends a new one.

pub mod status;

pub use status::{ExternalPaymentStatus, InternalChargeStatus, PaymentMethod, UpdateActor};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The unique business key of an entrant charge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChargeKey {
    pub clean_air_zone_id: Uuid,
    pub vrn: String,
    pub travel_date: NaiveDate,
}

impl ChargeKey {
    pub fn new(clean_air_zone_id: Uuid, vrn: impl Into<String>, travel_date: NaiveDate) -> Self {
        Self {
            clean_air_zone_id,
            vrn: normalize_vrn(vrn.into()),
            travel_date,
        }
    }
}

/// Uppercases and strips whitespace so that `ab12 cde` and `AB12CDE` key the
/// same charge row.
pub fn normalize_vrn(vrn: String) -> String {
    vrn.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Liability for one vehicle entering one zone on one date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntrantCharge {
    /// Store-assigned identifier; `None` until inserted.
    pub id: Option<Uuid>,
    pub clean_air_zone_id: Uuid,
    pub vrn: String,
    pub travel_date: NaiveDate,
    /// Tariff used to calculate the charge. Absent for charges created by
    /// the entrant-capture feed before any payment was attempted.
    pub tariff_code: Option<String>,
    /// Charge amount in integer minor units (pence).
    pub charge: i64,
    pub status: InternalChargeStatus,
    /// Local-authority case reference, set when a charge is corrected.
    pub case_reference: Option<String>,
    /// Set once a vehicle entry has actually been observed for this key
    /// (as opposed to a charge created by an advance payment).
    pub vehicle_entrant_captured: bool,
    pub update_actor: UpdateActor,
}

impl EntrantCharge {
    pub fn key(&self) -> ChargeKey {
        ChargeKey {
            clean_air_zone_id: self.clean_air_zone_id,
            vrn: self.vrn.clone(),
            travel_date: self.travel_date,
        }
    }

    /// Identifier of a persisted charge. Panics on a transient instance,
    /// which would be a programming error in the calling service.
    pub fn id_or_panic(&self) -> Uuid {
        self.id.expect("entrant charge has not been persisted")
    }
}

/// Who initiated a payment. At most one of the identities is meaningful:
/// a paying user, a fleet operator, or a telephone/offline operator acting
/// on the payer's behalf.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PayerIdentity {
    pub user_id: Option<Uuid>,
    pub operator_id: Option<Uuid>,
    pub telephone_payment: bool,
}

/// One transaction with the external payment provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payment {
    /// Store-assigned identifier; `None` until inserted.
    pub id: Option<Uuid>,
    /// Identifier assigned by the external provider; absent until the
    /// provider accepts the transaction.
    pub external_id: Option<String>,
    pub clean_air_zone_id: Uuid,
    pub method: PaymentMethod,
    pub external_status: ExternalPaymentStatus,
    /// Total amount charged, in integer minor units. Always equals the sum
    /// of the latest-matched entrant charges.
    pub total_paid: i64,
    pub payer: PayerIdentity,
    /// Direct-debit mandate reference. Required for `DirectDebit`,
    /// forbidden for `Card`.
    pub mandate_id: Option<String>,
    pub case_reference: Option<String>,
    /// When the payment was submitted to the provider for processing.
    pub submitted_timestamp: Option<DateTime<Utc>>,
    /// When the provider confirmed the payment as successful.
    pub authorised_timestamp: Option<DateTime<Utc>>,
    /// Correlates this payment across logs and the provider's records.
    pub correlation_id: Uuid,
    /// URL to continue the payment journey at the provider. Transient:
    /// returned to the caller, never persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_url: Option<String>,
}

impl Payment {
    pub fn id_or_panic(&self) -> Uuid {
        self.id.expect("payment has not been persisted")
    }
}

/// One append-only link between an entrant charge and a payment.
///
/// For a given charge at most one entry has `latest = true`; earlier
/// entries keep recording which payment settled (or tried to settle) the
/// charge at the time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchLedgerEntry {
    pub id: Option<Uuid>,
    pub payment_id: Uuid,
    pub entrant_charge_id: Uuid,
    pub latest: bool,
}

/// Flat audit projection of one historical charge mutation, as consumed by
/// the export pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentModification {
    pub payment_id: Uuid,
    pub vrn: String,
    pub travel_date: NaiveDate,
    pub amount: i64,
    pub case_reference: Option<String>,
    pub status: InternalChargeStatus,
    pub modified_at: DateTime<Utc>,
}

/// Read model returned to charge-settlement consumers: the latest-matched
/// charges of a payment with their current standing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChargeSettlementInfo {
    pub payment_id: Uuid,
    pub external_id: Option<String>,
    pub entrant_charge_id: Uuid,
    pub vrn: String,
    pub travel_date: NaiveDate,
    pub tariff_code: Option<String>,
    pub charge: i64,
    pub status: InternalChargeStatus,
    pub case_reference: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn charge(vrn: &str) -> EntrantCharge {
        EntrantCharge {
            id: Some(Uuid::new_v4()),
            clean_air_zone_id: Uuid::new_v4(),
            vrn: vrn.to_string(),
            travel_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            tariff_code: Some("C1".to_string()),
            charge: 4200,
            status: InternalChargeStatus::NotPaid,
            case_reference: None,
            vehicle_entrant_captured: false,
            update_actor: UpdateActor::User,
        }
    }

    #[test]
    fn vrn_normalization_strips_whitespace_and_uppercases() {
        assert_eq!(normalize_vrn("ab12 cde".to_string()), "AB12CDE");
        assert_eq!(normalize_vrn(" CU57 ABC ".to_string()), "CU57ABC");
    }

    #[test]
    fn charge_key_equality_uses_normalized_vrn() {
        let zone = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        assert_eq!(
            ChargeKey::new(zone, "ab12 cde", date),
            ChargeKey::new(zone, "AB12CDE", date)
        );
    }

    #[test]
    fn charge_key_round_trips_through_entity() {
        let c = charge("CU57ABC");
        let key = c.key();
        assert_eq!(key.vrn, "CU57ABC");
        assert_eq!(key.travel_date, c.travel_date);
    }
}
