//! Unified error handling for the payment reconciliation core.
//!
//! Four families, each with a different propagation policy: validation
//! faults are rejected before any external call and never retried;
//! provider faults are surfaced to payment creation but deferred to the
//! dangling sweep for reconciliation; integrity faults indicate a broken
//! matching invariant and are fatal; stale-transition faults are caller
//! programming errors.

use std::fmt;
use uuid::Uuid;

use crate::gateway::GatewayError;
use crate::store::StoreError;

/// Input faults detected before any external call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFault {
    /// The charges of one payment must all belong to the same zone.
    MixedZones,
    /// A charge amount must be a positive number of minor units.
    NonPositiveAmount { vrn: String, amount: i64 },
    /// The same (VRN, travel date) appears twice in one request.
    DuplicateEntrant { vrn: String },
    /// A payment must cover at least one charge.
    EmptyChargeSet,
    /// Direct-debit payments need a mandate; card payments must not have one.
    MandateMismatch { method: String },
    /// The charge for this day has already been paid.
    AlreadyPaid { vrn: String },
    /// A related payment for this charge is still in flight or completed.
    PaymentInFlight { vrn: String, status: String },
    /// A settlement correction targeting a charge that is not in a
    /// correctable state, or a status that is not a modification status.
    CorrectionNotApplicable { vrn: String, status: String },
}

/// Breaches of the matching invariants. Never auto-corrected: they mean a
/// bug in the ledger logic, not an external-world condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityFault {
    /// More than one payment reachable from a charge's latest match.
    MultiplePaymentsForCharge { entrant_charge_id: Uuid, count: usize },
    /// More than one `latest = true` ledger entry for a charge.
    MultipleLatestMatches { entrant_charge_id: Uuid, count: usize },
    /// A payment under reconciliation has no matched charges.
    NoMatchedCharges { payment_id: Uuid },
    /// A payment we hold an external id for is unknown to the provider.
    ExternalPaymentMissing { payment_id: Uuid, external_id: String },
    /// A row references an entity that does not exist.
    MissingEntity { entity: &'static str, id: String },
}

/// Unified application error.
#[derive(Debug)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub context: Option<String>,
}

#[derive(Debug)]
pub enum AppErrorKind {
    Validation(ValidationFault),
    Provider(GatewayError),
    Integrity(IntegrityFault),
    /// A status transition was requested with an unchanged status.
    StaleTransition {
        payment_id: Uuid,
        status: crate::model::ExternalPaymentStatus,
    },
    Infrastructure(StoreError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub fn validation(fault: ValidationFault) -> Self {
        Self::new(AppErrorKind::Validation(fault))
    }

    pub fn integrity(fault: IntegrityFault) -> Self {
        Self::new(AppErrorKind::Integrity(fault))
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Retryable errors may succeed on a later sweep; everything else is
    /// either a caller fault or a broken invariant.
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Validation(_) => false,
            AppErrorKind::Provider(err) => err.is_retryable(),
            AppErrorKind::Integrity(_) => false,
            AppErrorKind::StaleTransition { .. } => false,
            AppErrorKind::Infrastructure(err) => err.is_retryable(),
        }
    }

    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Validation(fault) => match fault {
                ValidationFault::MixedZones => {
                    "All charges in a payment must belong to the same zone".to_string()
                }
                ValidationFault::NonPositiveAmount { vrn, amount } => {
                    format!("Charge amount {} for '{}' must be positive", amount, vrn)
                }
                ValidationFault::DuplicateEntrant { vrn } => {
                    format!("Duplicate travel day for '{}' in one payment", vrn)
                }
                ValidationFault::EmptyChargeSet => {
                    "A payment must cover at least one charge".to_string()
                }
                ValidationFault::MandateMismatch { method } => {
                    format!("Mandate reference is inconsistent with method {}", method)
                }
                ValidationFault::AlreadyPaid { vrn } => {
                    format!("The entrant charge for '{}' has already been paid", vrn)
                }
                ValidationFault::PaymentInFlight { vrn, status } => format!(
                    "A payment for '{}' is already being processed (status {})",
                    vrn, status
                ),
                ValidationFault::CorrectionNotApplicable { vrn, status } => format!(
                    "The charge for '{}' cannot be corrected from status {}",
                    vrn, status
                ),
            },
            AppErrorKind::Provider(err) => {
                if err.is_retryable() {
                    "The payment provider is temporarily unavailable. Please try again".to_string()
                } else {
                    "The payment provider rejected the request".to_string()
                }
            }
            AppErrorKind::Integrity(_) => {
                "Payment records are inconsistent. Please contact support".to_string()
            }
            AppErrorKind::StaleTransition { .. } => {
                "The payment status has not changed".to_string()
            }
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AppErrorKind::Validation(fault) => write!(f, "validation fault: {:?}", fault)?,
            AppErrorKind::Provider(err) => write!(f, "provider call failed: {}", err)?,
            AppErrorKind::Integrity(fault) => write!(f, "integrity fault: {:?}", fault)?,
            AppErrorKind::StaleTransition { payment_id, status } => write!(
                f,
                "stale transition for payment {}: status already {}",
                payment_id, status
            )?,
            AppErrorKind::Infrastructure(err) => write!(f, "store error: {}", err)?,
        }
        if let Some(context) = &self.context {
            write!(f, " ({})", context)?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::new(AppErrorKind::Provider(err))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::new(AppErrorKind::Infrastructure(err))
    }
}

/// Result type for operations that can fail with [`AppError`].
pub type AppResult<T> = Result<T, AppError>;
