use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Status of a payment transaction as reported by the external provider.
///
/// The non-terminal values trace the provider's own lifecycle
/// (`Initiated -> Created -> Started -> Submitted`); the terminal values are
/// `Success`, `Failed`, `Cancelled` and `Error`. `Unknown` is the fail-open
/// bucket for any provider string we do not recognize.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExternalPaymentStatus {
    Initiated,
    Created,
    Started,
    Submitted,
    Success,
    Failed,
    Cancelled,
    Error,
    Unknown,
}

impl ExternalPaymentStatus {
    /// Normalizes a raw provider status string. Unrecognized values map to
    /// `Unknown`: the reconciler must never crash on a provider string and
    /// must never treat one as `Success` by accident.
    pub fn from_provider(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "INITIATED" => ExternalPaymentStatus::Initiated,
            "CREATED" => ExternalPaymentStatus::Created,
            "STARTED" => ExternalPaymentStatus::Started,
            "SUBMITTED" | "PENDING_SUBMISSION" => ExternalPaymentStatus::Submitted,
            "SUCCESS" | "CONFIRMED" | "PAID_OUT" => ExternalPaymentStatus::Success,
            "FAILED" => ExternalPaymentStatus::Failed,
            "CANCELLED" => ExternalPaymentStatus::Cancelled,
            "ERROR" => ExternalPaymentStatus::Error,
            other => {
                warn!(provider_status = %other, "unrecognized provider status, mapping to UNKNOWN");
                ExternalPaymentStatus::Unknown
            }
        }
    }

    /// Parses a status previously stored by us. Unlike [`from_provider`],
    /// an unrecognized value here indicates corrupted data, not a flaky
    /// provider, so it is reported to the caller.
    ///
    /// [`from_provider`]: ExternalPaymentStatus::from_provider
    pub fn from_stored(value: &str) -> Result<Self, String> {
        match value {
            "INITIATED" => Ok(ExternalPaymentStatus::Initiated),
            "CREATED" => Ok(ExternalPaymentStatus::Created),
            "STARTED" => Ok(ExternalPaymentStatus::Started),
            "SUBMITTED" => Ok(ExternalPaymentStatus::Submitted),
            "SUCCESS" => Ok(ExternalPaymentStatus::Success),
            "FAILED" => Ok(ExternalPaymentStatus::Failed),
            "CANCELLED" => Ok(ExternalPaymentStatus::Cancelled),
            "ERROR" => Ok(ExternalPaymentStatus::Error),
            "UNKNOWN" => Ok(ExternalPaymentStatus::Unknown),
            other => Err(format!("not a stored payment status: {}", other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExternalPaymentStatus::Initiated => "INITIATED",
            ExternalPaymentStatus::Created => "CREATED",
            ExternalPaymentStatus::Started => "STARTED",
            ExternalPaymentStatus::Submitted => "SUBMITTED",
            ExternalPaymentStatus::Success => "SUCCESS",
            ExternalPaymentStatus::Failed => "FAILED",
            ExternalPaymentStatus::Cancelled => "CANCELLED",
            ExternalPaymentStatus::Error => "ERROR",
            ExternalPaymentStatus::Unknown => "UNKNOWN",
        }
    }

    /// Terminal statuses need no further reconciliation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExternalPaymentStatus::Success
                | ExternalPaymentStatus::Failed
                | ExternalPaymentStatus::Cancelled
                | ExternalPaymentStatus::Error
        )
    }

    /// A payment stuck in a non-terminal status past its resolution window
    /// is a dangling payment.
    pub fn is_not_finished(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for ExternalPaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of an entrant charge as accounted internally.
///
/// `Refunded`, `Chargeback` and `Failed` are never derived from a provider
/// status; they are set only by an explicit local-authority correction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InternalChargeStatus {
    NotPaid,
    Paid,
    Refunded,
    Chargeback,
    Failed,
}

impl InternalChargeStatus {
    /// Derives the internal status from a provider status. A charge is only
    /// paid once the provider confirms success; everything else, including
    /// the in-flight statuses, counts as not paid so that entry credit is
    /// never granted before funds clear.
    pub fn from_external(status: ExternalPaymentStatus) -> Self {
        match status {
            ExternalPaymentStatus::Success => InternalChargeStatus::Paid,
            _ => InternalChargeStatus::NotPaid,
        }
    }

    /// The statuses reachable only through local-authority correction.
    pub fn modified_statuses() -> [InternalChargeStatus; 3] {
        [
            InternalChargeStatus::Refunded,
            InternalChargeStatus::Chargeback,
            InternalChargeStatus::Failed,
        ]
    }

    pub fn is_modification(&self) -> bool {
        Self::modified_statuses().contains(self)
    }

    pub fn from_stored(value: &str) -> Result<Self, String> {
        match value {
            "NOT_PAID" => Ok(InternalChargeStatus::NotPaid),
            "PAID" => Ok(InternalChargeStatus::Paid),
            "REFUNDED" => Ok(InternalChargeStatus::Refunded),
            "CHARGEBACK" => Ok(InternalChargeStatus::Chargeback),
            "FAILED" => Ok(InternalChargeStatus::Failed),
            other => Err(format!("not a stored charge status: {}", other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InternalChargeStatus::NotPaid => "NOT_PAID",
            InternalChargeStatus::Paid => "PAID",
            InternalChargeStatus::Refunded => "REFUNDED",
            InternalChargeStatus::Chargeback => "CHARGEBACK",
            InternalChargeStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for InternalChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The actor responsible for the last update of an entrant charge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateActor {
    /// A paying user, via the payment journey.
    User,
    /// The status reconciler acting on provider data.
    ProviderSync,
    /// A local-authority case worker (refunds, chargebacks, corrections).
    LocalAuthority,
    /// The vehicle-entrant capture feed.
    VccsApi,
}

impl UpdateActor {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateActor::User => "USER",
            UpdateActor::ProviderSync => "PROVIDER_SYNC",
            UpdateActor::LocalAuthority => "LOCAL_AUTHORITY",
            UpdateActor::VccsApi => "VCCS_API",
        }
    }

    pub fn from_stored(value: &str) -> Result<Self, String> {
        match value {
            "USER" => Ok(UpdateActor::User),
            "PROVIDER_SYNC" => Ok(UpdateActor::ProviderSync),
            "LOCAL_AUTHORITY" => Ok(UpdateActor::LocalAuthority),
            "VCCS_API" => Ok(UpdateActor::VccsApi),
            other => Err(format!("not a stored update actor: {}", other)),
        }
    }
}

impl fmt::Display for UpdateActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the payment is taken at the provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    DirectDebit,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "CARD",
            PaymentMethod::DirectDebit => "DIRECT_DEBIT",
        }
    }

    pub fn from_stored(value: &str) -> Result<Self, String> {
        match value {
            "CARD" => Ok(PaymentMethod::Card),
            "DIRECT_DEBIT" => Ok(PaymentMethod::DirectDebit),
            other => Err(format!("not a stored payment method: {}", other)),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
