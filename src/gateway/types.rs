use crate::model::ExternalPaymentStatus;
use serde::{Deserialize, Serialize};

/// Request to open a card transaction at the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransactionRequest {
    /// Amount in integer minor units.
    pub amount: i64,
    /// Our reference for the transaction, echoed back by the provider.
    pub reference: String,
    /// Where the provider redirects the payer after the journey.
    pub return_url: String,
    /// Human-readable description shown on the provider's payment page.
    pub description: Option<String>,
}

/// The provider's answer to a create-transaction call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransactionResponse {
    pub external_id: String,
    /// URL the payer must visit to continue the journey, if the provider
    /// uses a redirect flow.
    pub next_action_url: Option<String>,
    pub status: ExternalPaymentStatus,
}

/// Point-in-time view of a transaction at the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSnapshot {
    pub status: ExternalPaymentStatus,
    /// Amount actually captured so far, in minor units, when reported.
    pub amount_captured: Option<i64>,
    /// Payer email as known to the provider, used for receipts.
    pub payer_email: Option<String>,
}

/// Request to collect a direct-debit payment against an existing mandate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectDirectDebitRequest {
    pub mandate_id: String,
    pub amount: i64,
    pub reference: String,
}

/// The provider's answer to a direct-debit collection call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectResponse {
    pub external_id: String,
    pub status: ExternalPaymentStatus,
}
