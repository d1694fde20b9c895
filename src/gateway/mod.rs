//! Provider Gateway: the boundary to the external payment processor.
//!
//! The reconciler only ever sees the [`ProviderGateway`] trait and the
//! normalized types in [`types`]; which processor sits behind it (the card
//! processor's redirect flow or the mandate-based direct-debit collector)
//! is decided by the embedding application when it constructs a client.

pub mod error;
pub mod rest;
pub mod types;

pub use error::{GatewayError, GatewayResult};
pub use rest::{CardGatewayClient, DirectDebitGatewayClient, GatewayConfig, GatewayEnvironment};
pub use types::{
    CollectDirectDebitRequest, CollectResponse, CreateTransactionRequest,
    CreateTransactionResponse, TransactionSnapshot,
};

use async_trait::async_trait;

/// Normalized create/query/collect operations of the configured payment
/// processor. Implementations must carry a fixed request timeout; a timeout
/// surfaces as [`GatewayError::Timeout`], never as a fabricated status.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Opens a card transaction and returns the provider's identifiers and
    /// redirect URL.
    async fn create_transaction(
        &self,
        request: CreateTransactionRequest,
    ) -> GatewayResult<CreateTransactionResponse>;

    /// Fetches the provider's current view of a transaction.
    async fn query_transaction(&self, external_id: &str) -> GatewayResult<TransactionSnapshot>;

    /// Collects a direct-debit payment against an existing mandate.
    async fn collect_direct_debit(
        &self,
        request: CollectDirectDebitRequest,
    ) -> GatewayResult<CollectResponse>;
}
