//! HTTP clients for the external payment provider.
//!
//! Two clients share one configuration: [`CardGatewayClient`] drives the
//! provider's redirect-based card journey, [`DirectDebitGatewayClient`] its
//! mandate-based collection API. Both enforce a fixed request timeout so a
//! hung provider call surfaces as [`GatewayError::Timeout`] instead of
//! blocking a reconciliation cycle.

use crate::gateway::error::{GatewayError, GatewayResult};
use crate::gateway::types::{
    CollectDirectDebitRequest, CollectResponse, CreateTransactionRequest,
    CreateTransactionResponse, TransactionSnapshot,
};
use crate::gateway::ProviderGateway;
use crate::model::ExternalPaymentStatus;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEnvironment {
    Sandbox,
    Live,
}

impl GatewayEnvironment {
    fn default_base_url(self) -> &'static str {
        match self {
            GatewayEnvironment::Sandbox => "https://sandbox.payments.example.com",
            GatewayEnvironment::Live => "https://payments.example.com",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub environment: GatewayEnvironment,
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl GatewayConfig {
    pub fn from_env() -> GatewayResult<Self> {
        let api_key =
            std::env::var("PAYMENT_GATEWAY_API_KEY").map_err(|_| GatewayError::Configuration {
                message: "PAYMENT_GATEWAY_API_KEY environment variable is required".to_string(),
            })?;

        let environment = match std::env::var("PAYMENT_GATEWAY_ENV").as_deref() {
            Ok("live") => GatewayEnvironment::Live,
            _ => GatewayEnvironment::Sandbox,
        };

        Ok(Self {
            base_url: std::env::var("PAYMENT_GATEWAY_BASE_URL")
                .unwrap_or_else(|_| environment.default_base_url().to_string()),
            timeout_secs: std::env::var("PAYMENT_GATEWAY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            api_key,
            environment,
        })
    }

    pub fn sandbox(api_key: impl Into<String>) -> Self {
        let environment = GatewayEnvironment::Sandbox;
        Self {
            base_url: environment.default_base_url().to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            api_key: api_key.into(),
            environment,
        }
    }
}

fn build_client(config: &GatewayConfig) -> GatewayResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| GatewayError::Configuration {
            message: format!("failed to build http client: {}", e),
        })
}

async fn read_error_body(response: reqwest::Response) -> GatewayError {
    let status_code = response.status().as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "unreadable error body".to_string());
    GatewayError::UnexpectedResponse {
        status_code,
        message,
    }
}

/// Client for the provider's redirect-based card API.
pub struct CardGatewayClient {
    config: GatewayConfig,
    http: reqwest::Client,
}

impl CardGatewayClient {
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let http = build_client(&config)?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> GatewayResult<Self> {
        Self::new(GatewayConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }
}

#[async_trait]
impl ProviderGateway for CardGatewayClient {
    async fn create_transaction(
        &self,
        request: CreateTransactionRequest,
    ) -> GatewayResult<CreateTransactionResponse> {
        let payload = serde_json::json!({
            "amount": request.amount,
            "reference": request.reference,
            "return_url": request.return_url,
            "description": request.description,
        });

        let response = self
            .http
            .post(self.endpoint("/v1/payments"))
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.timeout_or(e))?;

        if !response.status().is_success() {
            return Err(read_error_body(response).await);
        }

        let body: WirePayment = response.json().await.map_err(GatewayError::from)?;
        let status = ExternalPaymentStatus::from_provider(&body.state.status);
        info!(external_id = %body.payment_id, status = %status, "card transaction created");

        Ok(CreateTransactionResponse {
            external_id: body.payment_id,
            next_action_url: body.links.and_then(|l| l.next_url).map(|u| u.href),
            status,
        })
    }

    async fn query_transaction(&self, external_id: &str) -> GatewayResult<TransactionSnapshot> {
        let response = self
            .http
            .get(self.endpoint(&format!("/v1/payments/{}", external_id)))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| self.timeout_or(e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound {
                external_id: external_id.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(read_error_body(response).await);
        }

        let body: WirePayment = response.json().await.map_err(GatewayError::from)?;
        Ok(TransactionSnapshot {
            status: ExternalPaymentStatus::from_provider(&body.state.status),
            amount_captured: body.amount_captured,
            payer_email: body.email,
        })
    }

    async fn collect_direct_debit(
        &self,
        _request: CollectDirectDebitRequest,
    ) -> GatewayResult<CollectResponse> {
        Err(GatewayError::Configuration {
            message: "card gateway does not support direct-debit collection".to_string(),
        })
    }
}

impl CardGatewayClient {
    fn timeout_or(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout {
                seconds: self.config.timeout_secs,
            }
        } else {
            GatewayError::from(err)
        }
    }
}

/// Client for the provider's mandate-based direct-debit API.
pub struct DirectDebitGatewayClient {
    config: GatewayConfig,
    http: reqwest::Client,
}

impl DirectDebitGatewayClient {
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let http = build_client(&config)?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn timeout_or(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout {
                seconds: self.config.timeout_secs,
            }
        } else {
            GatewayError::from(err)
        }
    }
}

#[async_trait]
impl ProviderGateway for DirectDebitGatewayClient {
    async fn create_transaction(
        &self,
        _request: CreateTransactionRequest,
    ) -> GatewayResult<CreateTransactionResponse> {
        Err(GatewayError::Configuration {
            message: "direct-debit gateway does not open card transactions".to_string(),
        })
    }

    async fn query_transaction(&self, external_id: &str) -> GatewayResult<TransactionSnapshot> {
        let response = self
            .http
            .get(self.endpoint(&format!("/v1/directdebit/payments/{}", external_id)))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| self.timeout_or(e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound {
                external_id: external_id.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(read_error_body(response).await);
        }

        let body: WireCollection = response.json().await.map_err(GatewayError::from)?;
        Ok(TransactionSnapshot {
            status: ExternalPaymentStatus::from_provider(&body.state.status),
            amount_captured: body.amount,
            payer_email: None,
        })
    }

    async fn collect_direct_debit(
        &self,
        request: CollectDirectDebitRequest,
    ) -> GatewayResult<CollectResponse> {
        let payload = serde_json::json!({
            "mandate_id": request.mandate_id,
            "amount": request.amount,
            "reference": request.reference,
        });

        let response = self
            .http
            .post(self.endpoint("/v1/directdebit/payments"))
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.timeout_or(e))?;

        if response.status() == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "collection rejected".to_string());
            return Err(GatewayError::Declined { message });
        }
        if !response.status().is_success() {
            return Err(read_error_body(response).await);
        }

        let body: WireCollection = response.json().await.map_err(GatewayError::from)?;
        let status = ExternalPaymentStatus::from_provider(&body.state.status);
        info!(external_id = %body.payment_id, status = %status, "direct-debit collection submitted");

        Ok(CollectResponse {
            external_id: body.payment_id,
            status,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireState {
    status: String,
}

#[derive(Debug, Deserialize)]
struct WireLink {
    href: String,
}

#[derive(Debug, Deserialize)]
struct WireLinks {
    #[serde(default)]
    next_url: Option<WireLink>,
}

#[derive(Debug, Deserialize)]
struct WirePayment {
    payment_id: String,
    state: WireState,
    #[serde(default)]
    amount_captured: Option<i64>,
    #[serde(default)]
    email: Option<String>,
    #[serde(rename = "_links", default)]
    links: Option<WireLinks>,
}

#[derive(Debug, Deserialize)]
struct WireCollection {
    payment_id: String,
    state: WireState,
    #[serde(default)]
    amount: Option<i64>,
}
