use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors raised by Provider Gateway calls.
///
/// The crucial distinction is between "the provider said no" and "we do not
/// know what happened": a timeout or network failure is an unknown outcome,
/// so the payment keeps its current status and is picked up by the dangling
/// sweep. It is never marked failed on a mere transport error.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("provider call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("unexpected provider response (http {status_code}): {message}")]
    UnexpectedResponse { status_code: u16, message: String },

    #[error("provider declined the transaction: {message}")]
    Declined { message: String },

    #[error("transaction '{external_id}' not found at the provider")]
    NotFound { external_id: String },

    #[error("gateway configuration error: {message}")]
    Configuration { message: String },
}

impl GatewayError {
    /// Retryable errors leave the payment in its current status for the
    /// next sweep; non-retryable ones are definitive provider answers.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Network { .. } => true,
            GatewayError::Timeout { .. } => true,
            GatewayError::UnexpectedResponse { status_code, .. } => *status_code >= 500,
            GatewayError::Declined { .. } => false,
            GatewayError::NotFound { .. } => false,
            GatewayError::Configuration { .. } => false,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout { seconds: 0 }
        } else if let Some(status) = err.status() {
            GatewayError::UnexpectedResponse {
                status_code: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            GatewayError::Network {
                message: err.to_string(),
            }
        }
    }
}
