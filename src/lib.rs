//! Payment matching and status reconciliation core for clean-air-zone
//! charging.
//!
//! The crate links vehicle entrant charges to external payment transactions
//! through an append-only match ledger, reconciles payment status against
//! the provider, sweeps payments that fell out of the normal flow, and
//! carries the audit trail for local-authority corrections. It exposes no
//! HTTP surface of its own; controllers and schedulers embed the services.

pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;

pub use config::{AppConfig, ConfigError};
pub use error::{AppError, AppErrorKind, AppResult, IntegrityFault, ValidationFault};
pub use events::{EventBus, PaymentEvent};
