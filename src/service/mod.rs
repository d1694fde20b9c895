//! Service layer: payment initiation, status reconciliation, sweeps,
//! settlement corrections and the audit read models.

pub mod audit_retention;
pub mod dangling_sweeper;
pub mod finalize_direct_debit;
pub mod initiate_payment;
pub mod payment_info;
pub mod reconcile_status;
pub mod settlement;
pub mod status_transition;
pub mod vehicle_entrant;

pub use audit_retention::AuditRetentionService;
pub use dangling_sweeper::{DanglingPaymentSweeper, SweeperConfig, SweepSummary};
pub use finalize_direct_debit::FinalizeDirectDebitService;
pub use initiate_payment::{ChargeRequest, InitiatePaymentService, PaymentRequest};
pub use payment_info::PaymentInfoService;
pub use reconcile_status::{Outcome, ReconcileStatusService};
pub use settlement::{ChargeCorrection, ChargeStatusLookup, SettlementService};
pub use status_transition::StatusTransition;
pub use vehicle_entrant::{EntrantRecord, VehicleEntrantService, VehicleEntry};
