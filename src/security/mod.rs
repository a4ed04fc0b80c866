//! Security module
//!
//! Confirmation gate for running generated code, with audit trail.

pub mod approval;

pub use approval::{Action, ActionType, ApprovalDecision, ApprovalManager, ApprovalRecord, RiskLevel};
