//! Action approval system
//!
//! Generated code never runs without an explicit "yes" from the user. Every
//! request and decision is kept in an in-memory audit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::assistant::Frontend;

/// Risk levels for operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
        }
    }
}

/// Types of actions that pass through approval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    /// First run of freshly generated code
    CodeExecution,
    /// Replay of a skill the user already approved once
    SkillReplay,
}

impl ActionType {
    pub fn default_risk(&self) -> RiskLevel {
        match self {
            ActionType::CodeExecution => RiskLevel::High,
            ActionType::SkillReplay => RiskLevel::Medium,
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::CodeExecution => write!(f, "Code Execution"),
            ActionType::SkillReplay => write!(f, "Skill Replay"),
        }
    }
}

/// An action that may require approval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub action_type: ActionType,
    /// Task phrase the action serves
    pub target: String,
    pub risk_level: RiskLevel,
    pub requested_at: DateTime<Utc>,
}

impl Action {
    pub fn new(action_type: ActionType, target: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action_type,
            target: target.to_string(),
            risk_level: action_type.default_risk(),
            requested_at: Utc::now(),
        }
    }
}

/// Approval decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalDecision {
    Approved,
    Denied,
    /// Allowed without asking
    AutoApproved,
}

impl ApprovalDecision {
    pub fn allowed(self) -> bool {
        !matches!(self, ApprovalDecision::Denied)
    }
}

/// Record of an approval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub action: Action,
    pub decision: ApprovalDecision,
    pub decided_at: DateTime<Utc>,
}

/// Approval gate with audit log
#[derive(Debug, Clone, Default)]
pub struct ApprovalManager {
    audit_log: Arc<Mutex<Vec<ApprovalRecord>>>,
}

impl ApprovalManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// High-risk actions always ask
    pub fn needs_approval(&self, action: &Action) -> bool {
        action.risk_level >= RiskLevel::High
    }

    /// Ask the frontend when required, then record the outcome
    pub async fn request(&self, action: Action, prompt: &str, frontend: &dyn Frontend) -> ApprovalDecision {
        tracing::info!(
            action_id = %action.id,
            action_type = %action.action_type,
            risk_level = %action.risk_level,
            target = %action.target,
            "Approval requested"
        );

        let decision = if !self.needs_approval(&action) {
            ApprovalDecision::AutoApproved
        } else if frontend.confirm(prompt).await {
            ApprovalDecision::Approved
        } else {
            ApprovalDecision::Denied
        };

        self.record_decision(action, decision);
        decision
    }

    fn record_decision(&self, action: Action, decision: ApprovalDecision) {
        tracing::info!(
            action_id = %action.id,
            decision = ?decision,
            "Approval decision recorded"
        );

        let record = ApprovalRecord {
            action,
            decision,
            decided_at: Utc::now(),
        };

        if let Ok(mut log) = self.audit_log.lock() {
            log.push(record);
        }
    }

    /// Get the audit log
    pub fn get_audit_log(&self) -> Vec<ApprovalRecord> {
        self.audit_log.lock().map(|l| l.clone()).unwrap_or_default()
    }
}
