//! Approval workflow data model (C7).

use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::id::ResourceId;
use crate::module::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl ApprovalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }
}

/// A persistent approval request gating one DeploymentExecution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: ResourceId,
    pub deployment_execution_id: ResourceId,
    pub module_name: String,
    pub version: Version,
    pub environment: Environment,
    pub requester_email: String,
    /// Empty means any authorized caller may decide.
    pub approver_emails: Vec<String>,
    pub status: ApprovalStatus,
    pub requested_at: chrono::DateTime<chrono::Utc>,
    pub timeout_at: chrono::DateTime<chrono::Utc>,
    pub responded_at: Option<chrono::DateTime<chrono::Utc>>,
    pub responded_by_email: Option<String>,
    pub response_reason: Option<String>,
}

impl ApprovalRequest {
    pub fn is_eligible_approver(&self, email: &str) -> bool {
        self.approver_emails.is_empty() || self.approver_emails.iter().any(|e| e == email)
    }
}

pub const EXPIRY_REASON: &str = "approval window elapsed before a decision was recorded";
