//! Per-endpoint deployment errors.

use std::fmt;

use thiserror::Error;

use fnsync_cloud::{ApiError, is_quota_or_conflict};

/// The operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Create,
    Update,
    Delete,
    SetInvoker,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
            OperationType::SetInvoker => "set invoker on",
        })
    }
}

/// One endpoint's failure within a release. Never propagated past the
/// executor; the reporter aggregates them after all attempts complete.
#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("failed to {op} function {endpoint}")]
    Failed {
        endpoint: String,
        op: OperationType,
        #[source]
        cause: ApiError,
    },

    /// The delete was deliberately skipped: a same-named replacement
    /// failed to create or update in this release.
    #[error("delete of function {endpoint} aborted: its replacement failed to deploy")]
    Aborted { endpoint: String },
}

impl DeploymentError {
    pub fn endpoint(&self) -> &str {
        match self {
            DeploymentError::Failed { endpoint, .. } => endpoint,
            DeploymentError::Aborted { endpoint } => endpoint,
        }
    }

    pub fn op(&self) -> OperationType {
        match self {
            DeploymentError::Failed { op, .. } => *op,
            DeploymentError::Aborted { .. } => OperationType::Delete,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, DeploymentError::Aborted { .. })
    }

    /// Whether any frame in the cause chain exposes a quota or
    /// conflict status.
    pub fn is_quota(&self) -> bool {
        is_quota_or_conflict(self)
    }
}
