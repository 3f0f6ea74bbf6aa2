//! Deployment API client contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fnsync_core::Endpoint;

use crate::error::ApiResult;
use crate::policy::IamPolicy;

/// Reference to a long-running server-side operation.
///
/// Clients may return operations already complete (`done`); anything
/// else goes through the [`OperationPoller`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationHandle {
    pub name: String,
    pub done: bool,
}

impl OperationHandle {
    /// An operation the client resolved before returning.
    pub fn completed() -> Self {
        Self {
            name: String::new(),
            done: true,
        }
    }

    pub fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            done: false,
        }
    }
}

/// Waits for operations the API did not return already-complete.
#[async_trait]
pub trait OperationPoller: Send + Sync {
    async fn wait(&self, operation: OperationHandle) -> ApiResult<()>;
}

/// The deployment API: per-endpoint lifecycle plus function-level IAM.
#[async_trait]
pub trait FunctionsClient: Send + Sync {
    async fn create_function(&self, endpoint: &Endpoint) -> ApiResult<OperationHandle>;

    async fn update_function(&self, endpoint: &Endpoint) -> ApiResult<OperationHandle>;

    /// Delete by fully-qualified key (`projects/…/functions/…`).
    async fn delete_function(&self, key: &str) -> ApiResult<OperationHandle>;

    /// The have state: every deployed function in the project.
    async fn list_functions(&self, project: &str) -> ApiResult<Vec<Endpoint>>;

    async fn get_function_iam_policy(&self, key: &str) -> ApiResult<IamPolicy>;

    async fn set_function_iam_policy(
        &self,
        key: &str,
        policy: &IamPolicy,
        update_mask: &[&str],
    ) -> ApiResult<()>;
}
