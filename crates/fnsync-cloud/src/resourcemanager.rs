//! Project IAM API client contract.

use async_trait::async_trait;

use crate::error::ApiResult;
use crate::policy::IamPolicy;

/// Project-level IAM reads and writes, keyed by project number.
#[async_trait]
pub trait ResourceManagerClient: Send + Sync {
    async fn get_iam_policy(&self, project_number: u64) -> ApiResult<IamPolicy>;

    /// Partial write: only the fields named in `update_mask` are applied.
    async fn set_iam_policy(
        &self,
        project_number: u64,
        policy: &IamPolicy,
        update_mask: &[&str],
    ) -> ApiResult<()>;
}
