//! Registry API client contracts.
//!
//! Two alternative backends clean up build artifacts: the legacy
//! per-subdomain container registry (tag/digest granularity) and the
//! per-region artifact registry (whole-package deletes via
//! long-running operations).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::functions::OperationHandle;

/// Listing of one registry path: the tags and digests stored at the
/// path itself plus the names of its child paths.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PathListing {
    /// Tag names, in registry order. Tags must be deleted before the
    /// digests they point to.
    pub tags: Vec<String>,
    pub digests: Vec<String>,
    /// Child path names relative to this path.
    pub children: Vec<String>,
}

/// Legacy per-subdomain registry.
#[async_trait]
pub trait ContainerRegistryClient: Send + Sync {
    async fn list_path(&self, path: &str) -> ApiResult<PathListing>;

    async fn delete_tag(&self, path: &str, tag: &str) -> ApiResult<()>;

    async fn delete_image(&self, path: &str, digest: &str) -> ApiResult<()>;
}

/// Per-region artifact registry.
#[async_trait]
pub trait ArtifactRegistryClient: Send + Sync {
    /// Delete a whole package (`projects/…/packages/…`).
    async fn delete_package(&self, package_path: &str) -> ApiResult<OperationHandle>;
}
