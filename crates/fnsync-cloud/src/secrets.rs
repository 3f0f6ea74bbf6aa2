//! Secret storage API client contract.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;

/// A named secret. Owned externally; FnSync only reads it, creates it
/// if absent, and destroys versions it determines are orphaned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub project_id: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

/// Lifecycle state of a secret version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecretVersionState {
    Enabled,
    Disabled,
    Destroyed,
}

/// An immutable revision of a secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretVersion {
    pub secret: Secret,
    pub version_id: String,
    pub state: SecretVersionState,
}

#[async_trait]
pub trait SecretsClient: Send + Sync {
    async fn get_secret(&self, project: &str, name: &str) -> ApiResult<Secret>;

    async fn create_secret(
        &self,
        project: &str,
        name: &str,
        labels: BTreeMap<String, String>,
    ) -> ApiResult<Secret>;

    /// Replace the secret's labels.
    async fn patch_secret(
        &self,
        project: &str,
        name: &str,
        labels: BTreeMap<String, String>,
    ) -> ApiResult<Secret>;

    /// Fetch a version by id or by the symbolic `"latest"` alias.
    async fn get_secret_version(
        &self,
        project: &str,
        name: &str,
        version: &str,
    ) -> ApiResult<SecretVersion>;

    async fn list_secrets(&self, project: &str) -> ApiResult<Vec<Secret>>;

    async fn list_secret_versions(&self, project: &str, name: &str)
    -> ApiResult<Vec<SecretVersion>>;

    async fn destroy_secret_version(
        &self,
        project: &str,
        name: &str,
        version: &str,
    ) -> ApiResult<()>;
}
