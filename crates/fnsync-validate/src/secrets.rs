//! Secret reference validation and resolution.

use std::collections::{BTreeMap, BTreeSet};

use futures::future::join_all;
use tracing::debug;

use fnsync_cloud::{SecretVersionState, SecretsClient};
use fnsync_core::{Backend, PlatformVersion};

use crate::error::{SecretFailure, ValidationError, ValidationResult};

/// Generations that support secret injection.
const SECRETS_SUPPORTED_PLATFORMS: &[PlatformVersion] =
    &[PlatformVersion::Gen1, PlatformVersion::Gen2];

/// Validate every secret reference in the backend and pin each one to a
/// concrete version id.
///
/// References are fetched concurrently; all failures are aggregated
/// into one error. On success the backend is mutated in place: every
/// reference's `version` is replaced with the resolved id, and
/// downstream stages consume the resolved backend, not a snapshot.
/// References with an empty owning project fall back to `project`.
pub async fn secrets_are_valid(
    client: &dyn SecretsClient,
    project: &str,
    backend: &mut Backend,
) -> ValidationResult<()> {
    let mut failures = Vec::new();

    for endpoint in backend.endpoints() {
        if !endpoint.secret_env.is_empty()
            && !SECRETS_SUPPORTED_PLATFORMS.contains(&endpoint.platform)
        {
            for secret in &endpoint.secret_env {
                failures.push(SecretFailure {
                    project_id: secret.project_id.clone(),
                    secret: secret.secret.clone(),
                    reason: format!(
                        "platform {} does not support secret environment variables",
                        endpoint.platform
                    ),
                });
            }
        }
    }

    let mut references: BTreeSet<(String, String, String)> = BTreeSet::new();
    for endpoint in backend.endpoints() {
        for secret in &endpoint.secret_env {
            let owner = if secret.project_id.is_empty() {
                project.to_string()
            } else {
                secret.project_id.clone()
            };
            let alias = secret.version.clone().unwrap_or_else(|| "latest".to_string());
            references.insert((owner, secret.secret.clone(), alias));
        }
    }

    let fetches = references.iter().map(|(owner, name, alias)| async move {
        let result = client.get_secret_version(owner, name, alias).await;
        ((owner.clone(), name.clone(), alias.clone()), result)
    });

    let mut resolved: BTreeMap<(String, String, String), String> = BTreeMap::new();
    for (reference, result) in join_all(fetches).await {
        match result {
            Ok(version) if version.state == SecretVersionState::Enabled => {
                debug!(
                    secret = %reference.1,
                    version = %version.version_id,
                    "resolved secret reference"
                );
                resolved.insert(reference, version.version_id);
            }
            Ok(version) => failures.push(SecretFailure {
                project_id: reference.0,
                secret: reference.1,
                reason: format!(
                    "version {} is not in the ENABLED state",
                    version.version_id
                ),
            }),
            Err(err) => failures.push(SecretFailure {
                project_id: reference.0,
                secret: reference.1,
                reason: err.to_string(),
            }),
        }
    }

    if !failures.is_empty() {
        return Err(ValidationError::InvalidSecrets { failures });
    }

    for endpoint in backend.endpoints.values_mut() {
        for secret in endpoint.secret_env.iter_mut() {
            let owner = if secret.project_id.is_empty() {
                project.to_string()
            } else {
                secret.project_id.clone()
            };
            let alias = secret.version.clone().unwrap_or_else(|| "latest".to_string());
            if let Some(version_id) = resolved.get(&(owner, secret.secret.clone(), alias)) {
                secret.version = Some(version_id.clone());
            }
        }
    }

    Ok(())
}
