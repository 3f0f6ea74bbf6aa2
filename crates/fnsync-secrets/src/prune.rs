//! Orphaned secret version pruning.

use std::collections::BTreeSet;

use futures::future::join_all;
use tracing::{info, warn};

use fnsync_cloud::{ApiError, SecretVersion, SecretVersionState, SecretsClient};
use fnsync_core::Endpoint;

use crate::error::SecretsResult;
use crate::store::is_managed;

/// One secret version, by name and id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VersionRef {
    pub secret: String,
    pub version: String,
}

impl VersionRef {
    fn of(version: &SecretVersion) -> Self {
        Self {
            secret: version.secret.name.clone(),
            version: version.version_id.clone(),
        }
    }
}

/// Result of a destroy batch. Failures never abort the batch.
#[derive(Debug, Default)]
pub struct PruneOutcome {
    pub destroyed: Vec<VersionRef>,
    pub erred: Vec<(VersionRef, ApiError)>,
}

/// Highest numeric version id, the registry's notion of "latest".
fn latest_version_id(versions: &[SecretVersion]) -> Option<String> {
    versions
        .iter()
        .max_by_key(|v| v.version_id.parse::<u64>().unwrap_or(0))
        .map(|v| v.version_id.clone())
}

/// Versions of managed secrets that no endpoint references.
///
/// References still carrying the symbolic `latest` alias are resolved
/// against the live listing before the set difference, so the version
/// currently considered latest is never pruned out from under them.
pub async fn prune_secrets(
    client: &dyn SecretsClient,
    project: &str,
    endpoints: &[&Endpoint],
) -> SecretsResult<Vec<VersionRef>> {
    let secrets = client.list_secrets(project).await?;
    let managed: Vec<_> = secrets.iter().filter(|s| is_managed(s)).collect();

    let listings = join_all(
        managed
            .iter()
            .map(|secret| client.list_secret_versions(project, &secret.name)),
    )
    .await;

    let mut live: Vec<SecretVersion> = Vec::new();
    for listing in listings {
        live.extend(
            listing?
                .into_iter()
                .filter(|v| v.state != SecretVersionState::Destroyed),
        );
    }

    let mut referenced: BTreeSet<VersionRef> = BTreeSet::new();
    for endpoint in endpoints {
        for secret in &endpoint.secret_env {
            if secret.project_id != project {
                continue;
            }
            let version = if secret.is_latest() {
                let of_secret: Vec<SecretVersion> = live
                    .iter()
                    .filter(|v| v.secret.name == secret.secret)
                    .cloned()
                    .collect();
                match latest_version_id(&of_secret) {
                    Some(id) => id,
                    None => continue,
                }
            } else {
                secret.version.clone().unwrap_or_default()
            };
            referenced.insert(VersionRef {
                secret: secret.secret.clone(),
                version,
            });
        }
    }

    Ok(live
        .iter()
        .map(VersionRef::of)
        .filter(|version| !referenced.contains(version))
        .collect())
}

/// Destroy every pruned version, isolating per-version failures so the
/// caller can report partial success.
pub async fn prune_and_destroy_secrets(
    client: &dyn SecretsClient,
    project: &str,
    endpoints: &[&Endpoint],
) -> SecretsResult<PruneOutcome> {
    let pruned = prune_secrets(client, project, endpoints).await?;
    let mut outcome = PruneOutcome::default();

    let attempts = join_all(pruned.iter().map(|version| async move {
        let result = client
            .destroy_secret_version(project, &version.secret, &version.version)
            .await;
        (version.clone(), result)
    }))
    .await;

    for (version, result) in attempts {
        match result {
            Ok(()) => {
                info!(secret = %version.secret, version = %version.version, "destroyed unused secret version");
                outcome.destroyed.push(version);
            }
            Err(err) => {
                warn!(
                    secret = %version.secret,
                    version = %version.version,
                    error = %err,
                    "failed to destroy unused secret version"
                );
                outcome.erred.push((version, err));
            }
        }
    }

    Ok(outcome)
}
