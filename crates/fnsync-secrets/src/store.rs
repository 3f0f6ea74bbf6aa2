//! Secret creation, adoption, and endpoint pinning.

use std::collections::BTreeMap;

use tracing::{info, warn};

use fnsync_cloud::{FunctionsClient, OperationPoller, Prompter, Secret, SecretVersion, SecretsClient};
use fnsync_core::Endpoint;
use fnsync_core::config::PromptConfig;

use crate::error::{SecretsError, SecretsResult};

/// Label marking a secret as managed by this tool. Only labeled
/// secrets are ever pruned.
pub const MANAGED_LABEL: &str = "fnsync-managed";

fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(MANAGED_LABEL.to_string(), "true".to_string())])
}

pub(crate) fn is_managed(secret: &Secret) -> bool {
    secret.labels.get(MANAGED_LABEL).map(String::as_str) == Some("true")
}

/// Fetch the secret, creating it when absent.
///
/// An existing secret missing the ownership label is adopted: warn,
/// confirm (force bypasses, non-interactive fails closed), then patch
/// the label on rather than failing the deploy.
pub async fn ensure_secret(
    client: &dyn SecretsClient,
    prompter: &dyn Prompter,
    project: &str,
    name: &str,
    prompts: &PromptConfig,
) -> SecretsResult<Secret> {
    match client.get_secret(project, name).await {
        Ok(secret) => {
            if is_managed(&secret) {
                return Ok(secret);
            }
            warn!(%project, secret = %name, "secret exists but is not managed by this tool");
            if !prompts.force {
                let question =
                    format!("secret {name} already exists in {project}; manage it from now on?");
                if prompts.non_interactive {
                    return Err(SecretsError::NonInteractive(question));
                }
                if !prompter.confirm(&question).await {
                    return Err(SecretsError::Aborted(question));
                }
            }
            let mut labels = secret.labels.clone();
            labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
            Ok(client.patch_secret(project, name, labels).await?)
        }
        Err(err) if err.is_not_found() => {
            info!(%project, secret = %name, "creating secret");
            Ok(client
                .create_secret(project, name, managed_labels())
                .await?)
        }
        Err(err) => Err(err.into()),
    }
}

/// Pin the endpoint's reference to the given version and push the
/// update. No-op when the endpoint does not reference the secret
/// family at all.
pub async fn update_endpoint_secret(
    functions: &dyn FunctionsClient,
    poller: &dyn OperationPoller,
    project: &str,
    version: &SecretVersion,
    endpoint: &Endpoint,
) -> SecretsResult<Option<Endpoint>> {
    if !endpoint.references_secret(project, &version.secret.name) {
        return Ok(None);
    }

    let mut updated = endpoint.clone();
    for secret in updated.secret_env.iter_mut() {
        if secret.project_id == project && secret.secret == version.secret.name {
            secret.version = Some(version.version_id.clone());
        }
    }

    let operation = functions.update_function(&updated).await?;
    if !operation.done {
        poller.wait(operation).await?;
    }
    info!(
        endpoint = %updated.key(),
        secret = %version.secret.name,
        version = %version.version_id,
        "pinned endpoint to new secret version"
    );
    Ok(Some(updated))
}
