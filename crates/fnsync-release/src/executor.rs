//! Bounded-concurrency release execution.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use fnsync_cloud::{
    ApiResult, Binding, FunctionsClient, IamPolicy, OperationPoller, is_quota_or_conflict,
};
use fnsync_core::config::{ApplyConfig, RetryConfig};
use fnsync_core::{Backoff, Endpoint, PlatformVersion, Trigger};

use crate::error::{DeploymentError, OperationType};
use crate::plan::Changeset;
use crate::reporter::Summary;

/// Outcome of one endpoint's apply attempt.
#[derive(Debug)]
pub struct DeploymentResult {
    pub endpoint: Endpoint,
    pub op: OperationType,
    pub duration_ms: u64,
    pub error: Option<DeploymentError>,
}

/// Applies a changeset with bounded concurrency and quota-aware retry.
pub struct Executor {
    functions: Arc<dyn FunctionsClient>,
    poller: Arc<dyn OperationPoller>,
    apply: ApplyConfig,
    retry: RetryConfig,
}

fn invoker_role(platform: PlatformVersion) -> &'static str {
    match platform {
        PlatformVersion::Gen1 => "roles/cloudfunctions.invoker",
        PlatformVersion::Gen2 => "roles/run.invoker",
    }
}

/// Principals to grant invoke on right after a create, if any.
///
/// Callable endpoints must be publicly invokable; HTTPS and task-queue
/// endpoints only get a grant when an invoker list was declared. A
/// `None` here relies on the platform's public-on-create default.
fn invoker_members(endpoint: &Endpoint) -> Option<Vec<String>> {
    if endpoint.is_callable() {
        return Some(vec!["allUsers".to_string()]);
    }
    let declared = match &endpoint.trigger {
        Trigger::Https { invoker } => invoker.as_ref(),
        Trigger::TaskQueue { invoker, .. } => invoker.as_ref(),
        _ => None,
    }?;
    Some(
        declared
            .iter()
            .map(|member| {
                if member == "public" {
                    "allUsers".to_string()
                } else {
                    member.clone()
                }
            })
            .collect(),
    )
}

impl Executor {
    pub fn new(
        functions: Arc<dyn FunctionsClient>,
        poller: Arc<dyn OperationPoller>,
        apply: ApplyConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            functions,
            poller,
            apply,
            retry,
        }
    }

    /// Apply the changeset: creates and updates concurrently first,
    /// then deletes. A delete whose id matches a failed upsert is
    /// replaced with an aborted result instead of being attempted.
    pub async fn apply(&self, changes: &Changeset) -> Summary {
        let semaphore = Semaphore::new(self.apply.concurrency.max(1));
        info!(
            creates = changes.creates.len(),
            updates = changes.updates.len(),
            deletes = changes.deletes.len(),
            unchanged = changes.unchanged.len(),
            "applying release"
        );

        let upserts = changes
            .creates
            .iter()
            .map(|endpoint| self.run(&semaphore, endpoint, OperationType::Create))
            .chain(
                changes
                    .updates
                    .iter()
                    .map(|update| self.run(&semaphore, &update.to, OperationType::Update)),
            );
        let mut results: Vec<DeploymentResult> = join_all(upserts).await;

        let failed_ids: BTreeSet<String> = results
            .iter()
            .filter(|result| result.error.is_some())
            .map(|result| result.endpoint.id.clone())
            .collect();

        let (aborted, deletable): (Vec<_>, Vec<_>) = changes
            .deletes
            .iter()
            .partition(|endpoint| failed_ids.contains(&endpoint.id));

        for endpoint in aborted {
            warn!(endpoint = %endpoint.key(), "aborting delete: replacement failed to deploy");
            results.push(DeploymentResult {
                endpoint: endpoint.clone(),
                op: OperationType::Delete,
                duration_ms: 0,
                error: Some(DeploymentError::Aborted {
                    endpoint: endpoint.key(),
                }),
            });
        }

        let deletes = deletable
            .into_iter()
            .map(|endpoint| self.run(&semaphore, endpoint, OperationType::Delete));
        results.extend(join_all(deletes).await);

        Summary { results }
    }

    async fn run(
        &self,
        semaphore: &Semaphore,
        endpoint: &Endpoint,
        op: OperationType,
    ) -> DeploymentResult {
        // The semaphore is never closed.
        let _permit = semaphore.acquire().await.ok();
        let start = Instant::now();
        let error = self.attempt(endpoint, op).await.err();
        DeploymentResult {
            endpoint: endpoint.clone(),
            op,
            duration_ms: start.elapsed().as_millis() as u64,
            error,
        }
    }

    async fn attempt(&self, endpoint: &Endpoint, op: OperationType) -> Result<(), DeploymentError> {
        self.call_with_retry(endpoint, op)
            .await
            .map_err(|cause| DeploymentError::Failed {
                endpoint: endpoint.key(),
                op,
                cause,
            })?;

        // A created function with declared invokers (or a callable's
        // implicit public one) needs its invoke policy set before it
        // is reachable.
        if op == OperationType::Create {
            if let Some(members) = invoker_members(endpoint) {
                self.set_invoker(endpoint, members)
                    .await
                    .map_err(|cause| DeploymentError::Failed {
                        endpoint: endpoint.key(),
                        op: OperationType::SetInvoker,
                        cause,
                    })?;
            }
        }
        Ok(())
    }

    async fn call_with_retry(&self, endpoint: &Endpoint, op: OperationType) -> ApiResult<()> {
        let mut backoff = Backoff::from_config(&self.retry);
        loop {
            match self.call_once(endpoint, op).await {
                Ok(()) => return Ok(()),
                Err(err) if is_quota_or_conflict(&err) => match backoff.next_delay() {
                    Some(delay) => {
                        warn!(
                            endpoint = %endpoint.key(),
                            %op,
                            error = %err,
                            ?delay,
                            "quota or conflict, backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(err),
                },
                Err(err) => return Err(err),
            }
        }
    }

    async fn call_once(&self, endpoint: &Endpoint, op: OperationType) -> ApiResult<()> {
        let operation = match op {
            OperationType::Create => self.functions.create_function(endpoint).await?,
            OperationType::Update => self.functions.update_function(endpoint).await?,
            OperationType::Delete => self.functions.delete_function(&endpoint.key()).await?,
            // Invoker grants go through set_invoker, not here.
            OperationType::SetInvoker => return Ok(()),
        };
        if !operation.done {
            self.poller.wait(operation).await?;
        }
        Ok(())
    }

    async fn set_invoker(&self, endpoint: &Endpoint, members: Vec<String>) -> ApiResult<()> {
        let policy = IamPolicy {
            etag: String::new(),
            version: 3,
            bindings: vec![Binding {
                role: invoker_role(endpoint.platform).to_string(),
                members,
            }],
        };
        self.functions
            .set_function_iam_policy(&endpoint.key(), &policy, &["bindings"])
            .await
    }
}
