//! The release pipeline.
//!
//! Ordering matters: secret resolution happens before execution so the
//! executor deploys pinned versions, and pruning happens after so it
//! sees the final referenced-version set. Service-agent provisioning
//! runs before any trigger that depends on it is created. Artifact
//! cleanup is spawned in the background; its failures are logged,
//! never surfaced as deploy failures.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use fnsync_artifacts::{
    ArtifactRegistryCleaner, Cleaner, ContainerRegistryCleaner, DockerHelper, delete_artifacts,
};
use fnsync_cloud::{
    AnalyticsSink, ArtifactRegistryClient, ContainerRegistryClient, FunctionsClient,
    OperationPoller, Prompter, ResourceManagerClient, Secret, SecretVersion, SecretsClient,
};
use fnsync_core::{Backend, Endpoint, PlatformVersion, ReconcilerConfig, merge_backends};
use fnsync_iam::ensure_service_agent_roles;
use fnsync_release::{
    Executor, OperationType, Summary, log_and_track_deploy_stats, plan_changes, report_errors,
};
use fnsync_secrets::{
    ensure_secret, ensure_valid_key, prune_and_destroy_secrets, update_endpoint_secret,
};
use fnsync_validate::{
    endpoints_are_unique, endpoints_are_valid, function_ids_are_valid, secrets_are_valid,
};

use crate::error::{PipelineError, PipelineResult};

/// Every collaborator the pipeline talks to.
#[derive(Clone)]
pub struct Clients {
    pub functions: Arc<dyn FunctionsClient>,
    pub resource_manager: Arc<dyn ResourceManagerClient>,
    pub secrets: Arc<dyn SecretsClient>,
    pub container_registry: Arc<dyn ContainerRegistryClient>,
    pub artifact_registry: Arc<dyn ArtifactRegistryClient>,
    pub poller: Arc<dyn OperationPoller>,
    pub prompter: Arc<dyn Prompter>,
    pub analytics: Arc<dyn AnalyticsSink>,
}

pub struct Pipeline {
    clients: Clients,
    config: ReconcilerConfig,
}

impl Pipeline {
    pub fn new(clients: Clients, config: ReconcilerConfig) -> Self {
        Self { clients, config }
    }

    /// Run a full release of the declared backends.
    ///
    /// Validation failures abort before any side effect. Per-endpoint
    /// deployment failures are collected into the returned summary,
    /// never raised from here.
    pub async fn release(
        &self,
        project: &str,
        project_number: u64,
        backends: Vec<Backend>,
    ) -> PipelineResult<Summary> {
        endpoints_are_unique(&backends)?;
        let mut want = merge_backends(backends);
        {
            let endpoints: Vec<&Endpoint> = want.endpoints().collect();
            function_ids_are_valid(&endpoints)?;
        }
        endpoints_are_valid(&want)?;
        secrets_are_valid(self.clients.secrets.as_ref(), project, &mut want).await?;

        let deployed = self
            .clients
            .functions
            .list_functions(project)
            .await
            .map_err(PipelineError::Listing)?;
        let have = Backend::of(deployed);

        ensure_service_agent_roles(
            self.clients.resource_manager.as_ref(),
            project,
            project_number,
            &want,
            &have,
        )
        .await?;

        let changes = plan_changes(&want, &have);
        let executor = Executor::new(
            self.clients.functions.clone(),
            self.clients.poller.clone(),
            self.config.apply.clone(),
            self.config.retry.clone(),
        );
        let summary = executor.apply(&changes).await;

        log_and_track_deploy_stats(self.clients.analytics.as_ref(), &summary);
        let report = report_errors(&summary);
        if !report.is_empty() {
            error!("{report}");
        }

        // Pruning runs after execution so it sees the final
        // referenced-version set; its failures never fail the deploy.
        let endpoints: Vec<&Endpoint> = want.endpoints().collect();
        match prune_and_destroy_secrets(self.clients.secrets.as_ref(), project, &endpoints).await {
            Ok(outcome) => {
                if !outcome.destroyed.is_empty() || !outcome.erred.is_empty() {
                    info!(
                        destroyed = outcome.destroyed.len(),
                        erred = outcome.erred.len(),
                        "pruned unused secret versions"
                    );
                }
            }
            Err(err) => warn!(error = %err, "secret pruning failed"),
        }

        let _ = self.spawn_artifact_cleanup(&summary);

        Ok(summary)
    }

    /// Explicit purge: walk and delete the project's legacy artifact
    /// trees. Unlike the release, a failure anywhere fails the call.
    pub async fn purge_artifacts(
        &self,
        project: &str,
        regions: Option<Vec<String>>,
    ) -> PipelineResult<()> {
        let regions = regions.or_else(|| self.config.cleanup.regions.clone());
        let helper = DockerHelper::new(
            self.clients.container_registry.clone(),
            self.config.retry.clone(),
        );
        delete_artifacts(&helper, project, regions.as_deref()).await?;
        Ok(())
    }

    /// Prepare a secret for use as an environment value: canonicalize
    /// the key, then create or adopt the secret.
    pub async fn prepare_secret(
        &self,
        project: &str,
        name: &str,
    ) -> PipelineResult<(String, Secret)> {
        let key =
            ensure_valid_key(self.clients.prompter.as_ref(), name, &self.config.prompts).await?;
        let secret = ensure_secret(
            self.clients.secrets.as_ref(),
            self.clients.prompter.as_ref(),
            project,
            name,
            &self.config.prompts,
        )
        .await?;
        Ok((key, secret))
    }

    /// Pin every endpoint referencing the secret to a new version.
    pub async fn roll_secret_version(
        &self,
        project: &str,
        version: &SecretVersion,
        endpoints: &[Endpoint],
    ) -> PipelineResult<Vec<Endpoint>> {
        let mut updated = Vec::new();
        for endpoint in endpoints {
            if let Some(pinned) = update_endpoint_secret(
                self.clients.functions.as_ref(),
                self.clients.poller.as_ref(),
                project,
                version,
                endpoint,
            )
            .await?
            {
                updated.push(pinned);
            }
        }
        Ok(updated)
    }

    fn spawn_artifact_cleanup(&self, summary: &Summary) -> JoinHandle<()> {
        let targets: Vec<(Endpoint, OperationType)> = summary
            .results
            .iter()
            .filter(|result| result.error.is_none())
            .map(|result| (result.endpoint.clone(), result.op))
            .collect();
        let container = ContainerRegistryCleaner::new(DockerHelper::new(
            self.clients.container_registry.clone(),
            self.config.retry.clone(),
        ));
        let artifact = ArtifactRegistryCleaner::new(
            self.clients.artifact_registry.clone(),
            self.clients.poller.clone(),
        );
        tokio::spawn(run_cleanup(container, artifact, targets))
    }
}

/// Best-effort cleanup of the artifacts behind each applied endpoint:
/// the legacy registry serves generation 1, the artifact registry
/// generation 2, and deletes also drop the build cache.
async fn run_cleanup(
    container: ContainerRegistryCleaner,
    artifact: ArtifactRegistryCleaner,
    targets: Vec<(Endpoint, OperationType)>,
) {
    for (endpoint, op) in targets {
        let cleaner: &dyn Cleaner = match endpoint.platform {
            PlatformVersion::Gen1 => &container,
            PlatformVersion::Gen2 => &artifact,
        };
        if let Err(err) = cleaner.cleanup_function(&endpoint).await {
            warn!(endpoint = %endpoint.key(), error = %err, "artifact cleanup failed");
        }
        if op == OperationType::Delete {
            if let Err(err) = cleaner.cleanup_function_cache(&endpoint).await {
                warn!(endpoint = %endpoint.key(), error = %err, "artifact cache cleanup failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use fnsync_cloud::memory::{
        MemoryArtifactRegistry, MemoryContainerRegistry, MemoryFunctions, MemoryPoller,
        MemoryResourceManager, MemorySecrets, ScriptedPrompter,
    };
    use fnsync_cloud::{PathListing, SecretVersionState};
    use fnsync_core::{SecretEnvVar, Trigger};
    use fnsync_release::Outcome;
    use fnsync_secrets::MANAGED_LABEL;

    struct Fixture {
        functions: Arc<MemoryFunctions>,
        resource_manager: Arc<MemoryResourceManager>,
        secrets: Arc<MemorySecrets>,
        container_registry: Arc<MemoryContainerRegistry>,
        artifact_registry: Arc<MemoryArtifactRegistry>,
        pipeline: Pipeline,
    }

    fn fixture() -> Fixture {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let functions = Arc::new(MemoryFunctions::new());
        let resource_manager = Arc::new(MemoryResourceManager::new());
        let secrets = Arc::new(MemorySecrets::new());
        let container_registry = Arc::new(MemoryContainerRegistry::new());
        let artifact_registry = Arc::new(MemoryArtifactRegistry::new());
        let poller = Arc::new(MemoryPoller::new());
        let prompter = Arc::new(ScriptedPrompter::new(&[]));
        let analytics = Arc::new(fnsync_cloud::NoopAnalytics);

        let clients = Clients {
            functions: functions.clone(),
            resource_manager: resource_manager.clone(),
            secrets: secrets.clone(),
            container_registry: container_registry.clone(),
            artifact_registry: artifact_registry.clone(),
            poller,
            prompter,
            analytics,
        };
        let mut config = ReconcilerConfig::default();
        config.retry.base_delay_ms = 1;
        config.retry.max_delay_ms = 2;

        Fixture {
            functions,
            resource_manager,
            secrets,
            container_registry,
            artifact_registry,
            pipeline: Pipeline::new(clients, config),
        }
    }

    fn https(id: &str) -> Endpoint {
        Endpoint::new("p", "us-central1", id, Trigger::Https { invoker: None })
    }

    #[tokio::test]
    async fn release_converges_want_against_have() {
        let fx = fixture();
        fx.functions.seed([https("stale")]);

        let backend = Backend::of([https("new")]);
        let summary = fx.pipeline.release("p", 42, vec![backend]).await.unwrap();

        assert_eq!(summary.outcome(), Outcome::Success);
        assert!(fx.functions.contains("projects/p/locations/us-central1/functions/new"));
        assert!(!fx.functions.contains("projects/p/locations/us-central1/functions/stale"));
    }

    #[tokio::test]
    async fn validation_failure_stops_before_any_side_effect() {
        let fx = fixture();
        let backend = Backend::of([https("Bad_Id!")]);

        let err = fx.pipeline.release("p", 42, vec![backend]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert!(fx.functions.calls().is_empty());
    }

    #[tokio::test]
    async fn duplicate_ids_across_codebases_are_rejected() {
        let fx = fixture();
        let mut a = Backend::empty("api");
        let mut ep = https("i1");
        ep.codebase = "api".to_string();
        a.insert(ep);
        let mut b = Backend::empty("jobs");
        let mut ep = https("i1");
        ep.codebase = "jobs".to_string();
        b.insert(ep);

        let err = fx.pipeline.release("p", 42, vec![a, b]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[tokio::test]
    async fn release_resolves_secrets_and_provisions_agents() {
        let fx = fixture();
        fx.secrets.seed_secret(Secret {
            project_id: "p".to_string(),
            name: "api-key".to_string(),
            labels: BTreeMap::from([(MANAGED_LABEL.to_string(), "true".to_string())]),
        });
        fx.secrets
            .seed_version("p", "api-key", "1", SecretVersionState::Enabled);

        let mut ep = Endpoint::new(
            "p",
            "us-central1",
            "on-upload",
            Trigger::Event {
                event_type: "google.cloud.storage.object.v1.finalized".to_string(),
                filters: BTreeMap::new(),
                retry: false,
            },
        );
        ep.platform = PlatformVersion::Gen2;
        ep.secret_env.push(SecretEnvVar {
            key: "API_KEY".to_string(),
            project_id: "p".to_string(),
            secret: "api-key".to_string(),
            version: None,
        });

        let summary = fx
            .pipeline
            .release("p", 42, vec![Backend::of([ep])])
            .await
            .unwrap();

        assert_eq!(summary.outcome(), Outcome::Success);
        // The deployed endpoint carries the pinned version, not "latest".
        let deployed = fx
            .functions
            .function("projects/p/locations/us-central1/functions/on-upload")
            .unwrap();
        assert_eq!(deployed.secret_env[0].version.as_deref(), Some("1"));
        // Storage events are new to the project: roles were granted.
        assert!(fx.resource_manager.policy().binding("roles/pubsub.publisher").is_some());
    }

    #[tokio::test]
    async fn release_prunes_unreferenced_secret_versions() {
        let fx = fixture();
        fx.secrets.seed_secret(Secret {
            project_id: "p".to_string(),
            name: "api-key".to_string(),
            labels: BTreeMap::from([(MANAGED_LABEL.to_string(), "true".to_string())]),
        });
        fx.secrets
            .seed_version("p", "api-key", "1", SecretVersionState::Enabled);
        fx.secrets
            .seed_version("p", "api-key", "2", SecretVersionState::Enabled);

        let mut ep = https("fn1");
        ep.secret_env.push(SecretEnvVar {
            key: "API_KEY".to_string(),
            project_id: "p".to_string(),
            secret: "api-key".to_string(),
            version: None,
        });

        fx.pipeline
            .release("p", 42, vec![Backend::of([ep])])
            .await
            .unwrap();

        // "latest" resolved to v2, so v1 was orphaned and destroyed.
        assert_eq!(
            fx.secrets.version_state("p", "api-key", "1"),
            Some(SecretVersionState::Destroyed)
        );
        assert_eq!(
            fx.secrets.version_state("p", "api-key", "2"),
            Some(SecretVersionState::Enabled)
        );
    }

    #[tokio::test]
    async fn per_endpoint_failures_surface_in_the_summary_not_as_errors() {
        let fx = fixture();
        fx.functions.fail(
            "create projects/p/locations/us-central1/functions/bad",
            500,
            0,
        );
        let backend = Backend::of([https("bad"), https("good")]);

        let summary = fx.pipeline.release("p", 42, vec![backend]).await.unwrap();
        assert_eq!(summary.outcome(), Outcome::PartialSuccess);
    }

    #[tokio::test]
    async fn cleanup_routes_by_platform_and_cleans_cache_on_delete() {
        let fx = fixture();
        let mut gen2 = https("modern");
        gen2.platform = PlatformVersion::Gen2;
        let targets = vec![
            (https("legacy"), OperationType::Create),
            (gen2, OperationType::Delete),
        ];
        fx.container_registry.seed(
            "us/p/functions/us-central1/legacy",
            PathListing {
                tags: vec!["latest".to_string()],
                digests: vec!["d1".to_string()],
                children: Vec::new(),
            },
        );

        let container = ContainerRegistryCleaner::new(DockerHelper::new(
            fx.container_registry.clone(),
            fnsync_core::RetryConfig::default(),
        ));
        let artifact = ArtifactRegistryCleaner::new(
            fx.artifact_registry.clone(),
            Arc::new(MemoryPoller::new()),
        );
        run_cleanup(container, artifact, targets).await;

        let legacy = fx
            .container_registry
            .listing("us/p/functions/us-central1/legacy")
            .unwrap();
        assert!(legacy.tags.is_empty());
        let deleted = fx.artifact_registry.deleted();
        assert_eq!(deleted.len(), 2);
        assert!(deleted[1].ends_with("%2fcache"));
    }

    #[tokio::test]
    async fn purge_fails_when_any_subdomain_walk_fails() {
        let fx = fixture();
        fx.container_registry.fail("ls us/p/functions", 403, 0);

        let err = fx.pipeline.purge_artifacts("p", None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Artifacts(_)));
    }

    #[tokio::test]
    async fn prepare_secret_creates_and_returns_the_key() {
        let fx = fixture();
        let (key, secret) = fx.pipeline.prepare_secret("p", "API_KEY").await.unwrap();
        assert_eq!(key, "API_KEY");
        assert_eq!(secret.labels.get(MANAGED_LABEL).map(String::as_str), Some("true"));
    }

    #[tokio::test]
    async fn roll_secret_version_pins_referencing_endpoints() {
        let fx = fixture();
        let mut referencing = https("uses-secret");
        referencing.secret_env.push(SecretEnvVar {
            key: "API_KEY".to_string(),
            project_id: "p".to_string(),
            secret: "api-key".to_string(),
            version: Some("1".to_string()),
        });
        let unrelated = https("plain");
        fx.functions.seed([referencing.clone(), unrelated.clone()]);

        let version = SecretVersion {
            secret: Secret {
                project_id: "p".to_string(),
                name: "api-key".to_string(),
                labels: BTreeMap::new(),
            },
            version_id: "2".to_string(),
            state: SecretVersionState::Enabled,
        };
        let updated = fx
            .pipeline
            .roll_secret_version("p", &version, &[referencing, unrelated])
            .await
            .unwrap();

        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].secret_env[0].version.as_deref(), Some("2"));
    }
}
