//! Per-backend cleanup of one function's build artifacts.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use fnsync_cloud::{ArtifactRegistryClient, OperationPoller};
use fnsync_core::Endpoint;

use crate::docker::DockerHelper;
use crate::error::{ArtifactError, ArtifactResult};

/// Geography subdomains of the legacy registry.
pub const SUBDOMAINS: &[&str] = &["us", "eu", "asia"];

/// Subdomain hosting a region's legacy artifacts.
pub fn subdomain_for_region(region: &str) -> &'static str {
    if region.starts_with("europe") {
        "eu"
    } else if region.starts_with("asia") || region.starts_with("australia") {
        "asia"
    } else {
        "us"
    }
}

/// Escape a function id into an artifact registry package name.
///
/// The registry disallows uppercase: an uppercase letter `C` becomes
/// the `s-c` escape, and any byte outside `[a-z0-9-._~]` is
/// percent-encoded in lowercase hex.
pub fn escape_package_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            escaped.push_str("s-");
            escaped.push(c.to_ascii_lowercase());
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() || "-._~".contains(c) {
            escaped.push(c);
        } else {
            let mut buffer = [0u8; 4];
            for byte in c.encode_utf8(&mut buffer).bytes() {
                escaped.push_str(&format!("%{byte:02x}"));
            }
        }
    }
    escaped
}

/// Cleanup contract shared by both registry backends.
#[async_trait]
pub trait Cleaner: Send + Sync {
    /// Remove the build artifacts of one deployed function.
    async fn cleanup_function(&self, endpoint: &Endpoint) -> ArtifactResult<()>;

    /// Remove the build cache kept alongside the function's artifacts.
    async fn cleanup_function_cache(&self, endpoint: &Endpoint) -> ArtifactResult<()>;
}

/// Legacy per-subdomain registry backend.
pub struct ContainerRegistryCleaner {
    helper: DockerHelper,
}

impl ContainerRegistryCleaner {
    pub fn new(helper: DockerHelper) -> Self {
        Self { helper }
    }

    fn function_path(endpoint: &Endpoint) -> String {
        format!(
            "{}/{}/functions/{}/{}",
            subdomain_for_region(&endpoint.region),
            endpoint.project,
            endpoint.region,
            endpoint.id
        )
    }
}

#[async_trait]
impl Cleaner for ContainerRegistryCleaner {
    async fn cleanup_function(&self, endpoint: &Endpoint) -> ArtifactResult<()> {
        let path = Self::function_path(endpoint);
        debug!(%path, "cleaning legacy registry artifacts");
        self.helper.rm(&path).await
    }

    async fn cleanup_function_cache(&self, endpoint: &Endpoint) -> ArtifactResult<()> {
        let path = format!("{}/cache", Self::function_path(endpoint));
        self.helper.rm(&path).await
    }
}

/// Per-region artifact registry backend.
pub struct ArtifactRegistryCleaner {
    client: Arc<dyn ArtifactRegistryClient>,
    poller: Arc<dyn OperationPoller>,
}

impl ArtifactRegistryCleaner {
    pub fn new(client: Arc<dyn ArtifactRegistryClient>, poller: Arc<dyn OperationPoller>) -> Self {
        Self { client, poller }
    }

    fn package_path(endpoint: &Endpoint, suffix: Option<&str>) -> String {
        let name = match suffix {
            Some(suffix) => escape_package_name(&format!("{}/{suffix}", endpoint.id)),
            None => escape_package_name(&endpoint.id),
        };
        format!(
            "projects/{}/locations/{}/repositories/function-artifacts/packages/{name}",
            endpoint.project, endpoint.region
        )
    }

    async fn delete(&self, package_path: &str) -> ArtifactResult<()> {
        let operation = match self.client.delete_package(package_path).await {
            Ok(operation) => operation,
            // Nothing published for this function yet.
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(ArtifactError::Api(err)),
        };
        if !operation.done {
            self.poller.wait(operation).await?;
        }
        debug!(%package_path, "deleted artifact registry package");
        Ok(())
    }
}

#[async_trait]
impl Cleaner for ArtifactRegistryCleaner {
    async fn cleanup_function(&self, endpoint: &Endpoint) -> ArtifactResult<()> {
        self.delete(&Self::package_path(endpoint, None)).await
    }

    async fn cleanup_function_cache(&self, endpoint: &Endpoint) -> ArtifactResult<()> {
        self.delete(&Self::package_path(endpoint, Some("cache"))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fnsync_cloud::PathListing;
    use fnsync_cloud::memory::{MemoryArtifactRegistry, MemoryContainerRegistry, MemoryPoller};
    use fnsync_core::Trigger;
    use fnsync_core::config::RetryConfig;

    #[test]
    fn escape_folds_uppercase_to_s_lower() {
        assert_eq!(escape_package_name("helloWorld"), "hellos-world");
        assert_eq!(escape_package_name("plain-name_9"), "plain-name_9");
        assert_eq!(escape_package_name("fn/cache"), "fn%2fcache");
    }

    #[test]
    fn subdomains_by_region_prefix() {
        assert_eq!(subdomain_for_region("us-central1"), "us");
        assert_eq!(subdomain_for_region("europe-west1"), "eu");
        assert_eq!(subdomain_for_region("asia-northeast1"), "asia");
        assert_eq!(subdomain_for_region("australia-southeast1"), "asia");
        assert_eq!(subdomain_for_region("southamerica-east1"), "us");
    }

    fn endpoint() -> Endpoint {
        Endpoint::new("p", "us-central1", "myFn", Trigger::Https { invoker: None })
    }

    #[tokio::test]
    async fn legacy_cleaner_removes_the_function_tree() {
        let registry = Arc::new(MemoryContainerRegistry::new());
        registry.seed(
            "us/p/functions/us-central1/myFn",
            PathListing {
                tags: vec!["latest".to_string()],
                digests: vec!["d1".to_string()],
                children: Vec::new(),
            },
        );
        let cleaner = ContainerRegistryCleaner::new(DockerHelper::new(
            registry.clone(),
            RetryConfig::default(),
        ));

        cleaner.cleanup_function(&endpoint()).await.unwrap();
        let listing = registry.listing("us/p/functions/us-central1/myFn").unwrap();
        assert!(listing.tags.is_empty());
        assert!(listing.digests.is_empty());
    }

    #[tokio::test]
    async fn artifact_registry_cleaner_escapes_and_polls() {
        let registry = Arc::new(MemoryArtifactRegistry::new());
        let poller = Arc::new(MemoryPoller::new());
        let expected =
            "projects/p/locations/us-central1/repositories/function-artifacts/packages/mys-fn";
        registry.defer(expected, "operations/123");
        let cleaner = ArtifactRegistryCleaner::new(registry.clone(), poller.clone());

        cleaner.cleanup_function(&endpoint()).await.unwrap();

        assert_eq!(registry.deleted(), [expected]);
        assert_eq!(poller.waited(), ["operations/123"]);
    }

    #[tokio::test]
    async fn artifact_registry_cache_package_is_nested() {
        let registry = Arc::new(MemoryArtifactRegistry::new());
        let poller = Arc::new(MemoryPoller::new());
        let cleaner = ArtifactRegistryCleaner::new(registry.clone(), poller);

        cleaner.cleanup_function_cache(&endpoint()).await.unwrap();

        assert_eq!(
            registry.deleted(),
            ["projects/p/locations/us-central1/repositories/function-artifacts/packages/mys-fn%2fcache"]
        );
    }

    #[tokio::test]
    async fn missing_package_is_not_an_error() {
        let registry = Arc::new(MemoryArtifactRegistry::new());
        registry.fail(
            "delete_package projects/p/locations/us-central1/repositories/function-artifacts/packages/mys-fn",
            404,
            0,
        );
        let poller = Arc::new(MemoryPoller::new());
        let cleaner = ArtifactRegistryCleaner::new(registry.clone(), poller);

        cleaner.cleanup_function(&endpoint()).await.unwrap();
    }
}
