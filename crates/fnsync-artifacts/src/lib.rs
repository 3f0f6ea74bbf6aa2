//! fnsync-artifacts — stale build artifact cleanup.
//!
//! Deploys leave container images behind in one of two registries: the
//! legacy per-subdomain container registry and the per-region artifact
//! registry. [`docker::DockerHelper`] walks and prunes the legacy tree
//! with a session-scoped listing cache; [`cleaner`] holds the
//! per-backend cleanup contract; the fan-out entry points below walk
//! whole subdomains concurrently and fail the purge if any region's
//! walk fails — a half-completed purge must not report success.

pub mod cleaner;
pub mod docker;
pub mod error;

pub use cleaner::{
    ArtifactRegistryCleaner, Cleaner, ContainerRegistryCleaner, SUBDOMAINS, escape_package_name,
    subdomain_for_region,
};
pub use docker::DockerHelper;
pub use error::{ArtifactError, ArtifactResult};

use futures::future::join_all;

/// Registry paths holding build artifacts for the project: one per
/// given region, or every child under each subdomain root when no
/// regions are specified. Subdomains are walked concurrently.
pub async fn list_artifact_paths(
    helper: &DockerHelper,
    project: &str,
    regions: Option<&[String]>,
) -> ArtifactResult<Vec<String>> {
    let walks = SUBDOMAINS.iter().map(|subdomain| async move {
        let root = format!("{subdomain}/{project}/functions");
        match regions {
            Some(regions) => Ok::<Vec<String>, ArtifactError>(regions
                .iter()
                .filter(|region| subdomain_for_region(region) == *subdomain)
                .map(|region| format!("{root}/{region}"))
                .collect::<Vec<_>>()),
            None => {
                let listing = helper.ls(&root).await?;
                Ok(listing
                    .children
                    .iter()
                    .map(|child| format!("{root}/{child}"))
                    .collect())
            }
        }
    });

    let mut paths = Vec::new();
    for result in join_all(walks).await {
        paths.extend(result?);
    }
    Ok(paths)
}

/// Delete every artifact tree found by [`list_artifact_paths`].
///
/// All trees are removed concurrently; any single failure fails the
/// whole purge.
pub async fn delete_artifacts(
    helper: &DockerHelper,
    project: &str,
    regions: Option<&[String]>,
) -> ArtifactResult<()> {
    let paths = list_artifact_paths(helper, project, regions).await?;
    let results = join_all(paths.iter().map(|path| helper.rm(path))).await;
    for result in results {
        result?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use fnsync_cloud::PathListing;
    use fnsync_cloud::memory::MemoryContainerRegistry;
    use fnsync_core::config::RetryConfig;

    fn quick_retry() -> RetryConfig {
        RetryConfig {
            attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    fn leaf(tags: &[&str], digests: &[&str]) -> PathListing {
        PathListing {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            digests: digests.iter().map(|d| d.to_string()).collect(),
            children: Vec::new(),
        }
    }

    #[tokio::test]
    async fn walks_subdomain_roots_when_no_regions_given() {
        let registry = Arc::new(MemoryContainerRegistry::new());
        registry.seed(
            "us/p/functions",
            PathListing {
                tags: Vec::new(),
                digests: Vec::new(),
                children: vec!["us-central1".to_string(), "us-east1".to_string()],
            },
        );
        registry.seed(
            "eu/p/functions",
            PathListing {
                tags: Vec::new(),
                digests: Vec::new(),
                children: vec!["europe-west1".to_string()],
            },
        );
        let helper = DockerHelper::new(registry, quick_retry());

        let mut paths = list_artifact_paths(&helper, "p", None).await.unwrap();
        paths.sort();
        assert_eq!(
            paths,
            [
                "eu/p/functions/europe-west1",
                "us/p/functions/us-central1",
                "us/p/functions/us-east1",
            ]
        );
    }

    #[tokio::test]
    async fn regions_map_to_their_subdomains() {
        let registry = Arc::new(MemoryContainerRegistry::new());
        let helper = DockerHelper::new(registry, quick_retry());
        let regions = vec!["europe-west1".to_string(), "us-central1".to_string()];

        let mut paths = list_artifact_paths(&helper, "p", Some(&regions)).await.unwrap();
        paths.sort();
        assert_eq!(
            paths,
            ["eu/p/functions/europe-west1", "us/p/functions/us-central1"]
        );
    }

    #[tokio::test]
    async fn one_failed_walk_fails_the_purge() {
        let registry = Arc::new(MemoryContainerRegistry::new());
        registry.seed(
            "us/p/functions",
            PathListing {
                tags: Vec::new(),
                digests: Vec::new(),
                children: vec!["us-central1".to_string()],
            },
        );
        registry.seed("us/p/functions/us-central1", leaf(&["t1"], &["d1"]));
        // Deleting the eu root listing fails hard on every attempt.
        registry.fail("ls eu/p/functions", 403, 0);
        let helper = DockerHelper::new(registry, quick_retry());

        assert!(delete_artifacts(&helper, "p", None).await.is_err());
    }

    #[tokio::test]
    async fn purge_removes_every_region_tree() {
        let registry = Arc::new(MemoryContainerRegistry::new());
        registry.seed(
            "us/p/functions",
            PathListing {
                tags: Vec::new(),
                digests: Vec::new(),
                children: vec!["us-central1".to_string()],
            },
        );
        registry.seed("us/p/functions/us-central1", leaf(&["t1"], &["d1"]));
        let helper = DockerHelper::new(registry.clone(), quick_retry());

        delete_artifacts(&helper, "p", None).await.unwrap();

        let listing = registry.listing("us/p/functions/us-central1").unwrap();
        assert!(listing.tags.is_empty());
        assert!(listing.digests.is_empty());
    }
}
