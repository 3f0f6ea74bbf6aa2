//! Cached registry tree walker.
//!
//! One `DockerHelper` owns a session-scoped listing cache keyed by
//! path: a path is fetched at most once per run and never invalidated
//! mid-run, so concurrent deletes over already-fetched sibling
//! subtrees cannot race. The cache is authoritative for "what's left"
//! during removal: a retried `rm` never re-deletes a tag or digest it
//! already removed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, join_all};
use tracing::debug;

use fnsync_cloud::{ApiError, ApiResult, ContainerRegistryClient, PathListing};
use fnsync_core::Backoff;
use fnsync_core::config::RetryConfig;

use crate::error::{ArtifactError, ArtifactResult};

/// Failures worth retrying: network-level errors with no status,
/// quota/conflict, and server-side 5xx.
fn is_transient(err: &ApiError) -> bool {
    match err.status {
        None | Some(429) | Some(409) => true,
        Some(status) => status >= 500,
    }
}

#[derive(Clone, Copy)]
enum Entry {
    Tag,
    Digest,
}

impl Entry {
    fn label(self) -> &'static str {
        match self {
            Entry::Tag => "tag",
            Entry::Digest => "digest",
        }
    }
}

pub struct DockerHelper {
    client: Arc<dyn ContainerRegistryClient>,
    cache: Mutex<HashMap<String, PathListing>>,
    retry: RetryConfig,
}

impl DockerHelper {
    pub fn new(client: Arc<dyn ContainerRegistryClient>, retry: RetryConfig) -> Self {
        Self {
            client,
            cache: Mutex::new(HashMap::new()),
            retry,
        }
    }

    async fn with_retry<T, F, Fut>(&self, mut call: F) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ApiResult<T>> + Send,
    {
        let mut backoff = Backoff::from_config(&self.retry);
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if is_transient(&err) => match backoff.next_delay() {
                    Some(delay) => {
                        debug!(error = %err, ?delay, "transient registry failure, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(err),
                },
                Err(err) => return Err(err),
            }
        }
    }

    /// Listing for a path, fetched from the registry on first access
    /// and served from the cache thereafter.
    pub async fn ls(&self, path: &str) -> ArtifactResult<PathListing> {
        if let Some(hit) = self.cache.lock().unwrap().get(path) {
            return Ok(hit.clone());
        }
        let listing = self
            .with_retry(|| async move { self.client.list_path(path).await })
            .await
            .map_err(|cause| ArtifactError::List {
                path: path.to_string(),
                cause,
            })?;
        let mut cache = self.cache.lock().unwrap();
        Ok(cache.entry(path.to_string()).or_insert(listing).clone())
    }

    /// Remove the whole tree rooted at `path`: children depth-first,
    /// then every tag at the path, then every remaining digest — a
    /// digest with live tags cannot be deleted.
    pub async fn rm(&self, path: &str) -> ArtifactResult<()> {
        self.rm_tree(path.to_string()).await
    }

    fn rm_tree(&self, path: String) -> BoxFuture<'_, ArtifactResult<()>> {
        Box::pin(async move {
            let children = self.ls(&path).await?.children;

            let removals = children
                .iter()
                .map(|child| self.rm_tree(format!("{path}/{child}")));
            let results = join_all(removals).await;
            for (child, result) in children.iter().zip(results) {
                result?;
                self.strip_child(&path, child);
            }

            // Snapshot from the cache, not the original listing: on a
            // retried rm, items already deleted are gone from it.
            let tags = self.cached(&path).map(|l| l.tags).unwrap_or_default();
            for tag in tags {
                self.delete_entry(&path, Entry::Tag, &tag).await?;
            }

            let digests = self.cached(&path).map(|l| l.digests).unwrap_or_default();
            for digest in digests {
                self.delete_entry(&path, Entry::Digest, &digest).await?;
            }

            debug!(%path, "removed artifact tree");
            Ok(())
        })
    }

    async fn delete_entry(&self, path: &str, entry: Entry, name: &str) -> ArtifactResult<()> {
        let result = self
            .with_retry(|| async move {
                match entry {
                    Entry::Tag => self.client.delete_tag(path, name).await,
                    Entry::Digest => self.client.delete_image(path, name).await,
                }
            })
            .await;
        match result {
            Ok(()) => {}
            // Already gone remotely counts as removed.
            Err(err) if err.is_not_found() => {}
            Err(cause) => {
                return Err(ArtifactError::Delete {
                    path: path.to_string(),
                    what: format!("{} {name}", entry.label()),
                    cause,
                });
            }
        }
        let mut cache = self.cache.lock().unwrap();
        if let Some(listing) = cache.get_mut(path) {
            match entry {
                Entry::Tag => listing.tags.retain(|t| t != name),
                Entry::Digest => listing.digests.retain(|d| d != name),
            }
        }
        Ok(())
    }

    fn cached(&self, path: &str) -> Option<PathListing> {
        self.cache.lock().unwrap().get(path).cloned()
    }

    fn strip_child(&self, path: &str, child: &str) {
        let mut cache = self.cache.lock().unwrap();
        if let Some(listing) = cache.get_mut(path) {
            listing.children.retain(|c| c != child);
        }
    }
}
