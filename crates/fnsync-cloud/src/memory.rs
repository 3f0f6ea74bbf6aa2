//! In-memory implementations of every collaborator contract.
//!
//! Used across the workspace's tests: deterministic, no network, and
//! failures scriptable per call site. `fail("create <key>", 429, 2)`
//! makes the next two matching calls fail with a 429; a count of zero
//! keeps failing forever.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use fnsync_core::Endpoint;

use crate::analytics::AnalyticsSink;
use crate::error::{ApiError, ApiResult};
use crate::functions::{FunctionsClient, OperationHandle, OperationPoller};
use crate::policy::IamPolicy;
use crate::prompt::Prompter;
use crate::registry::{ArtifactRegistryClient, ContainerRegistryClient, PathListing};
use crate::resourcemanager::ResourceManagerClient;
use crate::secrets::{Secret, SecretVersion, SecretVersionState, SecretsClient};

#[derive(Debug, Clone)]
struct FailPlan {
    status: u16,
    /// Remaining failures; 0 means unlimited.
    remaining: u32,
}

#[derive(Debug, Default)]
struct Failures {
    plans: HashMap<String, FailPlan>,
}

impl Failures {
    fn arm(&mut self, op: &str, status: u16, times: u32) {
        self.plans.insert(
            op.to_string(),
            FailPlan {
                status,
                remaining: times,
            },
        );
    }

    fn check(&mut self, op: &str) -> ApiResult<()> {
        let Some(plan) = self.plans.get_mut(op) else {
            return Ok(());
        };
        let status = plan.status;
        if plan.remaining > 0 {
            plan.remaining -= 1;
            if plan.remaining == 0 {
                self.plans.remove(op);
            }
        }
        Err(ApiError::with_status(status, format!("{op}: scripted failure")))
    }
}

// ---------------------------------------------------------------------------
// Deployment API

#[derive(Default)]
struct FunctionsState {
    functions: BTreeMap<String, Endpoint>,
    policies: BTreeMap<String, IamPolicy>,
    failures: Failures,
    calls: Vec<String>,
}

/// In-memory deployment API.
#[derive(Default)]
pub struct MemoryFunctions {
    inner: Mutex<FunctionsState>,
}

impl MemoryFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, endpoints: impl IntoIterator<Item = Endpoint>) {
        let mut inner = self.inner.lock().unwrap();
        for ep in endpoints {
            inner.functions.insert(ep.key(), ep);
        }
    }

    pub fn fail(&self, op: &str, status: u16, times: u32) {
        self.inner.lock().unwrap().failures.arm(op, status, times);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().unwrap().functions.contains_key(key)
    }

    pub fn function(&self, key: &str) -> Option<Endpoint> {
        self.inner.lock().unwrap().functions.get(key).cloned()
    }

    pub fn policy(&self, key: &str) -> Option<IamPolicy> {
        self.inner.lock().unwrap().policies.get(key).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl FunctionsClient for MemoryFunctions {
    async fn create_function(&self, endpoint: &Endpoint) -> ApiResult<OperationHandle> {
        let mut inner = self.inner.lock().unwrap();
        let key = endpoint.key();
        inner.calls.push(format!("create {key}"));
        inner.failures.check(&format!("create {key}"))?;
        inner.functions.insert(key, endpoint.clone());
        Ok(OperationHandle::completed())
    }

    async fn update_function(&self, endpoint: &Endpoint) -> ApiResult<OperationHandle> {
        let mut inner = self.inner.lock().unwrap();
        let key = endpoint.key();
        inner.calls.push(format!("update {key}"));
        inner.failures.check(&format!("update {key}"))?;
        inner.functions.insert(key, endpoint.clone());
        Ok(OperationHandle::completed())
    }

    async fn delete_function(&self, key: &str) -> ApiResult<OperationHandle> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(format!("delete {key}"));
        inner.failures.check(&format!("delete {key}"))?;
        inner.functions.remove(key);
        Ok(OperationHandle::completed())
    }

    async fn list_functions(&self, project: &str) -> ApiResult<Vec<Endpoint>> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("list".to_string());
        inner.failures.check("list")?;
        Ok(inner
            .functions
            .values()
            .filter(|e| e.project == project)
            .cloned()
            .collect())
    }

    async fn get_function_iam_policy(&self, key: &str) -> ApiResult<IamPolicy> {
        let mut inner = self.inner.lock().unwrap();
        inner.failures.check(&format!("getIamPolicy {key}"))?;
        Ok(inner.policies.get(key).cloned().unwrap_or_default())
    }

    async fn set_function_iam_policy(
        &self,
        key: &str,
        policy: &IamPolicy,
        _update_mask: &[&str],
    ) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(format!("setIamPolicy {key}"));
        inner.failures.check(&format!("setIamPolicy {key}"))?;
        inner.policies.insert(key.to_string(), policy.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Project IAM API

#[derive(Default)]
struct ResourceManagerState {
    policy: IamPolicy,
    failures: Failures,
    get_calls: u32,
    set_calls: u32,
    last_mask: Vec<String>,
}

/// In-memory project IAM API holding one policy.
#[derive(Default)]
pub struct MemoryResourceManager {
    inner: Mutex<ResourceManagerState>,
}

impl MemoryResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_policy(&self, policy: IamPolicy) {
        self.inner.lock().unwrap().policy = policy;
    }

    pub fn policy(&self) -> IamPolicy {
        self.inner.lock().unwrap().policy.clone()
    }

    pub fn fail(&self, op: &str, status: u16, times: u32) {
        self.inner.lock().unwrap().failures.arm(op, status, times);
    }

    pub fn get_calls(&self) -> u32 {
        self.inner.lock().unwrap().get_calls
    }

    pub fn set_calls(&self) -> u32 {
        self.inner.lock().unwrap().set_calls
    }

    pub fn last_mask(&self) -> Vec<String> {
        self.inner.lock().unwrap().last_mask.clone()
    }
}

#[async_trait]
impl ResourceManagerClient for MemoryResourceManager {
    async fn get_iam_policy(&self, _project_number: u64) -> ApiResult<IamPolicy> {
        let mut inner = self.inner.lock().unwrap();
        inner.get_calls += 1;
        inner.failures.check("getIamPolicy")?;
        Ok(inner.policy.clone())
    }

    async fn set_iam_policy(
        &self,
        _project_number: u64,
        policy: &IamPolicy,
        update_mask: &[&str],
    ) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.set_calls += 1;
        inner.failures.check("setIamPolicy")?;
        inner.policy = policy.clone();
        inner.last_mask = update_mask.iter().map(|m| m.to_string()).collect();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Secret storage API

#[derive(Default)]
struct SecretsState {
    secrets: BTreeMap<(String, String), Secret>,
    versions: BTreeMap<(String, String), Vec<SecretVersion>>,
    failures: Failures,
}

/// In-memory secret store.
#[derive(Default)]
pub struct MemorySecrets {
    inner: Mutex<SecretsState>,
}

impl MemorySecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_secret(&self, secret: Secret) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .secrets
            .insert((secret.project_id.clone(), secret.name.clone()), secret);
    }

    pub fn seed_version(&self, project: &str, name: &str, version_id: &str, state: SecretVersionState) {
        let mut inner = self.inner.lock().unwrap();
        let secret = inner
            .secrets
            .get(&(project.to_string(), name.to_string()))
            .cloned()
            .expect("seed the secret before its versions");
        inner
            .versions
            .entry((project.to_string(), name.to_string()))
            .or_default()
            .push(SecretVersion {
                secret,
                version_id: version_id.to_string(),
                state,
            });
    }

    pub fn fail(&self, op: &str, status: u16, times: u32) {
        self.inner.lock().unwrap().failures.arm(op, status, times);
    }

    pub fn secret(&self, project: &str, name: &str) -> Option<Secret> {
        self.inner
            .lock()
            .unwrap()
            .secrets
            .get(&(project.to_string(), name.to_string()))
            .cloned()
    }

    pub fn version_state(&self, project: &str, name: &str, version: &str) -> Option<SecretVersionState> {
        self.inner
            .lock()
            .unwrap()
            .versions
            .get(&(project.to_string(), name.to_string()))
            .and_then(|vs| vs.iter().find(|v| v.version_id == version))
            .map(|v| v.state)
    }
}

/// Latest = highest numeric version id, matching the registry's alias.
fn latest_of(versions: &[SecretVersion]) -> Option<&SecretVersion> {
    versions
        .iter()
        .max_by_key(|v| v.version_id.parse::<u64>().unwrap_or(0))
}

#[async_trait]
impl SecretsClient for MemorySecrets {
    async fn get_secret(&self, project: &str, name: &str) -> ApiResult<Secret> {
        let mut inner = self.inner.lock().unwrap();
        inner.failures.check(&format!("get_secret {name}"))?;
        inner
            .secrets
            .get(&(project.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("secret {name}")))
    }

    async fn create_secret(
        &self,
        project: &str,
        name: &str,
        labels: BTreeMap<String, String>,
    ) -> ApiResult<Secret> {
        let mut inner = self.inner.lock().unwrap();
        inner.failures.check(&format!("create_secret {name}"))?;
        let secret = Secret {
            project_id: project.to_string(),
            name: name.to_string(),
            labels,
        };
        inner
            .secrets
            .insert((project.to_string(), name.to_string()), secret.clone());
        Ok(secret)
    }

    async fn patch_secret(
        &self,
        project: &str,
        name: &str,
        labels: BTreeMap<String, String>,
    ) -> ApiResult<Secret> {
        let mut inner = self.inner.lock().unwrap();
        inner.failures.check(&format!("patch_secret {name}"))?;
        let secret = inner
            .secrets
            .get_mut(&(project.to_string(), name.to_string()))
            .ok_or_else(|| ApiError::not_found(format!("secret {name}")))?;
        secret.labels = labels;
        Ok(secret.clone())
    }

    async fn get_secret_version(
        &self,
        project: &str,
        name: &str,
        version: &str,
    ) -> ApiResult<SecretVersion> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .failures
            .check(&format!("get_secret_version {name}/{version}"))?;
        let versions = inner
            .versions
            .get(&(project.to_string(), name.to_string()))
            .ok_or_else(|| ApiError::not_found(format!("secret {name}")))?;
        let found = if version == "latest" {
            latest_of(versions)
        } else {
            versions.iter().find(|v| v.version_id == version)
        };
        found
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("version {version} of secret {name}")))
    }

    async fn list_secrets(&self, project: &str) -> ApiResult<Vec<Secret>> {
        let mut inner = self.inner.lock().unwrap();
        inner.failures.check("list_secrets")?;
        Ok(inner
            .secrets
            .values()
            .filter(|s| s.project_id == project)
            .cloned()
            .collect())
    }

    async fn list_secret_versions(
        &self,
        project: &str,
        name: &str,
    ) -> ApiResult<Vec<SecretVersion>> {
        let mut inner = self.inner.lock().unwrap();
        inner.failures.check(&format!("list_secret_versions {name}"))?;
        Ok(inner
            .versions
            .get(&(project.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn destroy_secret_version(
        &self,
        project: &str,
        name: &str,
        version: &str,
    ) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.failures.check(&format!("destroy {name}/{version}"))?;
        let versions = inner
            .versions
            .get_mut(&(project.to_string(), name.to_string()))
            .ok_or_else(|| ApiError::not_found(format!("secret {name}")))?;
        let found = versions
            .iter_mut()
            .find(|v| v.version_id == version)
            .ok_or_else(|| ApiError::not_found(format!("version {version} of secret {name}")))?;
        found.state = SecretVersionState::Destroyed;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Registries

#[derive(Default)]
struct ContainerRegistryState {
    paths: BTreeMap<String, PathListing>,
    failures: Failures,
    deletions: Vec<String>,
    list_counts: HashMap<String, u32>,
}

/// In-memory legacy container registry with a deletion-order journal.
#[derive(Default)]
pub struct MemoryContainerRegistry {
    inner: Mutex<ContainerRegistryState>,
}

impl MemoryContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, path: &str, listing: PathListing) {
        self.inner
            .lock()
            .unwrap()
            .paths
            .insert(path.to_string(), listing);
    }

    pub fn fail(&self, op: &str, status: u16, times: u32) {
        self.inner.lock().unwrap().failures.arm(op, status, times);
    }

    /// Deletions in the order they were issued, as `"tag <path> <tag>"`
    /// and `"digest <path> <digest>"` entries.
    pub fn deletions(&self) -> Vec<String> {
        self.inner.lock().unwrap().deletions.clone()
    }

    pub fn list_count(&self, path: &str) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .list_counts
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn listing(&self, path: &str) -> Option<PathListing> {
        self.inner.lock().unwrap().paths.get(path).cloned()
    }
}

#[async_trait]
impl ContainerRegistryClient for MemoryContainerRegistry {
    async fn list_path(&self, path: &str) -> ApiResult<PathListing> {
        let mut inner = self.inner.lock().unwrap();
        *inner.list_counts.entry(path.to_string()).or_insert(0) += 1;
        inner.failures.check(&format!("ls {path}"))?;
        Ok(inner.paths.get(path).cloned().unwrap_or_default())
    }

    async fn delete_tag(&self, path: &str, tag: &str) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.failures.check(&format!("delete_tag {path}:{tag}"))?;
        let listing = inner
            .paths
            .get_mut(path)
            .ok_or_else(|| ApiError::not_found(format!("path {path}")))?;
        if !listing.tags.iter().any(|t| t == tag) {
            return Err(ApiError::not_found(format!("tag {tag} at {path}")));
        }
        listing.tags.retain(|t| t != tag);
        inner.deletions.push(format!("tag {path} {tag}"));
        Ok(())
    }

    async fn delete_image(&self, path: &str, digest: &str) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.failures.check(&format!("delete_image {path}:{digest}"))?;
        let listing = inner
            .paths
            .get_mut(path)
            .ok_or_else(|| ApiError::not_found(format!("path {path}")))?;
        if !listing.digests.iter().any(|d| d == digest) {
            return Err(ApiError::not_found(format!("digest {digest} at {path}")));
        }
        listing.digests.retain(|d| d != digest);
        inner.deletions.push(format!("digest {path} {digest}"));
        Ok(())
    }
}

#[derive(Default)]
struct ArtifactRegistryState {
    deleted: Vec<String>,
    failures: Failures,
    pending: HashMap<String, String>,
}

/// In-memory artifact registry recording package deletes.
#[derive(Default)]
pub struct MemoryArtifactRegistry {
    inner: Mutex<ArtifactRegistryState>,
}

impl MemoryArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, op: &str, status: u16, times: u32) {
        self.inner.lock().unwrap().failures.arm(op, status, times);
    }

    /// Make the next delete of `package_path` return a pending
    /// operation with the given name instead of completing inline.
    pub fn defer(&self, package_path: &str, operation_name: &str) {
        self.inner
            .lock()
            .unwrap()
            .pending
            .insert(package_path.to_string(), operation_name.to_string());
    }

    pub fn deleted(&self) -> Vec<String> {
        self.inner.lock().unwrap().deleted.clone()
    }
}

#[async_trait]
impl ArtifactRegistryClient for MemoryArtifactRegistry {
    async fn delete_package(&self, package_path: &str) -> ApiResult<OperationHandle> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .failures
            .check(&format!("delete_package {package_path}"))?;
        inner.deleted.push(package_path.to_string());
        if let Some(name) = inner.pending.remove(package_path) {
            return Ok(OperationHandle::pending(&name));
        }
        Ok(OperationHandle::completed())
    }
}

/// Poller resolving operations from a scripted table (absent = success).
#[derive(Default)]
pub struct MemoryPoller {
    outcomes: Mutex<HashMap<String, u16>>,
    waited: Mutex<Vec<String>>,
}

impl MemoryPoller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_operation(&self, name: &str, status: u16) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(name.to_string(), status);
    }

    pub fn waited(&self) -> Vec<String> {
        self.waited.lock().unwrap().clone()
    }
}

#[async_trait]
impl OperationPoller for MemoryPoller {
    async fn wait(&self, operation: OperationHandle) -> ApiResult<()> {
        self.waited.lock().unwrap().push(operation.name.clone());
        if let Some(status) = self.outcomes.lock().unwrap().get(&operation.name) {
            return Err(ApiError::with_status(
                *status,
                format!("operation {} failed", operation.name),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Prompting and analytics

/// Prompter answering from a queue; empty queue answers no.
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<bool>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn confirm(&self, message: &str) -> bool {
        self.asked.lock().unwrap().push(message.to_string());
        self.answers.lock().unwrap().pop_front().unwrap_or(false)
    }
}

/// Sink capturing every tracked event.
#[derive(Default)]
pub struct CapturingAnalytics {
    events: Mutex<Vec<(String, BTreeMap<String, String>)>>,
}

impl CapturingAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, BTreeMap<String, String>)> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_named(&self, name: &str) -> Vec<BTreeMap<String, String>> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, params)| params.clone())
            .collect()
    }
}

impl AnalyticsSink for CapturingAnalytics {
    fn track(&self, event: &str, params: &BTreeMap<String, String>) {
        self.events
            .lock()
            .unwrap()
            .push((event.to_string(), params.clone()));
    }
}
