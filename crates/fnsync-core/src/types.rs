//! Shared types used across FnSync crates.
//!
//! The wanted state is a set of [`Backend`]s (one per codebase), each a
//! collection of [`Endpoint`]s. The have state is reconstructed from a
//! live listing call into the same shapes, so every stage of the
//! pipeline diffs and converges over one model.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Reserved label marking an HTTPS endpoint as callable.
///
/// Callable endpoints ride the HTTPS trigger on the wire; the label is
/// the only thing distinguishing them once deployed.
pub const CALLABLE_LABEL: &str = "deployment-callable";

/// Function execution generation. Gen2 unlocks concurrency and
/// fine-grained CPU; several validation rules key off this.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum PlatformVersion {
    #[default]
    Gen1,
    Gen2,
}

impl PlatformVersion {
    /// Short tag used in trigger classification and analytics ("v1"/"v2").
    pub fn tag(&self) -> &'static str {
        match self {
            PlatformVersion::Gen1 => "v1",
            PlatformVersion::Gen2 => "v2",
        }
    }
}

impl fmt::Display for PlatformVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Lifecycle phase a blocking trigger intercepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BlockingPhase {
    BeforeCreate,
    BeforeSignIn,
}

impl BlockingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockingPhase::BeforeCreate => "before-create",
            BlockingPhase::BeforeSignIn => "before-sign-in",
        }
    }
}

impl fmt::Display for BlockingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invocation mechanism for an endpoint. Exactly one per endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Trigger {
    /// Plain HTTPS endpoint; `invoker` lists the principals allowed to
    /// call it (`None` means the platform applies its public-on-create
    /// default).
    Https { invoker: Option<Vec<String>> },
    /// RPC-style endpoint invoked through the client SDK.
    Callable,
    /// Cron-style schedule.
    Scheduled {
        schedule: String,
        time_zone: Option<String>,
        retry_count: Option<u32>,
    },
    /// Queue-dispatched endpoint with optional rate limits.
    TaskQueue {
        max_dispatches_per_second: Option<f64>,
        max_concurrent_dispatches: Option<u32>,
        invoker: Option<Vec<String>>,
    },
    /// Synchronous hook into an auth lifecycle phase.
    Blocking { phase: BlockingPhase },
    /// Generic event subscription.
    Event {
        event_type: String,
        filters: BTreeMap<String, String>,
        retry: bool,
    },
}

/// CPU allocation knob.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Cpu {
    /// Explicit CPU units. Fractional below 1, whole-numbered above.
    Units(f64),
    /// Sentinel: size CPU the way generation 1 did, from memory.
    Gen1Default,
}

/// Egress routing for VPC-connected endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EgressSetting {
    PrivateRangesOnly,
    AllTraffic,
}

/// VPC connector attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpcConfig {
    pub connector: String,
    pub egress: EgressSetting,
}

/// Inbound traffic restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngressSetting {
    AllowAll,
    AllowInternalOnly,
    AllowInternalAndGclb,
}

/// One secret injected into an endpoint's environment.
///
/// `version` of `None` or `"latest"` is the symbolic alias; the secret
/// resolver pins it to a concrete version id before deploy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretEnvVar {
    /// Environment variable name the secret is exposed under.
    pub key: String,
    /// Project owning the secret (may differ from the function's).
    pub project_id: String,
    /// Secret name.
    pub secret: String,
    /// Concrete version id, or the unresolved alias.
    pub version: Option<String>,
}

impl SecretEnvVar {
    /// Whether this reference still points at the symbolic latest alias.
    pub fn is_latest(&self) -> bool {
        match self.version.as_deref() {
            None | Some("latest") => true,
            Some(_) => false,
        }
    }
}

/// One deployable function and its trigger/resource configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub project: String,
    pub region: String,
    /// Codebase this endpoint was declared in.
    pub codebase: String,
    pub platform: PlatformVersion,
    pub entry_point: String,
    pub runtime: String,
    pub memory_mb: Option<u32>,
    pub cpu: Option<Cpu>,
    pub concurrency: Option<u32>,
    pub min_instances: Option<u32>,
    pub max_instances: Option<u32>,
    pub vpc: Option<VpcConfig>,
    pub ingress: Option<IngressSetting>,
    pub service_account: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
    pub secret_env: Vec<SecretEnvVar>,
    pub trigger: Trigger,
}

impl Endpoint {
    /// Minimal endpoint for the given identity; callers fill in the rest.
    pub fn new(project: &str, region: &str, id: &str, trigger: Trigger) -> Self {
        Self {
            id: id.to_string(),
            project: project.to_string(),
            region: region.to_string(),
            codebase: "default".to_string(),
            platform: PlatformVersion::default(),
            entry_point: id.to_string(),
            runtime: String::new(),
            memory_mb: None,
            cpu: None,
            concurrency: None,
            min_instances: None,
            max_instances: None,
            vpc: None,
            ingress: None,
            service_account: None,
            labels: BTreeMap::new(),
            env: BTreeMap::new(),
            secret_env: Vec::new(),
            trigger,
        }
    }

    /// Fully-qualified identity key. Unique across the whole wanted state.
    pub fn key(&self) -> String {
        format!(
            "projects/{}/locations/{}/functions/{}",
            self.project, self.region, self.id
        )
    }

    /// Whether the reserved callable label is set.
    pub fn is_callable(&self) -> bool {
        matches!(self.trigger, Trigger::Callable)
            || self.labels.get(CALLABLE_LABEL).map(String::as_str) == Some("true")
    }

    /// Classification tag combining platform generation and trigger kind.
    ///
    /// Generic events report their raw event type; callable is detected
    /// via the reserved label, not the trigger shape alone.
    pub fn trigger_tag(&self) -> String {
        let kind = if self.is_callable() {
            "callable".to_string()
        } else {
            match &self.trigger {
                Trigger::Https { .. } | Trigger::Callable => "https".to_string(),
                Trigger::Scheduled { .. } => "scheduled".to_string(),
                Trigger::TaskQueue { .. } => "taskQueue".to_string(),
                Trigger::Blocking { .. } => "blocking".to_string(),
                Trigger::Event { event_type, .. } => event_type.clone(),
            }
        };
        format!("{}.{}", self.platform.tag(), kind)
    }

    /// Whether any secret env var references the given secret.
    pub fn references_secret(&self, project_id: &str, secret: &str) -> bool {
        self.secret_env
            .iter()
            .any(|s| s.project_id == project_id && s.secret == secret)
    }
}

/// A named collection of endpoints plus the upstream APIs they need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backend {
    pub codebase: String,
    /// Endpoints keyed by [`Endpoint::key`].
    pub endpoints: BTreeMap<String, Endpoint>,
    pub required_apis: BTreeSet<String>,
}

impl Backend {
    /// Empty backend for a codebase.
    pub fn empty(codebase: &str) -> Self {
        Self {
            codebase: codebase.to_string(),
            endpoints: BTreeMap::new(),
            required_apis: BTreeSet::new(),
        }
    }

    /// Backend from a list of endpoints (codebase taken from the first,
    /// "default" when empty).
    pub fn of(endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        let mut backend = Backend::empty("default");
        let mut endpoints = endpoints.into_iter();
        if let Some(first) = endpoints.next() {
            backend.codebase = first.codebase.clone();
            backend.insert(first);
        }
        for ep in endpoints {
            backend.insert(ep);
        }
        backend
    }

    pub fn insert(&mut self, endpoint: Endpoint) {
        self.endpoints.insert(endpoint.key(), endpoint);
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.values()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// All endpoints across a set of backends.
pub fn all_endpoints(backends: &[Backend]) -> Vec<&Endpoint> {
    backends.iter().flat_map(|b| b.endpoints()).collect()
}

/// Merge backends into one. Later codebases win on key collisions, so
/// run uniqueness validation first.
pub fn merge_backends(backends: Vec<Backend>) -> Backend {
    let mut merged = Backend::empty("merged");
    for backend in backends {
        merged.required_apis.extend(backend.required_apis);
        for (_, ep) in backend.endpoints {
            merged.insert(ep);
        }
    }
    merged
}
