//! fnsync-cloud — collaborator contracts for the FnSync reconciler.
//!
//! The reconciler performs every side effect through the traits in this
//! crate: the deployment API, the project IAM API, the secret store, the
//! two registry backends, the long-running-operation poller, the
//! confirmation prompt, and the reporting sinks. Implementations own
//! transport, auth, and timeouts; the core only sees [`ApiError`]s.
//!
//! [`memory`] provides in-memory implementations of every contract with
//! scriptable failures, used throughout the workspace's tests.

pub mod analytics;
pub mod error;
pub mod functions;
pub mod memory;
pub mod policy;
pub mod prompt;
pub mod registry;
pub mod resourcemanager;
pub mod secrets;

pub use analytics::{AnalyticsSink, NoopAnalytics};
pub use error::{ApiError, ApiResult, is_quota_or_conflict, status_of};
pub use functions::{FunctionsClient, OperationHandle, OperationPoller};
pub use policy::{Binding, IamPolicy};
pub use prompt::{Prompter, StaticPrompter};
pub use registry::{ArtifactRegistryClient, ContainerRegistryClient, PathListing};
pub use resourcemanager::ResourceManagerClient;
pub use secrets::{Secret, SecretVersion, SecretVersionState, SecretsClient};
