//! fnsync-iam — service-agent IAM provisioning.
//!
//! Certain event trigger types only deliver once provider-managed
//! service agents hold specific roles on the project. This crate works
//! out which grants a release newly requires, merges them into the
//! project policy, and writes the policy back, touching the IAM API
//! only when a genuinely new trigger kind appears.

pub mod bindings;
pub mod error;
pub mod provision;

pub use bindings::{ServiceAgentKind, bindings_for, service_agent_kinds};
pub use error::{IamError, IamResult};
pub use provision::{ensure_service_agent_roles, merge_bindings};
