//! fnsync-core — shared model for the FnSync reconciler.
//!
//! Holds the wanted-state data model (endpoints, backends, triggers),
//! the TOML reconciler configuration, and the bounded backoff helper
//! used wherever FnSync retries a remote call.
//!
//! Everything here is pure data: no crate in this workspace performs
//! network I/O except through the collaborator traits in `fnsync-cloud`.

pub mod backoff;
pub mod config;
pub mod types;

pub use backoff::Backoff;
pub use config::{ApplyConfig, CleanupConfig, PromptConfig, ReconcilerConfig, RetryConfig};
pub use types::*;
