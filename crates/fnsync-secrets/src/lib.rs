//! fnsync-secrets — secret lifecycle around a release.
//!
//! Before deploy, keys are canonicalized and secrets created or
//! adopted. After deploy, versions no longer referenced by any
//! endpoint are destroyed, one at a time, so a single stuck version
//! never blocks the rest of the batch.

pub mod error;
pub mod keys;
pub mod prune;
pub mod store;

pub use error::{SecretsError, SecretsResult};
pub use keys::ensure_valid_key;
pub use prune::{PruneOutcome, VersionRef, prune_and_destroy_secrets, prune_secrets};
pub use store::{MANAGED_LABEL, ensure_secret, update_endpoint_secret};
