//! fnsync-release — applying a planned changeset against the
//! deployment API.
//!
//! The executor fans per-endpoint create/update/delete calls out with
//! bounded concurrency and isolates failures per endpoint: one broken
//! function never prevents its siblings from being attempted. Deletes
//! run after upserts so a delete paired with a failed replacement can
//! be aborted instead of removing a resource whose successor never
//! materialized. The reporter classifies and renders what happened.

pub mod error;
pub mod executor;
pub mod plan;
pub mod reporter;

pub use error::{DeploymentError, OperationType};
pub use executor::{DeploymentResult, Executor};
pub use plan::{Changeset, EndpointUpdate, plan_changes};
pub use reporter::{Outcome, Summary, log_and_track_deploy_stats, report_errors};
