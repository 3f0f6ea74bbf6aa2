//! fnsync — converge declared serverless function deployments against
//! a live cloud project.
//!
//! The [`pipeline::Pipeline`] drives the stages in dependency order:
//! validate, resolve secret references, grant service-agent roles,
//! apply the changeset, report, prune orphaned secret versions, and
//! clean stale build artifacts in the background.

pub mod error;
pub mod pipeline;

pub use error::{PipelineError, PipelineResult};
pub use pipeline::{Clients, Pipeline};
