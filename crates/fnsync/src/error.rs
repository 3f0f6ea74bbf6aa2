//! Pipeline error types.

use thiserror::Error;

use fnsync_artifacts::ArtifactError;
use fnsync_cloud::ApiError;
use fnsync_iam::IamError;
use fnsync_secrets::SecretsError;
use fnsync_validate::ValidationError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Iam(#[from] IamError),

    #[error(transparent)]
    Secrets(#[from] SecretsError),

    #[error(transparent)]
    Artifacts(#[from] ArtifactError),

    #[error("failed to list deployed functions")]
    Listing(#[source] ApiError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
