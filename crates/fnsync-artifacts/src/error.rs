//! Artifact cleaner error types.

use thiserror::Error;

use fnsync_cloud::ApiError;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to list registry path {path}")]
    List {
        path: String,
        #[source]
        cause: ApiError,
    },

    #[error("failed to delete {what} at {path}")]
    Delete {
        path: String,
        what: String,
        #[source]
        cause: ApiError,
    },

    #[error(transparent)]
    Api(#[from] ApiError),
}

pub type ArtifactResult<T> = Result<T, ArtifactError>;
