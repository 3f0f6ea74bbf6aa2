//! Secret flow error types.

use thiserror::Error;

use fnsync_cloud::ApiError;

#[derive(Debug, Error)]
pub enum SecretsError {
    /// The key collides with an environment variable the runtime owns.
    #[error("{0} is a reserved environment variable and cannot hold a secret")]
    ReservedKey(String),

    /// The user declined a confirmation prompt.
    #[error("aborted: {0}")]
    Aborted(String),

    /// A prompt was required but no terminal is attached and no force
    /// flag was given.
    #[error("cannot prompt in non-interactive mode: {0} (re-run with force to proceed)")]
    NonInteractive(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

pub type SecretsResult<T> = Result<T, SecretsError>;
