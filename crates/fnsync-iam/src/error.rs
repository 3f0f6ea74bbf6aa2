//! Provisioner error types.

use thiserror::Error;

use fnsync_cloud::ApiError;

#[derive(Debug, Error)]
pub enum IamError {
    /// The policy write failed. Fatal: deploying with a partially
    /// granted role set would misbehave later in ways the user cannot
    /// see from the deploy output.
    #[error("failed to write project IAM policy")]
    PolicyWrite(#[source] ApiError),
}

pub type IamResult<T> = Result<T, IamError>;
