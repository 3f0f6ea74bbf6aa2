//! API error type and cause-chain classification.

use std::error::Error;

use thiserror::Error;

/// Error surfaced by any collaborator client.
///
/// Carries the HTTP-ish status when the transport exposed one, and the
/// underlying cause when there is something worth keeping. Errors from
/// higher layers wrap an `ApiError` as their `source`, so
/// [`status_of`] can find the status no matter how deep it sits.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: Option<u16>,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn Error + Send + Sync>>,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a transport-level failure, keeping its chain intact.
    pub fn transport(status: Option<u16>, message: impl Into<String>, cause: anyhow::Error) -> Self {
        Self {
            status,
            message: message.into(),
            source: Some(cause.into()),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::with_status(404, format!("{} not found", what.into()))
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

/// Walk a cause chain looking for an HTTP-ish status code.
///
/// Historically several wrapper shapes accumulated around transport
/// errors; this is the one well-defined walk that replaces them. The
/// first frame exposing a status wins.
pub fn status_of(err: &(dyn Error + 'static)) -> Option<u16> {
    let mut current: Option<&(dyn Error + 'static)> = Some(err);
    while let Some(frame) = current {
        if let Some(api) = frame.downcast_ref::<ApiError>() {
            if let Some(status) = api.status {
                return Some(status);
            }
        }
        current = frame.source();
    }
    None
}

/// Whether any frame in the cause chain exposes a quota (429) or
/// conflict (409) status.
pub fn is_quota_or_conflict(err: &(dyn Error + 'static)) -> bool {
    matches!(status_of(err), Some(429) | Some(409))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("outer: {0}")]
    struct Outer(#[source] ApiError);

    #[derive(Debug, Error)]
    #[error("middle")]
    struct Middle(#[source] Outer);

    #[test]
    fn finds_status_through_nesting() {
        let err = Middle(Outer(ApiError::with_status(429, "quota exceeded")));
        assert_eq!(status_of(&err), Some(429));
        assert!(is_quota_or_conflict(&err));
    }

    #[test]
    fn conflict_counts_as_quota_class() {
        let err = Outer(ApiError::with_status(409, "operation in progress"));
        assert!(is_quota_or_conflict(&err));
    }

    #[test]
    fn no_status_anywhere() {
        let err = Outer(ApiError::new("socket closed"));
        assert_eq!(status_of(&err), None);
        assert!(!is_quota_or_conflict(&err));
    }

    #[test]
    fn plain_500_is_not_quota() {
        let err = ApiError::with_status(500, "backend error");
        assert!(!is_quota_or_conflict(&err));
    }

    #[test]
    fn first_status_in_chain_wins() {
        let inner = ApiError::with_status(429, "quota");
        let outer = ApiError {
            status: Some(500),
            message: "wrapped".to_string(),
            source: Some(Box::new(inner)),
        };
        assert_eq!(status_of(&outer), Some(500));
    }
}
