//! Validator error types.

use thiserror::Error;

/// One endpoint-level rule violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub key: String,
    pub reason: String,
}

/// One identity key claimed by more than one codebase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateKey {
    pub key: String,
    pub codebases: Vec<String>,
}

/// One secret reference that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretFailure {
    pub project_id: String,
    pub secret: String,
    pub reason: String,
}

/// Errors raised before any side effect occurs.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid function ids: {}", ids.join(", "))]
    InvalidIds { ids: Vec<String> },

    #[error("invalid endpoint configuration:\n{}", render_violations(violations))]
    InvalidEndpoints { violations: Vec<Violation> },

    #[error("endpoint ids must be unique across codebases:\n{}", render_duplicates(conflicts))]
    DuplicateEndpoints { conflicts: Vec<DuplicateKey> },

    #[error("invalid secret references:\n{}", render_secret_failures(failures))]
    InvalidSecrets { failures: Vec<SecretFailure> },
}

pub type ValidationResult<T> = Result<T, ValidationError>;

fn render_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("  {}: {}", v.key, v.reason))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_duplicates(conflicts: &[DuplicateKey]) -> String {
    conflicts
        .iter()
        .map(|c| format!("  {} claimed by codebases: {}", c.key, c.codebases.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_secret_failures(failures: &[SecretFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("  {}/{}: {}", f.project_id, f.secret, f.reason))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_display_lists_every_entry() {
        let err = ValidationError::InvalidEndpoints {
            violations: vec![
                Violation {
                    key: "projects/p/locations/r/functions/a".to_string(),
                    reason: "needs 2 CPUs".to_string(),
                },
                Violation {
                    key: "projects/p/locations/r/functions/b".to_string(),
                    reason: "empty schedule".to_string(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("functions/a: needs 2 CPUs"));
        assert!(text.contains("functions/b: empty schedule"));
    }
}
