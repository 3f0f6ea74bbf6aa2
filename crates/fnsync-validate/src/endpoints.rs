//! Whole-backend validation: per-endpoint rules plus cross-codebase
//! uniqueness.

use std::collections::BTreeMap;

use fnsync_core::Backend;

use crate::error::{DuplicateKey, ValidationError, ValidationResult, Violation};
use crate::resources::validate_resources;
use crate::triggers::{duplicate_blocking_phases, validate_trigger};

/// Validate every endpoint in the backend, aggregating all violations.
pub fn endpoints_are_valid(backend: &Backend) -> ValidationResult<()> {
    let mut violations = Vec::new();

    for endpoint in backend.endpoints() {
        if let Err(reason) = validate_trigger(endpoint) {
            violations.push(Violation {
                key: endpoint.key(),
                reason,
            });
        }
        if let Err(reason) = validate_resources(endpoint) {
            violations.push(Violation {
                key: endpoint.key(),
                reason,
            });
        }
    }

    let endpoints: Vec<_> = backend.endpoints().collect();
    for (phase, keys) in duplicate_blocking_phases(&endpoints) {
        for key in keys {
            violations.push(Violation {
                key,
                reason: format!("only one blocking endpoint may handle the {phase} phase"),
            });
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::InvalidEndpoints { violations })
    }
}

/// Endpoint identity must be unique across all codebases, not just
/// within one.
pub fn endpoints_are_unique(backends: &[Backend]) -> ValidationResult<()> {
    let mut claimants: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for backend in backends {
        for key in backend.endpoints.keys() {
            claimants
                .entry(key.clone())
                .or_default()
                .push(backend.codebase.clone());
        }
    }

    let conflicts: Vec<DuplicateKey> = claimants
        .into_iter()
        .filter(|(_, codebases)| codebases.len() > 1)
        .map(|(key, codebases)| DuplicateKey { key, codebases })
        .collect();

    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::DuplicateEndpoints { conflicts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fnsync_core::{Endpoint, Trigger};

    fn backend(codebase: &str, ids: &[&str]) -> Backend {
        let mut backend = Backend::empty(codebase);
        for id in ids {
            backend.insert(Endpoint::new("p", "r1", id, Trigger::Https { invoker: None }));
        }
        backend
    }

    #[test]
    fn conflict_lists_both_codebases() {
        let a = backend("api", &["i1"]);
        let b = backend("jobs", &["i1", "other"]);

        let err = endpoints_are_unique(&[a, b]).unwrap_err();
        match err {
            ValidationError::DuplicateEndpoints { conflicts } => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].key, "projects/p/locations/r1/functions/i1");
                assert_eq!(
                    conflicts[0].codebases,
                    vec!["api".to_string(), "jobs".to_string()]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn disjoint_codebases_pass() {
        let a = backend("api", &["one"]);
        let b = backend("jobs", &["two"]);
        assert!(endpoints_are_unique(&[a, b]).is_ok());
    }

    #[test]
    fn collects_violations_across_endpoints() {
        let mut backend = Backend::empty("api");
        backend.insert(Endpoint::new(
            "p",
            "r1",
            "a",
            Trigger::Scheduled {
                schedule: String::new(),
                time_zone: None,
                retry_count: None,
            },
        ));
        backend.insert(Endpoint::new(
            "p",
            "r1",
            "b",
            Trigger::Event {
                event_type: String::new(),
                filters: Default::default(),
                retry: false,
            },
        ));

        let err = endpoints_are_valid(&backend).unwrap_err();
        match err {
            ValidationError::InvalidEndpoints { violations } => {
                assert_eq!(violations.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
