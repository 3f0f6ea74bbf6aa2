//! Function identifier rules per platform generation.

use std::sync::LazyLock;

use regex::Regex;

use fnsync_core::{Endpoint, PlatformVersion};

use crate::error::{ValidationError, ValidationResult};

/// Generation 1: letters, digits, hyphen, underscore; must start with
/// a letter; at most 63 characters.
static GEN1_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_-]{0,62}$").unwrap());

/// Generation 2: lowercase letters, digits, hyphen only.
static GEN2_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]{0,62}$").unwrap());

fn id_is_valid(endpoint: &Endpoint) -> bool {
    match endpoint.platform {
        PlatformVersion::Gen1 => GEN1_ID.is_match(&endpoint.id),
        PlatformVersion::Gen2 => GEN2_ID.is_match(&endpoint.id),
    }
}

/// Check every endpoint's id against its generation's rules, reporting
/// all violators at once.
pub fn function_ids_are_valid(endpoints: &[&Endpoint]) -> ValidationResult<()> {
    let invalid: Vec<String> = endpoints
        .iter()
        .filter(|e| !id_is_valid(e))
        .map(|e| e.id.clone())
        .collect();
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::InvalidIds { ids: invalid })
    }
}
