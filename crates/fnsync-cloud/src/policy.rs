//! IAM policy shapes shared by the project and per-function IAM APIs.

use serde::{Deserialize, Serialize};

/// One role grant. `members` is kept ordered for stable serialization
/// but treated as a set by the merge logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub role: String,
    pub members: Vec<String>,
}

impl Binding {
    pub fn new(role: &str, members: &[&str]) -> Self {
        Self {
            role: role.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// An IAM policy as fetched from the API.
///
/// Mutated only by merging bindings in; `etag` must round-trip
/// unchanged so the write is rejected if the policy moved underneath.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IamPolicy {
    pub etag: String,
    pub version: u32,
    pub bindings: Vec<Binding>,
}

impl IamPolicy {
    pub fn binding(&self, role: &str) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.role == role)
    }
}
