//! Want/have diffing.

use fnsync_core::{Backend, Endpoint};

/// An endpoint present on both sides whose configuration differs.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointUpdate {
    pub from: Endpoint,
    pub to: Endpoint,
}

/// The work a release has to do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changeset {
    pub creates: Vec<Endpoint>,
    pub updates: Vec<EndpointUpdate>,
    pub deletes: Vec<Endpoint>,
    /// Matched endpoints whose configuration is already converged.
    pub unchanged: Vec<Endpoint>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    pub fn operation_count(&self) -> usize {
        self.creates.len() + self.updates.len() + self.deletes.len()
    }
}

/// The have state comes from a listing call and does not know which
/// codebase declared an endpoint, so codebase never participates in
/// the changed/unchanged decision.
fn configs_match(want: &Endpoint, have: &Endpoint) -> bool {
    let mut have = have.clone();
    have.codebase = want.codebase.clone();
    *want == have
}

/// Diff the wanted state against the live listing, keyed by endpoint
/// identity.
pub fn plan_changes(want: &Backend, have: &Backend) -> Changeset {
    let mut changes = Changeset::default();

    for (key, endpoint) in &want.endpoints {
        match have.endpoints.get(key) {
            None => changes.creates.push(endpoint.clone()),
            Some(existing) if configs_match(endpoint, existing) => {
                changes.unchanged.push(endpoint.clone());
            }
            Some(existing) => changes.updates.push(EndpointUpdate {
                from: existing.clone(),
                to: endpoint.clone(),
            }),
        }
    }

    for (key, endpoint) in &have.endpoints {
        if !want.endpoints.contains_key(key) {
            changes.deletes.push(endpoint.clone());
        }
    }

    changes
}
