//! Service-agent binding lookup table.

use fnsync_cloud::Binding;
use fnsync_core::{Endpoint, PlatformVersion, Trigger};

const STORAGE_EVENT_PREFIX: &str = "google.cloud.storage.";
const PUBSUB_EVENT_PREFIX: &str = "google.cloud.pubsub.";

/// Trigger kinds that require service-agent grants before they deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServiceAgentKind {
    /// Pub/sub-backed events: the pub/sub agent mints push tokens.
    PubSubPublisher,
    /// Storage events: the storage agent publishes into pub/sub.
    StorageEvents,
    /// Any second-generation event: delivery invokes the function as
    /// the default compute service account.
    ComputeInvoker,
}

/// Service-agent kinds this endpoint's trigger depends on.
pub fn service_agent_kinds(endpoint: &Endpoint) -> Vec<ServiceAgentKind> {
    if endpoint.platform < PlatformVersion::Gen2 {
        return Vec::new();
    }
    let Trigger::Event { event_type, .. } = &endpoint.trigger else {
        return Vec::new();
    };

    let mut kinds = vec![ServiceAgentKind::ComputeInvoker];
    if event_type.starts_with(STORAGE_EVENT_PREFIX) {
        kinds.push(ServiceAgentKind::StorageEvents);
    } else if event_type.starts_with(PUBSUB_EVENT_PREFIX) {
        kinds.push(ServiceAgentKind::PubSubPublisher);
    }
    kinds
}

/// Role bindings a kind requires, with the service-agent member
/// synthesized from the project number.
pub fn bindings_for(kind: ServiceAgentKind, project_number: u64) -> Vec<Binding> {
    match kind {
        ServiceAgentKind::PubSubPublisher => vec![Binding {
            role: "roles/iam.serviceAccountTokenCreator".to_string(),
            members: vec![format!(
                "serviceAccount:service-{project_number}@gcp-sa-pubsub.iam.gserviceaccount.com"
            )],
        }],
        ServiceAgentKind::StorageEvents => vec![Binding {
            role: "roles/pubsub.publisher".to_string(),
            members: vec![format!(
                "serviceAccount:service-{project_number}@gs-project-accounts.iam.gserviceaccount.com"
            )],
        }],
        ServiceAgentKind::ComputeInvoker => {
            let member =
                format!("serviceAccount:{project_number}-compute@developer.gserviceaccount.com");
            vec![
                Binding {
                    role: "roles/run.invoker".to_string(),
                    members: vec![member.clone()],
                },
                Binding {
                    role: "roles/eventarc.eventReceiver".to_string(),
                    members: vec![member],
                },
            ]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn event_endpoint(event_type: &str, platform: PlatformVersion) -> Endpoint {
        let mut ep = Endpoint::new(
            "p",
            "us-central1",
            "fn1",
            Trigger::Event {
                event_type: event_type.to_string(),
                filters: BTreeMap::new(),
                retry: false,
            },
        );
        ep.platform = platform;
        ep
    }

    #[test]
    fn storage_events_need_storage_agent_and_invoker() {
        let ep = event_endpoint(
            "google.cloud.storage.object.v1.finalized",
            PlatformVersion::Gen2,
        );
        let kinds = service_agent_kinds(&ep);
        assert!(kinds.contains(&ServiceAgentKind::StorageEvents));
        assert!(kinds.contains(&ServiceAgentKind::ComputeInvoker));
    }

    #[test]
    fn gen1_events_need_nothing() {
        let ep = event_endpoint(
            "google.cloud.storage.object.v1.finalized",
            PlatformVersion::Gen1,
        );
        assert!(service_agent_kinds(&ep).is_empty());
    }

    #[test]
    fn https_needs_nothing() {
        let mut ep = Endpoint::new("p", "r", "fn1", Trigger::Https { invoker: None });
        ep.platform = PlatformVersion::Gen2;
        assert!(service_agent_kinds(&ep).is_empty());
    }

    #[test]
    fn members_interpolate_the_project_number() {
        let bindings = bindings_for(ServiceAgentKind::StorageEvents, 1234);
        assert_eq!(bindings.len(), 1);
        assert_eq!(
            bindings[0].members[0],
            "serviceAccount:service-1234@gs-project-accounts.iam.gserviceaccount.com"
        );
    }

    #[test]
    fn compute_invoker_grants_two_roles() {
        let bindings = bindings_for(ServiceAgentKind::ComputeInvoker, 42);
        let roles: Vec<_> = bindings.iter().map(|b| b.role.as_str()).collect();
        assert_eq!(roles, ["roles/run.invoker", "roles/eventarc.eventReceiver"]);
    }
}
