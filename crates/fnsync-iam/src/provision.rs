//! Policy merge and the provisioning entry point.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use fnsync_cloud::{Binding, IamPolicy, ResourceManagerClient};
use fnsync_core::Backend;

use crate::bindings::{bindings_for, service_agent_kinds};
use crate::error::{IamError, IamResult};

/// Fields touched by a provisioning write. The policy is never
/// overwritten wholesale.
const POLICY_UPDATE_MASK: &[&str] = &["bindings", "etag", "version"];

/// Merge required bindings into the policy, returning whether anything
/// changed. Members are a set: merging the same bindings twice is a
/// no-op the second time.
pub fn merge_bindings(policy: &mut IamPolicy, required: &[Binding]) -> bool {
    let mut changed = false;
    for binding in required {
        match policy.bindings.iter_mut().find(|b| b.role == binding.role) {
            Some(existing) => {
                for member in &binding.members {
                    if !existing.members.contains(member) {
                        existing.members.push(member.clone());
                        changed = true;
                    }
                }
            }
            None => {
                policy.bindings.push(binding.clone());
                changed = true;
            }
        }
    }
    changed
}

/// Grant the service-agent roles that this release newly requires.
///
/// Only trigger kinds present in `want` but absent from `have` justify
/// touching the IAM API; redeploying an existing kind costs no calls.
/// A failed policy *read* is logged and swallowed: the grants are a
/// safety net the user can apply themselves, and must not block an
/// otherwise-valid deploy. A failed policy *write* is fatal.
pub async fn ensure_service_agent_roles(
    client: &dyn ResourceManagerClient,
    project: &str,
    project_number: u64,
    want: &Backend,
    have: &Backend,
) -> IamResult<()> {
    let want_kinds: BTreeSet<_> = want.endpoints().flat_map(service_agent_kinds).collect();
    let have_kinds: BTreeSet<_> = have.endpoints().flat_map(service_agent_kinds).collect();
    let new_kinds: Vec<_> = want_kinds.difference(&have_kinds).copied().collect();

    if new_kinds.is_empty() {
        debug!(%project, "no new trigger kinds; skipping service agent grants");
        return Ok(());
    }

    let mut policy = match client.get_iam_policy(project_number).await {
        Ok(policy) => policy,
        Err(err) => {
            warn!(
                %project,
                error = %err,
                "could not read project IAM policy; continuing deploy without service agent grants"
            );
            return Ok(());
        }
    };

    let required: Vec<Binding> = new_kinds
        .iter()
        .flat_map(|kind| bindings_for(*kind, project_number))
        .collect();

    if !merge_bindings(&mut policy, &required) {
        debug!(%project, "service agent roles already granted");
        return Ok(());
    }

    client
        .set_iam_policy(project_number, &policy, POLICY_UPDATE_MASK)
        .await
        .map_err(IamError::PolicyWrite)?;

    info!(
        %project,
        kinds = ?new_kinds,
        "granted service agent roles for new trigger kinds"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use fnsync_cloud::memory::MemoryResourceManager;
    use fnsync_core::{Endpoint, PlatformVersion, Trigger};

    fn event_backend(event_type: &str) -> Backend {
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
        ep.platform = PlatformVersion::Gen2;
        Backend::of([ep])
    }

    #[test]
    fn merge_is_idempotent() {
        let mut policy = IamPolicy {
            etag: "etag-1".to_string(),
            version: 3,
            bindings: vec![Binding::new("roles/viewer", &["user:a@example.com"])],
        };
        let required = vec![
            Binding::new("roles/pubsub.publisher", &["serviceAccount:sa@x"]),
            Binding::new("roles/viewer", &["user:b@example.com"]),
        ];

        assert!(merge_bindings(&mut policy, &required));
        let after_first = policy.clone();

        assert!(!merge_bindings(&mut policy, &required));
        assert_eq!(policy, after_first);
        assert_eq!(policy.etag, "etag-1");

        let viewer = policy.binding("roles/viewer").unwrap();
        assert_eq!(viewer.members, ["user:a@example.com", "user:b@example.com"]);
    }

    #[tokio::test]
    async fn no_new_kinds_means_no_network_calls() {
        let client = MemoryResourceManager::new();
        let want = event_backend("google.cloud.storage.object.v1.finalized");
        let have = event_backend("google.cloud.storage.object.v1.archived");

        ensure_service_agent_roles(&client, "p", 42, &want, &have)
            .await
            .unwrap();

        assert_eq!(client.get_calls(), 0);
        assert_eq!(client.set_calls(), 0);
    }

    #[tokio::test]
    async fn new_kind_merges_and_writes_with_mask() {
        let client = MemoryResourceManager::new();
        let want = event_backend("google.cloud.storage.object.v1.finalized");
        let have = Backend::empty("default");

        ensure_service_agent_roles(&client, "p", 42, &want, &have)
            .await
            .unwrap();

        assert_eq!(client.set_calls(), 1);
        assert_eq!(client.last_mask(), ["bindings", "etag", "version"]);
        let policy = client.policy();
        assert!(policy.binding("roles/pubsub.publisher").is_some());
        assert!(policy.binding("roles/run.invoker").is_some());
        assert!(policy.binding("roles/eventarc.eventReceiver").is_some());
    }

    #[tokio::test]
    async fn read_failure_is_swallowed() {
        let client = MemoryResourceManager::new();
        client.fail("getIamPolicy", 403, 0);
        let want = event_backend("google.cloud.storage.object.v1.finalized");
        let have = Backend::empty("default");

        ensure_service_agent_roles(&client, "p", 42, &want, &have)
            .await
            .unwrap();
        assert_eq!(client.set_calls(), 0);
    }

    #[tokio::test]
    async fn write_failure_is_fatal() {
        let client = MemoryResourceManager::new();
        client.fail("setIamPolicy", 403, 0);
        let want = event_backend("google.cloud.storage.object.v1.finalized");
        let have = Backend::empty("default");

        let err = ensure_service_agent_roles(&client, "p", 42, &want, &have)
            .await
            .unwrap_err();
        assert!(matches!(err, IamError::PolicyWrite(_)));
    }

    #[tokio::test]
    async fn already_granted_roles_skip_the_write() {
        let client = MemoryResourceManager::new();
        let mut policy = IamPolicy::default();
        for kind in [
            crate::bindings::ServiceAgentKind::StorageEvents,
            crate::bindings::ServiceAgentKind::ComputeInvoker,
        ] {
            merge_bindings(&mut policy, &bindings_for(kind, 42));
        }
        client.set_policy(policy);

        let want = event_backend("google.cloud.storage.object.v1.finalized");
        let have = Backend::empty("default");

        ensure_service_agent_roles(&client, "p", 42, &want, &have)
            .await
            .unwrap();
        assert_eq!(client.get_calls(), 1);
        assert_eq!(client.set_calls(), 0);
    }
}
