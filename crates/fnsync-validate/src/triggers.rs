//! Per-trigger legality rules.
//!
//! Each trigger variant owns its own rules; the dispatch is on the
//! variant tag, never on object shape.

use std::collections::BTreeMap;

use fnsync_core::{BlockingPhase, Endpoint, Trigger};

pub(crate) fn validate_trigger(endpoint: &Endpoint) -> Result<(), String> {
    match &endpoint.trigger {
        Trigger::Https { .. } | Trigger::Callable => Ok(()),
        Trigger::Scheduled {
            schedule,
            retry_count,
            ..
        } => {
            if schedule.trim().is_empty() {
                return Err("scheduled endpoints need a non-empty schedule".to_string());
            }
            if *retry_count == Some(0) {
                return Err("scheduled retry count must be positive when set".to_string());
            }
            Ok(())
        }
        Trigger::TaskQueue {
            max_dispatches_per_second,
            max_concurrent_dispatches,
            ..
        } => {
            if let Some(rate) = max_dispatches_per_second {
                if *rate <= 0.0 {
                    return Err("task queue dispatch rate must be positive".to_string());
                }
            }
            if *max_concurrent_dispatches == Some(0) {
                return Err("task queue concurrent dispatch limit must be positive".to_string());
            }
            Ok(())
        }
        Trigger::Blocking { .. } => Ok(()),
        Trigger::Event { event_type, .. } => {
            if event_type.trim().is_empty() {
                return Err("event endpoints need a non-empty event type".to_string());
            }
            Ok(())
        }
    }
}

/// At most one blocking endpoint per lifecycle phase across the whole
/// wanted state.
pub(crate) fn duplicate_blocking_phases(
    endpoints: &[&Endpoint],
) -> Vec<(BlockingPhase, Vec<String>)> {
    let mut by_phase: BTreeMap<BlockingPhase, Vec<String>> = BTreeMap::new();
    for endpoint in endpoints {
        if let Trigger::Blocking { phase } = &endpoint.trigger {
            by_phase.entry(*phase).or_default().push(endpoint.key());
        }
    }
    by_phase
        .into_iter()
        .filter(|(_, keys)| keys.len() > 1)
        .collect()
}
