//! Analytics event sink contract.

use std::collections::BTreeMap;

/// Fire-and-forget analytics emission. The core defines no response
/// contract; sinks must never fail the deploy.
pub trait AnalyticsSink: Send + Sync {
    fn track(&self, event: &str, params: &BTreeMap<String, String>);
}

/// Sink that drops everything.
pub struct NoopAnalytics;

impl AnalyticsSink for NoopAnalytics {
    fn track(&self, _event: &str, _params: &BTreeMap<String, String>) {}
}
