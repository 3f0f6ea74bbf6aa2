//! Release outcome classification, stats, and the failure report.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use tracing::info;

use fnsync_cloud::AnalyticsSink;
use fnsync_core::{PlatformVersion, Trigger};

use crate::error::OperationType;
use crate::executor::DeploymentResult;

/// Region counts at or above this report as the "many" bucket.
const REGION_BUCKET_THRESHOLD: usize = 5;

/// Whole-release classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    PartialSuccess,
}

/// Everything that happened in one release.
#[derive(Debug, Default)]
pub struct Summary {
    pub results: Vec<DeploymentResult>,
}

fn outcome_label(result: &DeploymentResult) -> &'static str {
    match &result.error {
        None => "success",
        Some(err) if err.is_aborted() => "aborted",
        Some(_) => "error",
    }
}

impl Summary {
    pub fn successes(&self) -> impl Iterator<Item = &DeploymentResult> {
        self.results.iter().filter(|r| r.error.is_none())
    }

    /// Failures, excluding aborted deletes (those get their own section).
    pub fn errors(&self) -> impl Iterator<Item = &DeploymentResult> {
        self.results
            .iter()
            .filter(|r| r.error.as_ref().is_some_and(|e| !e.is_aborted()))
    }

    pub fn aborted(&self) -> impl Iterator<Item = &DeploymentResult> {
        self.results
            .iter()
            .filter(|r| r.error.as_ref().is_some_and(|e| e.is_aborted()))
    }

    /// Errored results (aborted included) over total.
    pub fn error_ratio(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        let errored = self.results.iter().filter(|r| r.error.is_some()).count();
        errored as f64 / self.results.len() as f64
    }

    pub fn outcome(&self) -> Outcome {
        let errored = self.results.iter().filter(|r| r.error.is_some()).count();
        if errored == 0 {
            Outcome::Success
        } else if errored == self.results.len() {
            Outcome::Failure
        } else {
            Outcome::PartialSuccess
        }
    }
}

fn track(sink: &dyn AnalyticsSink, event: &str, params: &[(&str, String)]) {
    let params: BTreeMap<String, String> = params
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    sink.track(event, &params);
}

/// Log aggregate deploy stats and emit the analytics records: totals
/// by outcome, one record per trigger-tag and outcome pair, the
/// region-cardinality bucket, the platform mix, and the overall
/// outcome.
pub fn log_and_track_deploy_stats(sink: &dyn AnalyticsSink, summary: &Summary) {
    #[derive(Default)]
    struct Agg {
        count: u64,
        total_ms: u64,
    }

    let mut by_outcome: BTreeMap<&'static str, Agg> = BTreeMap::new();
    let mut by_tag: BTreeMap<(String, &'static str), Agg> = BTreeMap::new();
    for result in &summary.results {
        let outcome = outcome_label(result);
        let agg = by_outcome.entry(outcome).or_default();
        agg.count += 1;
        agg.total_ms += result.duration_ms;
        let agg = by_tag
            .entry((result.endpoint.trigger_tag(), outcome))
            .or_default();
        agg.count += 1;
        agg.total_ms += result.duration_ms;
    }

    for (outcome, agg) in &by_outcome {
        let avg_ms = agg.total_ms / agg.count.max(1);
        info!(
            outcome,
            count = agg.count,
            total_ms = agg.total_ms,
            avg_ms,
            "deploy totals"
        );
    }

    for ((tag, outcome), agg) in &by_tag {
        track(
            sink,
            "function_deploy",
            &[
                ("platform_trigger", tag.clone()),
                ("outcome", outcome.to_string()),
                ("count", agg.count.to_string()),
                ("avg_duration_ms", (agg.total_ms / agg.count.max(1)).to_string()),
            ],
        );
    }

    let regions: BTreeSet<&str> = summary
        .results
        .iter()
        .map(|r| r.endpoint.region.as_str())
        .collect();
    let bucket = if regions.len() < REGION_BUCKET_THRESHOLD {
        regions.len().to_string()
    } else {
        "many".to_string()
    };
    track(sink, "function_deploy_region_count", &[("regions", bucket)]);

    let has_v1 = summary
        .results
        .iter()
        .any(|r| r.endpoint.platform == PlatformVersion::Gen1);
    let has_v2 = summary
        .results
        .iter()
        .any(|r| r.endpoint.platform == PlatformVersion::Gen2);
    let mix = match (has_v1, has_v2) {
        (true, true) => "mixed",
        (false, true) => "v2",
        _ => "v1",
    };
    track(sink, "function_deploy_platform", &[("platform", mix.to_string())]);

    match summary.outcome() {
        Outcome::Success => track(
            sink,
            "function_deploy_outcome",
            &[("outcome", "success".to_string())],
        ),
        Outcome::Failure => track(
            sink,
            "function_deploy_outcome",
            &[("outcome", "failure".to_string())],
        ),
        Outcome::PartialSuccess => {
            let ratio = format!("{:.2}", summary.error_ratio());
            track(
                sink,
                "function_deploy_outcome",
                &[
                    ("outcome", "partial_success".to_string()),
                    ("error_ratio", ratio.clone()),
                ],
            );
            track(
                sink,
                "function_deploy_outcome",
                &[
                    ("outcome", "partial_failure".to_string()),
                    ("error_ratio", ratio),
                ],
            );
        }
    }
}

/// Whether the endpoint relied on the platform's public-on-create
/// default rather than declaring invokers.
fn had_no_explicit_invokers(result: &DeploymentResult) -> bool {
    match &result.endpoint.trigger {
        Trigger::Https { invoker } => invoker.is_none(),
        Trigger::Callable => true,
        _ => false,
    }
}

/// Render the human-readable failure report: one line per failing
/// endpoint, then targeted remediation for invoker grants, quota, and
/// aborted deletes.
pub fn report_errors(summary: &Summary) -> String {
    let mut out = String::new();
    let errors: Vec<&DeploymentResult> = summary.errors().collect();

    if !errors.is_empty() {
        out.push_str("the following functions failed to deploy:\n");
        for result in &errors {
            if let Some(error) = &result.error {
                let _ = writeln!(out, "  {error}");
            }
        }
    }

    let invoker_failures: Vec<&DeploymentResult> = errors
        .iter()
        .copied()
        .filter(|r| {
            r.error
                .as_ref()
                .is_some_and(|e| e.op() == OperationType::SetInvoker)
        })
        .collect();
    if !invoker_failures.is_empty() {
        out.push_str(
            "\nsome functions were created but their invoker policy could not be set.\n\
             grant the invoker role manually to make them callable.\n",
        );
        if invoker_failures.iter().any(|r| had_no_explicit_invokers(r)) {
            out.push_str(
                "note: functions created without an explicit invoker list are\n\
                 publicly invokable by default once the policy is applied.\n",
            );
        }
    }

    if errors
        .iter()
        .any(|r| r.error.as_ref().is_some_and(|e| e.is_quota()))
    {
        out.push_str(
            "\nsome failures were caused by quota or concurrent-operation limits.\n\
             retry the deploy with fewer functions at a time, or wait for quota\n\
             to replenish and deploy the failed functions again.\n",
        );
    }

    let aborted: Vec<&DeploymentResult> = summary.aborted().collect();
    if !aborted.is_empty() {
        out.push_str(
            "\nthe following deletes were skipped because a replacement failed to\n\
             deploy; the stale functions still exist:\n",
        );
        for result in &aborted {
            let _ = writeln!(out, "  {}", result.endpoint.key());
        }
    }

    out
}
