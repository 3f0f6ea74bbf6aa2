//! fnsync.toml configuration parser.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Reconciler-wide knobs, loadable from an `fnsync.toml`.
///
/// Every section is optional in the file; missing sections take the
/// defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default)]
    pub apply: ApplyConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub prompts: PromptConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

/// Release executor knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyConfig {
    /// Maximum in-flight create/update/delete calls.
    pub concurrency: usize,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self { concurrency: 40 }
    }
}

/// Retry policy for quota/conflict and transient registry failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first call.
    pub attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Ceiling for the doubled delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 20_000,
        }
    }
}

/// Confirmation prompt behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Skip confirmations entirely.
    pub force: bool,
    /// No terminal attached: prompts fail closed unless `force` is set.
    pub non_interactive: bool,
}

/// Artifact cleanup knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Restrict purge walks to these regions. Unset walks everything.
    pub regions: Option<Vec<String>>,
}

impl ReconcilerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_empty() {
        let config = ReconcilerConfig::from_toml_str("").unwrap();
        assert_eq!(config.apply.concurrency, 40);
        assert_eq!(config.retry.attempts, 5);
        assert!(!config.prompts.force);
        assert!(config.cleanup.regions.is_none());
    }

    #[test]
    fn partial_file_overrides() {
        let config = ReconcilerConfig::from_toml_str(
            r#"
            [apply]
            concurrency = 8

            [prompts]
            force = true
            non_interactive = true

            [cleanup]
            regions = ["us-central1"]
            "#,
        )
        .unwrap();
        assert_eq!(config.apply.concurrency, 8);
        assert!(config.prompts.force);
        assert_eq!(
            config.cleanup.regions.as_deref(),
            Some(&["us-central1".to_string()][..])
        );
        // Untouched section keeps its defaults.
        assert_eq!(config.retry.base_delay_ms, 1_000);
    }
}
