//! Environment key canonicalization.

use tracing::warn;

use fnsync_cloud::Prompter;
use fnsync_core::config::PromptConfig;

use crate::error::{SecretsError, SecretsResult};

/// Environment variables the runtime owns; never usable for secrets,
/// force flag or not.
const RESERVED_KEYS: &[&str] = &[
    "FUNCTION_TARGET",
    "FUNCTION_SIGNATURE_TYPE",
    "K_SERVICE",
    "K_REVISION",
    "K_CONFIGURATION",
    "PORT",
];

/// Upper-snake-case canonical form: uppercase, every non-alphanumeric
/// byte folded to an underscore.
fn canonicalize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Validate a secret's environment key, canonicalizing it first.
///
/// A changed key warns and requires confirmation unless `force` is
/// set; in non-interactive mode without `force` the call fails closed.
/// Reserved runtime keys are rejected outright.
pub async fn ensure_valid_key(
    prompter: &dyn Prompter,
    name: &str,
    prompts: &PromptConfig,
) -> SecretsResult<String> {
    let key = canonicalize(name);
    if RESERVED_KEYS.contains(&key.as_str()) {
        return Err(SecretsError::ReservedKey(key));
    }

    if key != name && !prompts.force {
        warn!(original = name, %key, "secret key canonicalized to upper snake case");
        let question = format!("expose secret {name} under the environment key {key}?");
        if prompts.non_interactive {
            return Err(SecretsError::NonInteractive(question));
        }
        if !prompter.confirm(&question).await {
            return Err(SecretsError::Aborted(question));
        }
    }

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fnsync_cloud::StaticPrompter;
    use fnsync_cloud::memory::ScriptedPrompter;

    fn prompts(force: bool, non_interactive: bool) -> PromptConfig {
        PromptConfig {
            force,
            non_interactive,
        }
    }

    #[tokio::test]
    async fn canonical_names_pass_without_prompting() {
        let prompter = ScriptedPrompter::new(&[]);
        let key = ensure_valid_key(&prompter, "API_KEY", &prompts(false, false))
            .await
            .unwrap();
        assert_eq!(key, "API_KEY");
        assert!(prompter.asked().is_empty());
    }

    #[tokio::test]
    async fn changed_names_require_confirmation() {
        let prompter = ScriptedPrompter::new(&[true]);
        let key = ensure_valid_key(&prompter, "api-key", &prompts(false, false))
            .await
            .unwrap();
        assert_eq!(key, "API_KEY");
        assert_eq!(prompter.asked().len(), 1);
    }

    #[tokio::test]
    async fn declined_confirmation_aborts() {
        let prompter = ScriptedPrompter::new(&[false]);
        let err = ensure_valid_key(&prompter, "api-key", &prompts(false, false))
            .await
            .unwrap_err();
        assert!(matches!(err, SecretsError::Aborted(_)));
    }

    #[tokio::test]
    async fn force_skips_the_prompt() {
        let prompter = ScriptedPrompter::new(&[]);
        let key = ensure_valid_key(&prompter, "api-key", &prompts(true, true))
            .await
            .unwrap();
        assert_eq!(key, "API_KEY");
        assert!(prompter.asked().is_empty());
    }

    #[tokio::test]
    async fn non_interactive_fails_closed() {
        let prompter = StaticPrompter(true);
        let err = ensure_valid_key(&prompter, "api-key", &prompts(false, true))
            .await
            .unwrap_err();
        assert!(matches!(err, SecretsError::NonInteractive(_)));
    }

    #[tokio::test]
    async fn reserved_keys_rejected_despite_force() {
        let prompter = StaticPrompter(true);
        let err = ensure_valid_key(&prompter, "port", &prompts(true, false))
            .await
            .unwrap_err();
        assert!(matches!(err, SecretsError::ReservedKey(key) if key == "PORT"));
    }
}
