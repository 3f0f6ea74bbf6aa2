//! Confirmation prompt contract.

use async_trait::async_trait;

/// Asks the user a yes/no question.
///
/// Callers decide what non-interactive mode means; the secret flows
/// fail closed before ever reaching a prompter when no terminal is
/// attached and no force flag was given.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn confirm(&self, message: &str) -> bool;
}

/// Prompter that answers every question the same way.
pub struct StaticPrompter(pub bool);

#[async_trait]
impl Prompter for StaticPrompter {
    async fn confirm(&self, _message: &str) -> bool {
        self.0
    }
}
