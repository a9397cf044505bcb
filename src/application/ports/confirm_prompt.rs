use async_trait::async_trait;

/// Yes/no confirmation for reinstalling a plugin that is not newer than the
/// installed one.
#[async_trait]
pub trait ConfirmPrompt: Send + Sync {
    async fn confirm(&self, question: &str) -> bool;
}

/// Answers yes without asking (`-y`).
pub struct AssumeYes;

#[async_trait]
impl ConfirmPrompt for AssumeYes {
    async fn confirm(&self, _question: &str) -> bool {
        true
    }
}
