use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::application::ports::confirm_prompt::ConfirmPrompt;

/// Asks on stdout and reads one line from stdin; only `y`/`yes` confirm.
pub struct StdinConfirmPrompt;

#[async_trait]
impl ConfirmPrompt for StdinConfirmPrompt {
    async fn confirm(&self, question: &str) -> bool {
        let mut stdout = tokio::io::stdout();
        if stdout.write_all(question.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
            return false;
        }
        let mut line = String::new();
        match BufReader::new(tokio::io::stdin()).read_line(&mut line).await {
            Ok(_) => is_yes(&line),
            Err(err) => {
                tracing::warn!(error = ?err, "confirm_prompt_read_failed");
                false
            }
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_explicit_yes_confirms() {
        assert!(is_yes("Y\n"));
        assert!(is_yes(" yes "));
        assert!(!is_yes(""));
        assert!(!is_yes("no"));
    }
}
