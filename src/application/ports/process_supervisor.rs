use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::plugins::manifest::DEFAULT_TIMEOUT_SECS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Child shares the agent's stdio.
    #[default]
    Inherit,
    /// stdout/stderr are collected into the outcome.
    Capture,
    Null,
}

#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Added on top of the inherited environment.
    pub env: Vec<(String, String)>,
    pub run_as: Option<String>,
    /// `None` waits forever.
    pub timeout: Option<Duration>,
    pub output: OutputMode,
    /// Kill the whole process group after any non-success outcome, not only
    /// after a timeout.
    pub kill_tree_on_failure: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
            run_as: None,
            timeout: None,
            output: OutputMode::Inherit,
            kill_tree_on_failure: false,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Zero falls back to the default plugin timeout.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        let secs = if secs == 0 { DEFAULT_TIMEOUT_SECS } else { secs };
        self.timeout = Some(Duration::from_secs(secs));
        self
    }

    pub fn output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn run_as(mut self, user: Option<String>) -> Self {
        self.run_as = user.filter(|u| !u.is_empty());
        self
    }

    pub fn kill_tree_on_failure(mut self) -> Self {
        self.kill_tree_on_failure = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// The supervisor could not start or wait for the process.
    Fail,
    Timeout,
}

#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub exit_code: i32,
    pub status: RunStatus,
    pub error: Option<String>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            status: RunStatus::Fail,
            error: Some(error.into()),
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Success && self.exit_code == 0
    }
}

/// Runs one command in its own process group (or job on Windows) and kills
/// the whole tree on timeout.
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    async fn run(&self, spec: CommandSpec) -> ProcessOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_uses_default() {
        let spec = CommandSpec::new("plugin").timeout_secs(0);
        assert_eq!(spec.timeout, Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)));
        assert_eq!(
            CommandSpec::new("plugin").timeout_secs(5).timeout,
            Some(Duration::from_secs(5))
        );
    }
}
