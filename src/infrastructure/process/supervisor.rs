use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::application::ports::process_supervisor::{
    CommandSpec, OutputMode, ProcessOutcome, ProcessSupervisor, RunStatus,
};

/// How long captured pipes may keep draining after the child exited.
/// A detached descendant can hold them open indefinitely.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Tokio-backed supervisor. Every child leads its own process group on
/// unix, so a timeout can take down every descendant with one signal.
#[derive(Debug, Default, Clone)]
pub struct TokioProcessSupervisor;

impl TokioProcessSupervisor {
    pub fn new() -> Self {
        Self
    }

    async fn build(spec: &CommandSpec) -> anyhow::Result<Command> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        cmd.envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        let (stdout, stderr) = match spec.output {
            OutputMode::Inherit => (Stdio::inherit(), Stdio::inherit()),
            OutputMode::Capture => (Stdio::piped(), Stdio::piped()),
            OutputMode::Null => (Stdio::null(), Stdio::null()),
        };
        cmd.stdin(Stdio::null()).stdout(stdout).stderr(stderr);
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        {
            cmd.process_group(0);
            if let Some(user) = &spec.run_as {
                let creds = platform::lookup_user(user).await?;
                cmd.uid(creds.uid).gid(creds.gid);
                cmd.env("HOME", creds.home).env("USER", user).env("LOGNAME", user);
            }
        }
        #[cfg(not(unix))]
        {
            if let Some(user) = &spec.run_as {
                anyhow::bail!("running as {user} is not supported on this platform");
            }
        }
        Ok(cmd)
    }
}

/// Reader task appending into a shared buffer, so a drain cut short by
/// the grace period still keeps what was read.
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

fn collect<R>(stream: Option<R>) -> Option<Capture>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    stream.map(|mut s| {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = buf.clone();
        let task = tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match s.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if let Ok(mut out) = sink.lock() {
                            out.extend_from_slice(&chunk[..n]);
                        }
                    }
                }
            }
        });
        Capture { buf, task }
    })
}

async fn joined(capture: Option<Capture>, program: &std::path::Path) -> Vec<u8> {
    let Some(Capture { buf, mut task }) = capture else {
        return Vec::new();
    };
    if tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut task).await.is_err() {
        task.abort();
        tracing::debug!(program = %program.display(), "process_output_drain_abandoned");
    }
    buf.lock().map(|out| out.clone()).unwrap_or_default()
}

async fn kill_tree(child: &mut Child, pid: Option<u32>) {
    if let Some(pid) = pid {
        platform::kill_group(pid).await;
    }
    let _ = child.kill().await;
}

#[async_trait]
impl ProcessSupervisor for TokioProcessSupervisor {
    async fn run(&self, spec: CommandSpec) -> ProcessOutcome {
        let mut cmd = match Self::build(&spec).await {
            Ok(cmd) => cmd,
            Err(err) => return ProcessOutcome::failed(format!("{err:#}")),
        };
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                return ProcessOutcome::failed(format!(
                    "start {}: {err}",
                    spec.program.display()
                ));
            }
        };
        let pid = child.id();
        let stdout = collect(child.stdout.take());
        let stderr = collect(child.stderr.take());

        let waited = match spec.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait()).await.ok(),
            None => Some(child.wait().await),
        };

        let (status, exit_code, error) = match waited {
            None => {
                kill_tree(&mut child, pid).await;
                tracing::warn!(
                    program = %spec.program.display(),
                    pid,
                    timeout_secs = spec.timeout.map(|t| t.as_secs()),
                    "process_timeout_tree_killed"
                );
                (RunStatus::Timeout, -1, Some("process timed out".to_string()))
            }
            Some(Err(err)) => {
                kill_tree(&mut child, pid).await;
                (RunStatus::Fail, 1, Some(format!("wait: {err}")))
            }
            Some(Ok(exit)) => {
                let code = exit.code().unwrap_or(-1);
                if code != 0 && spec.kill_tree_on_failure {
                    if let Some(pid) = pid {
                        platform::kill_group(pid).await;
                    }
                }
                (RunStatus::Success, code, None)
            }
        };

        ProcessOutcome {
            exit_code,
            status,
            error,
            stdout: joined(stdout, &spec.program).await,
            stderr: joined(stderr, &spec.program).await,
        }
    }
}

#[cfg(unix)]
mod platform {
    use anyhow::{Context, anyhow};
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::{Pid, User};

    pub struct UserCreds {
        pub uid: u32,
        pub gid: u32,
        pub home: String,
    }

    /// Resolves a user from the passwd database.
    pub async fn lookup_user(user: &str) -> anyhow::Result<UserCreds> {
        let name = user.to_string();
        let entry = tokio::task::spawn_blocking(move || User::from_name(&name))
            .await
            .context("join user lookup")?
            .with_context(|| format!("look up user {user}"))?
            .ok_or_else(|| anyhow!("unknown user {user}"))?;
        Ok(UserCreds {
            uid: entry.uid.as_raw(),
            gid: entry.gid.as_raw(),
            home: entry.dir.to_string_lossy().into_owned(),
        })
    }

    /// SIGKILL to every member of the process group led by `pid`.
    pub async fn kill_group(pid: u32) {
        let Ok(pgid) = i32::try_from(pid) else {
            return;
        };
        if let Err(err) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            tracing::debug!(pgid, error = %err, "kill_process_group_failed");
        }
    }
}

#[cfg(not(unix))]
mod platform {
    pub async fn kill_group(pid: u32) {
        let result = tokio::process::Command::new("taskkill")
            .args(["/T", "/F", "/PID", &pid.to_string()])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await;
        if let Err(err) = result {
            tracing::debug!(pid, error = %err, "taskkill_failed");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("/bin/sh").args(["-c", script])
    }

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let outcome = TokioProcessSupervisor::new()
            .run(sh("echo hi; echo oops >&2; exit 3").output(OutputMode::Capture))
            .await;
        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(outcome.exit_code, 3);
        assert_eq!(String::from_utf8_lossy(&outcome.stdout), "hi\n");
        assert_eq!(String::from_utf8_lossy(&outcome.stderr), "oops\n");
    }

    #[tokio::test]
    async fn env_is_passed_through() {
        let outcome = TokioProcessSupervisor::new()
            .run(
                sh("printf %s \"$PLUGIN_DIR\"")
                    .env("PLUGIN_DIR", "/opt/demo")
                    .output(OutputMode::Capture),
            )
            .await;
        assert_eq!(outcome.stdout, b"/opt/demo");
    }

    #[tokio::test]
    async fn missing_program_fails() {
        let outcome = TokioProcessSupervisor::new()
            .run(CommandSpec::new("/nonexistent/plugin-binary"))
            .await;
        assert_eq!(outcome.status, RunStatus::Fail);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn timeout_returns_promptly() {
        let started = Instant::now();
        let outcome = TokioProcessSupervisor::new()
            .run(sh("sleep 30").timeout_secs(1).output(OutputMode::Null))
            .await;
        assert_eq!(outcome.status, RunStatus::Timeout);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn unknown_run_as_user_fails_before_spawn() {
        let outcome = TokioProcessSupervisor::new()
            .run(sh("true").run_as(Some("no-such-user-plugin-agent".to_string())))
            .await;
        assert_eq!(outcome.status, RunStatus::Fail);
        assert!(outcome.error.unwrap_or_default().contains("unknown user"));
    }

    #[tokio::test]
    async fn root_lookup_reads_passwd_home() {
        let creds = platform::lookup_user("root").await.unwrap();
        assert_eq!(creds.uid, 0);
        assert!(!creds.home.is_empty());
    }
}
