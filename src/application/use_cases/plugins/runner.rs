use std::path::Path;

use crate::application::dto::plugins::{Fetched, PluginStatusRequest};
use crate::application::ports::control_plane::ControlPlane;
use crate::application::ports::process_supervisor::{
    CommandSpec, OutputMode, ProcessSupervisor, RunStatus,
};
use crate::application::use_cases::plugins::errors::PluginManagerError;
use crate::domain::plugins::platform;
use crate::domain::plugins::{PluginStatus, PluginStatusKind};

pub const ENV_PLUGIN_DIR: &str = "PLUGIN_DIR";
pub const ENV_PRE_PLUGIN_DIR: &str = "PRE_PLUGIN_DIR";
pub const STATUS_ARG: &str = "--status";

/// Command line for a plugin entrypoint. PowerShell scripts are run through
/// `powershell` with the script path as first argument.
pub fn plugin_command(entrypoint: &Path, args: Vec<String>) -> CommandSpec {
    let is_ps1 = entrypoint
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("ps1"));
    if is_ps1 {
        CommandSpec::new("powershell")
            .args([entrypoint.to_string_lossy().into_owned()])
            .args(args)
    } else {
        CommandSpec::new(entrypoint).args(args)
    }
}

pub fn plugin_env(fetched: &Fetched) -> Vec<(String, String)> {
    vec![
        (
            ENV_PLUGIN_DIR.to_string(),
            fetched.env_plugin_dir.to_string_lossy().into_owned(),
        ),
        (
            ENV_PRE_PLUGIN_DIR.to_string(),
            fetched
                .env_pre_plugin_dir
                .as_deref()
                .map(|dir| dir.to_string_lossy().into_owned())
                .unwrap_or_default(),
        ),
    ]
}

/// One invocation of a plugin entrypoint.
#[derive(Debug, Clone)]
pub struct PluginRun {
    pub args: Vec<String>,
    pub timeout_secs: u64,
    pub env: Vec<(String, String)>,
    pub output: OutputMode,
    pub run_as: Option<String>,
}

/// Runs the entrypoint and maps supervisor failures onto exit
/// classifications. A plugin that ran to completion yields its own exit
/// code, zero or not.
pub async fn run_plugin<S>(
    supervisor: &S,
    entrypoint: &Path,
    run: PluginRun,
) -> Result<i32, PluginManagerError>
where
    S: ProcessSupervisor + ?Sized,
{
    if !tokio::fs::try_exists(entrypoint).await.unwrap_or(false) {
        tracing::info!(path = %entrypoint.display(), "plugin_entrypoint_missing");
        return Err(PluginManagerError::PluginFormat(format!(
            "Executable file not exist, {}.",
            entrypoint.display()
        )));
    }

    let timeout_secs = run.timeout_secs;
    let mut spec = plugin_command(entrypoint, run.args)
        .timeout_secs(timeout_secs)
        .output(run.output)
        .run_as(run.run_as);
    spec.env.extend(run.env);

    let outcome = supervisor.run(spec.clone()).await;
    tracing::info!(
        program = %spec.program.display(),
        args = ?spec.args,
        exit_code = outcome.exit_code,
        timeout = timeout_secs,
        status = ?outcome.status,
        error = outcome.error.as_deref().unwrap_or(""),
        "plugin_executed"
    );
    match outcome.status {
        RunStatus::Success => Ok(outcome.exit_code),
        RunStatus::Fail => Err(PluginManagerError::ExecuteFailed(format!(
            "Execute plugin failed, err: {}",
            outcome.error.unwrap_or_default()
        ))),
        RunStatus::Timeout => Err(PluginManagerError::ExecuteTimeout(format!(
            "Execute plugin timeout, timeout[{timeout_secs}] err: {}",
            outcome.error.unwrap_or_default()
        ))),
    }
}

/// Sends a single-plugin health report.
pub async fn report_status<C>(
    control_plane: &C,
    name: &str,
    version: &str,
    status: PluginStatusKind,
) -> anyhow::Result<()>
where
    C: ControlPlane + ?Sized,
{
    let request = PluginStatusRequest {
        os: platform::current_os_type().to_string(),
        arch: platform::current_arch().to_string(),
        plugin: vec![PluginStatus::new(name, version, status)],
    };
    control_plane.report_plugin_status(&request).await?;
    Ok(())
}

/// Runs `--status` quietly and reports the result. A check that could not
/// run at all yields `PERSIST_UNKNOWN` and is not reported.
pub async fn check_and_report<S, C>(
    supervisor: &S,
    control_plane: &C,
    fetched: &Fetched,
    timeout_secs: u64,
) -> (PluginStatusKind, anyhow::Result<()>)
where
    S: ProcessSupervisor + ?Sized,
    C: ControlPlane + ?Sized,
{
    let run = PluginRun {
        args: vec![STATUS_ARG.to_string()],
        timeout_secs,
        env: plugin_env(fetched),
        output: OutputMode::Null,
        run_as: None,
    };
    let status = match run_plugin(supervisor, &fetched.entrypoint, run).await {
        Ok(0) => PluginStatusKind::PersistRunning,
        Ok(_) => PluginStatusKind::PersistFail,
        Err(err) => {
            return (
                PluginStatusKind::PersistUnknown,
                Err(anyhow::Error::new(err).context("status check did not run")),
            );
        }
    };
    let reported = report_status(
        control_plane,
        &fetched.plugin_name,
        &fetched.plugin_version,
        status,
    )
    .await;
    (status, reported)
}
