use std::sync::Arc;

use crate::application::use_cases::plugins::errors::PluginManagerError;
use crate::application::use_cases::plugins::exec::ExecutePlugin;
use crate::application::use_cases::plugins::install::DOWNLOAD_RETRY_DELAY;
use crate::application::use_cases::plugins::list::{ListPlugins, render_table};
use crate::application::use_cases::plugins::remove::{RemoveOutcome, RemovePlugin};
use crate::application::use_cases::plugins::status::ShowPluginStatus;
use crate::application::use_cases::plugins::verify::VerifyPlugin;
use crate::bootstrap::app_context::AppContext;
use crate::infrastructure::plugins::event_publisher_broadcast::spawn_event_logger;
use crate::presentation::cli::args::Cli;
use crate::presentation::cli::prompt::StdinConfirmPrompt;

/// Exit code for usage errors (missing action or required flag).
pub const USAGE_ERR: i32 = 2;

/// Runs the selected action and returns the process exit code.
pub async fn run(cli: &Cli, ctx: &AppContext) -> anyhow::Result<i32> {
    if let Some(missing) = missing_flag(cli) {
        eprintln!("{missing} is required");
        return Ok(USAGE_ERR);
    }
    let result = if cli.list {
        list(cli, ctx).await
    } else if cli.verify {
        verify(cli, ctx).await
    } else if cli.status {
        status(ctx).await
    } else if cli.exec {
        exec(cli, ctx).await
    } else if cli.remove {
        remove(cli, ctx).await
    } else if cli.agent {
        return agent(ctx).await.map(|_| 0);
    } else {
        eprintln!("one of --list, --verify, --status, --exec, --remove or --agent is required");
        return Ok(USAGE_ERR);
    };
    Ok(match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err}");
            err.exit_code()
        }
    })
}

fn missing_flag(cli: &Cli) -> Option<&'static str> {
    let empty = |v: &Option<String>| v.as_deref().is_none_or(str::is_empty);
    if cli.verify && empty(&cli.url) {
        Some("--url")
    } else if (cli.remove || (cli.exec && cli.file.is_none())) && empty(&cli.plugin) {
        Some("--plugin")
    } else {
        None
    }
}

async fn list(cli: &Cli, ctx: &AppContext) -> Result<i32, PluginManagerError> {
    let registry = ctx.registry();
    let control_plane = ctx.control_plane();
    let plugins = ListPlugins {
        registry: registry.as_ref(),
        control_plane: control_plane.as_ref(),
    }
    .execute(cli.plugin.as_deref(), cli.local)
    .await?;
    println!("{}", render_table(&plugins));
    Ok(0)
}

async fn verify(cli: &Cli, ctx: &AppContext) -> Result<i32, PluginManagerError> {
    let url = cli.url.as_deref().unwrap_or_default();
    let packages = ctx.packages();
    let fetcher = ctx.fetcher();
    let supervisor = ctx.supervisor();
    VerifyPlugin {
        packages: packages.as_ref(),
        fetcher: fetcher.as_ref(),
        supervisor: supervisor.as_ref(),
    }
    .execute(
        url,
        cli.fetch_timeout.unwrap_or(ctx.cfg.fetch_timeout_secs),
        &cli.execute_params(),
    )
    .await
}

async fn status(ctx: &AppContext) -> Result<i32, PluginManagerError> {
    let registry = ctx.registry();
    let packages = ctx.packages();
    let locks = ctx.locks();
    let supervisor = ctx.supervisor();
    let statuses = ShowPluginStatus {
        registry: registry.as_ref(),
        packages: packages.as_ref(),
        locks: locks.as_ref(),
        supervisor: supervisor.as_ref(),
    }
    .execute()
    .await?;
    let json = serde_json::to_string(&statuses)
        .map_err(|e| PluginManagerError::ExecuteFailed(format!("encode status: {e}")))?;
    println!("{json}");
    Ok(0)
}

async fn exec(cli: &Cli, ctx: &AppContext) -> Result<i32, PluginManagerError> {
    let registry = ctx.registry();
    let packages = ctx.packages();
    let fetcher = ctx.fetcher();
    let locks = ctx.locks();
    let control_plane = ctx.control_plane();
    let supervisor = ctx.supervisor();
    let events = ctx.plugin_event_publisher();
    ExecutePlugin {
        registry: registry.as_ref(),
        packages: packages.as_ref(),
        fetcher: fetcher.as_ref(),
        locks: locks.as_ref(),
        control_plane: control_plane.as_ref(),
        supervisor: supervisor.as_ref(),
        events: events.as_ref(),
        prompt: &StdinConfirmPrompt,
        assume_yes: cli.yes,
        download_retry_delay: DOWNLOAD_RETRY_DELAY,
    }
    .execute(
        &cli.fetch_options(ctx.cfg.fetch_timeout_secs),
        &cli.execute_params(),
    )
    .await
}

async fn remove(cli: &Cli, ctx: &AppContext) -> Result<i32, PluginManagerError> {
    let name = cli.plugin.as_deref().unwrap_or_default();
    let registry = ctx.registry();
    let packages = ctx.packages();
    let locks = ctx.locks();
    let control_plane = ctx.control_plane();
    let supervisor = ctx.supervisor();
    let outcome = RemovePlugin {
        registry: registry.as_ref(),
        packages: packages.as_ref(),
        locks: locks.as_ref(),
        control_plane: control_plane.as_ref(),
        supervisor: supervisor.as_ref(),
    }
    .execute(name, cli.purge)
    .await?;
    Ok(match outcome {
        RemoveOutcome::Removed => 0,
        RemoveOutcome::UninstallRefused(code) => code,
    })
}

async fn agent(ctx: &AppContext) -> anyhow::Result<()> {
    let events = spawn_event_logger(ctx.subscribe_plugin_events());
    let monitor = ctx.health_monitor();
    let (scan, pull) = monitor.spawn();
    let updates = Arc::new(ctx.update_checker()).spawn();
    tracing::info!(
        scan_interval_secs = ctx.cfg.health_scan_interval_secs,
        pull_interval_secs = ctx.cfg.health_pull_interval_secs,
        update_check_interval_secs = ctx.cfg.update_check_interval_secs,
        "plugin_agent_started"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("plugin_agent_stopping");
    for handle in [scan, pull, updates, events] {
        handle.abort();
    }
    Ok(())
}
