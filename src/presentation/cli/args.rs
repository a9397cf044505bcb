use std::path::PathBuf;

use clap::{ArgGroup, Parser};

use crate::application::use_cases::plugins::exec::FetchOptions;
use crate::application::use_cases::plugins::params::ExecuteParams;

/// Plugin manager of the instance agent.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "plugin-agent", version)]
#[command(about = "Install, run and health-monitor instance plugins")]
#[command(group(
    ArgGroup::new("action")
        .args(["list", "verify", "status", "exec", "remove", "agent"])
        .multiple(false)
))]
pub struct Cli {
    /// List plugins from the catalog (or the registry with --local)
    #[arg(long)]
    pub list: bool,

    /// Download a package from --url and run it without installing
    #[arg(long)]
    pub verify: bool,

    /// Print the status of every persistent plugin as JSON
    #[arg(long)]
    pub status: bool,

    /// Install if needed, then run a plugin
    #[arg(long)]
    pub exec: bool,

    /// Uninstall a plugin
    #[arg(long)]
    pub remove: bool,

    /// Run the health and update-check loops until interrupted
    #[arg(long)]
    pub agent: bool,

    /// Only use the installed registry
    #[arg(long)]
    pub local: bool,

    #[arg(long)]
    pub plugin: Option<String>,

    #[arg(long = "pluginId")]
    pub plugin_id: Option<String>,

    #[arg(long = "pluginVersion")]
    pub plugin_version: Option<String>,

    /// Plugin arguments joined by --separator
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub params: String,

    #[arg(long, default_value = ",")]
    pub separator: String,

    /// Plugin arguments with shell-style quoting; wins over --params
    #[arg(long = "paramsV2", default_value = "", allow_hyphen_values = true)]
    pub params_v2: String,

    #[arg(long)]
    pub url: Option<String>,

    /// Local package archive
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Download/unpack timeout in seconds
    #[arg(long = "fetchTimeout")]
    pub fetch_timeout: Option<u64>,

    /// Execution timeout in seconds, overriding the plugin's own
    #[arg(long)]
    pub timeout: Option<u64>,

    /// With --remove, drop the registry record instead of marking it removed
    #[arg(long)]
    pub purge: bool,

    /// Answer yes to the reinstall confirmation
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,

    /// Run the plugin as this local user
    #[arg(long = "runAs")]
    pub run_as: Option<String>,
}

impl Cli {
    pub fn execute_params(&self) -> ExecuteParams {
        ExecuteParams {
            params: self.params.clone(),
            separator: self.separator.clone(),
            params_v2: self.params_v2.clone(),
            timeout_override_secs: self.timeout,
            run_as: self.run_as.clone().filter(|u| !u.is_empty()),
        }
    }

    pub fn fetch_options(&self, default_fetch_timeout_secs: u64) -> FetchOptions {
        FetchOptions {
            file: self.file.clone(),
            plugin_name: self.plugin.clone().unwrap_or_default(),
            plugin_id: self.plugin_id.clone().filter(|s| !s.is_empty()),
            version: self.plugin_version.clone().filter(|s| !s.is_empty()),
            local: self.local,
            fetch_timeout_secs: self.fetch_timeout.unwrap_or(default_fetch_timeout_secs),
        }
    }
}
