use std::time::Duration;

use anyhow::anyhow;

use crate::application::ports::plugin_package_fetcher::PluginPackageFetcher;
use crate::application::ports::plugin_package_store::{PackageError, PluginPackageStore};
use crate::application::ports::process_supervisor::{OutputMode, ProcessSupervisor};
use crate::application::use_cases::plugins::errors::PluginManagerError;
use crate::application::use_cases::plugins::install::{
    check_platform, ensure_executable, unpack_archive,
};
use crate::application::use_cases::plugins::params::ExecuteParams;
use crate::application::use_cases::plugins::runner::{
    ENV_PLUGIN_DIR, ENV_PRE_PLUGIN_DIR, PluginRun, run_plugin,
};
use crate::domain::plugins::manifest::{DEFAULT_TIMEOUT_SECS, MANIFEST_FILE};

pub const VERIFY_DIR: &str = "verify_plugin_test";

/// Downloads a package into a scratch directory and runs it without
/// touching the registry.
pub struct VerifyPlugin<'a> {
    pub packages: &'a dyn PluginPackageStore,
    pub fetcher: &'a dyn PluginPackageFetcher,
    pub supervisor: &'a dyn ProcessSupervisor,
}

impl<'a> VerifyPlugin<'a> {
    pub async fn execute(
        &self,
        url: &str,
        fetch_timeout_secs: u64,
        params: &ExecuteParams,
    ) -> Result<i32, PluginManagerError> {
        let file_name = url.rsplit('/').next().unwrap_or(url);
        let archive = self.packages.download_path(file_name);
        let dir = self.packages.plugin_root().join(VERIFY_DIR);
        let fetch_timeout = Duration::from_secs(fetch_timeout_secs);

        tracing::info!(url, dest = %archive.display(), "verify_plugin_download");
        let download = self.fetcher.fetch(url, &archive);
        let downloaded = if fetch_timeout.is_zero() {
            download.await
        } else {
            tokio::time::timeout(fetch_timeout, download)
                .await
                .unwrap_or_else(|_| Err(anyhow!("download timed out after {fetch_timeout_secs}s")))
        };
        downloaded.map_err(|source| PluginManagerError::Download {
            tip: format!("Downloading package failed, url is [{url}], err is [{source:#}]"),
            source,
        })?;

        unpack_archive(self.packages, &archive, &dir, fetch_timeout).await?;
        if let Err(err) = self.packages.remove_path(&archive).await {
            tracing::warn!(error = ?err, path = %archive.display(), "verify_archive_cleanup_failed");
        }

        let manifest = self.packages.read_manifest(&dir).await.map_err(|err| match err {
            PackageError::Unmarshal(source) => PluginManagerError::Unmarshal {
                tip: format!("Unmarshal config.json err, url is [{url}]"),
                source,
            },
            _ => PluginManagerError::PluginFormat(format!(
                "File config.json not exist, {}.",
                dir.join(MANIFEST_FILE).display()
            )),
        })?;
        check_platform(&manifest.os_type, &manifest.arch)?;

        let entrypoint = dir.join(&manifest.run_path);
        ensure_executable(self.packages, &entrypoint).await?;

        let manifest_timeout = manifest.timeout_secs().unwrap_or_else(|| {
            tracing::warn!(timeout = manifest.timeout.as_str(), "verify_manifest_timeout_invalid");
            DEFAULT_TIMEOUT_SECS
        });
        let run = PluginRun {
            args: params.split_args()?,
            timeout_secs: params.execution_timeout(manifest_timeout),
            env: vec![
                (ENV_PLUGIN_DIR.to_string(), dir.to_string_lossy().into_owned()),
                (ENV_PRE_PLUGIN_DIR.to_string(), String::new()),
            ],
            output: OutputMode::Inherit,
            run_as: params.run_as.clone(),
        };
        run_plugin(self.supervisor, &entrypoint, run).await
    }
}
