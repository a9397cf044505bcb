use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::anyhow;

use crate::application::dto::plugins::Fetched;
use crate::application::ports::installed_plugin_store::InstalledPluginStore;
use crate::application::ports::lock_manager::{InstallLock, LockManager};
use crate::application::ports::plugin_package_fetcher::PluginPackageFetcher;
use crate::application::ports::plugin_package_store::{PackageError, PluginPackageStore};
use crate::application::use_cases::plugins::errors::PluginManagerError;
use crate::application::use_cases::plugins::resolve::query_local_only;
use crate::domain::plugins::manifest::{DEFAULT_TIMEOUT_SECS, is_valid_path_identity};
use crate::domain::plugins::platform::{self, arch_matches, os_matches};
use crate::domain::plugins::{PluginInfo, PluginManifest};

pub const DOWNLOAD_ATTEMPTS: u32 = 3;
pub const DOWNLOAD_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Installs plugin packages into `<root>/<name>/<version>` and commits the
/// registry record. Every install runs under the version lock so that at
/// most one process unpacks and writes a given (name, version).
pub struct InstallPlugin<'a> {
    pub registry: &'a dyn InstalledPluginStore,
    pub packages: &'a dyn PluginPackageStore,
    pub fetcher: &'a dyn PluginPackageFetcher,
    pub locks: &'a dyn LockManager,
    /// Bounds download plus unpack, and the wait for a concurrent installer.
    pub fetch_timeout: Duration,
    pub retry_delay: Duration,
}

impl<'a> InstallPlugin<'a> {
    /// Validates a local archive and reads its manifest without unpacking.
    pub async fn inspect_package(&self, archive: &Path) -> Result<PluginManifest, PluginManagerError> {
        if !tokio::fs::try_exists(archive).await.unwrap_or(false) {
            return Err(PluginManagerError::PackageNotFound(format!(
                "Package file not exist: {}",
                archive.display()
            )));
        }
        let is_zip = archive
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
        if !is_zip {
            return Err(PluginManagerError::PackageFormat(format!(
                "Package file isn`t a zip file: {}",
                archive.display()
            )));
        }

        let manifest = self
            .packages
            .peek_manifest(archive)
            .await
            .map_err(|err| match err {
                PackageError::NotZip(_) => PluginManagerError::PackageFormat(format!(
                    "Package file isn`t a zip file: {}",
                    archive.display()
                )),
                PackageError::ManifestMissing => PluginManagerError::PluginFormat(format!(
                    "Manifest file config.json does not exist in {}.",
                    archive.display()
                )),
                PackageError::Unmarshal(source) => PluginManagerError::Unmarshal {
                    tip: format!("Unmarshal config.json err, package is [{}]", archive.display()),
                    source,
                },
                other => PluginManagerError::Unzip {
                    tip: format!(
                        "Unzip err, file is [{}], target file is [config.json], err is [{other}]",
                        archive.display()
                    ),
                    source: other.into(),
                },
            })?;

        if manifest.name.trim().is_empty() {
            return Err(PluginManagerError::PluginFormat(format!(
                "Plugin name is empty in config.json of {}",
                archive.display()
            )));
        }
        if !is_valid_path_identity(&manifest.name, &manifest.version) {
            return Err(PluginManagerError::PluginFormat(format!(
                "Invalid plugin name[{}] or version[{}] in config.json of {}",
                manifest.name,
                manifest.version,
                archive.display()
            )));
        }
        check_platform(&manifest.os_type, &manifest.arch)?;
        Ok(manifest)
    }

    /// Installs `archive` under the version lock. When another process is
    /// already installing the same version, waits for it and reuses its
    /// result. `reinstall` forces a fresh unpack even if the version is
    /// already registered.
    pub async fn install_from_file(
        &self,
        archive: &Path,
        manifest: &PluginManifest,
        reinstall: bool,
    ) -> Result<Fetched, PluginManagerError> {
        let root = self.packages.plugin_root();
        let lock = self
            .locks
            .acquire_install_lock(&manifest.name, &manifest.version, self.fetch_timeout)
            .await?;
        match lock {
            InstallLock::Exclusive(_guard) => {
                if !reinstall {
                    match query_local_only(self.registry, &root, &manifest.name, Some(&manifest.version)).await {
                        Ok(fetched) => {
                            tracing::info!(
                                plugin = manifest.name.as_str(),
                                version = manifest.version.as_str(),
                                "plugin_installed_by_another_process"
                            );
                            return Ok(fetched);
                        }
                        Err(err) if !err.is_package_not_found() => return Err(err),
                        Err(_) => {}
                    }
                }
                self.commit_file(archive, manifest).await
            }
            InstallLock::Shared(_guard) => {
                query_local_only(self.registry, &root, &manifest.name, Some(&manifest.version)).await
            }
        }
    }

    /// Downloads and installs a catalog entry under the version lock.
    pub async fn install_online(&self, info: PluginInfo) -> Result<Fetched, PluginManagerError> {
        let root = self.packages.plugin_root();
        let lock = self
            .locks
            .acquire_install_lock(&info.name, &info.version, self.fetch_timeout)
            .await?;
        match lock {
            InstallLock::Exclusive(_guard) => {
                match query_local_only(self.registry, &root, &info.name, Some(&info.version)).await {
                    Ok(fetched) => return Ok(fetched),
                    Err(err) if !err.is_package_not_found() => return Err(err),
                    Err(_) => {}
                }
                self.commit_online(info).await
            }
            InstallLock::Shared(_guard) => {
                query_local_only(self.registry, &root, &info.name, Some(&info.version)).await
            }
        }
    }

    async fn commit_file(
        &self,
        archive: &Path,
        manifest: &PluginManifest,
    ) -> Result<Fetched, PluginManagerError> {
        let root = self.packages.plugin_root();
        let snapshot = self
            .registry
            .load()
            .await
            .map_err(PluginManagerError::LoadInstalledPlugins)?;

        let (mut record, pre_dir) = match snapshot.find_one_by_name(&manifest.name) {
            Some((_, info)) if !info.is_removed => (info.clone(), Some(info.install_dir(&root))),
            _ => (fresh_record(), None),
        };
        let reuse_id = pre_dir.is_some();

        record.apply_manifest(manifest);
        record.url = "local".into();
        record.is_removed = false;
        record.md5 = self.packages.md5_hex(archive).await.map_err(|err| {
            PluginManagerError::Md5Check(format!("Compute md5 of plugin file err: {err:#}"))
        })?;

        let dir = self.packages.install_dir(&record.name, &record.version);
        unpack_archive(self.packages, archive, &dir, self.fetch_timeout).await?;
        let entrypoint = dir.join(&record.run_path);
        ensure_executable(self.packages, &entrypoint).await?;

        if !reuse_id || record.plugin_id.is_empty() {
            record.plugin_id = PluginInfo::local_id(&record.name, &record.version);
        }
        let fetched = Fetched {
            plugin_name: record.name.clone(),
            plugin_version: record.version.clone(),
            plugin_type: record.plugin_type(),
            entrypoint,
            execution_timeout_secs: manifest.timeout_secs().unwrap_or(DEFAULT_TIMEOUT_SECS),
            env_plugin_dir: dir,
            env_pre_plugin_dir: pre_dir,
        };
        upsert_by_name(self.registry, record).await?;

        tracing::info!(
            plugin = fetched.plugin_name.as_str(),
            version = fetched.plugin_version.as_str(),
            "install_from_file_committed"
        );
        Ok(fetched)
    }

    async fn commit_online(&self, mut info: PluginInfo) -> Result<Fetched, PluginManagerError> {
        if !is_valid_path_identity(&info.name, &info.version) {
            return Err(PluginManagerError::PluginFormat(format!(
                "Invalid plugin name[{}] or version[{}] from catalog",
                info.name, info.version
            )));
        }
        let root = self.packages.plugin_root();
        let archive = self.packages.download_path(&format!("{}.zip", info.name));

        tracing::info!(url = info.url.as_str(), dest = %archive.display(), "plugin_download_started");
        self.download(&info.url, &archive)
            .await
            .map_err(|source| PluginManagerError::Download {
                tip: format!(
                    "Downloading package failed, plugin.Url is [{}], err is [{source:#}]",
                    info.url
                ),
                source,
            })?;

        let checksum = self.packages.md5_hex(&archive).await.map_err(|err| {
            PluginManagerError::Md5Check(format!(
                "Compute md5 of plugin file[{}] err, plugin.Url is [{}], err is [{err:#}]",
                archive.display(),
                info.url
            ))
        })?;
        if !checksum.eq_ignore_ascii_case(&info.md5) {
            tracing::error!(
                expected = info.md5.as_str(),
                actual = checksum.as_str(),
                "plugin_md5_mismatch"
            );
            return Err(PluginManagerError::Md5Check(format!(
                "Md5 not match, onlineInfo.Md5 is [{}], real md5 is [{checksum}], plugin.Url is [{}]",
                info.md5, info.url
            )));
        }

        let dir = self.packages.install_dir(&info.name, &info.version);
        unpack_archive(self.packages, &archive, &dir, self.fetch_timeout).await?;
        if let Err(err) = self.packages.remove_path(&archive).await {
            tracing::warn!(error = ?err, path = %archive.display(), "plugin_archive_cleanup_failed");
        }

        let manifest = self.packages.read_manifest(&dir).await.map_err(|err| match err {
            PackageError::Unmarshal(source) => PluginManagerError::Unmarshal {
                tip: format!("Unmarshal config.json err, dir is [{}]", dir.display()),
                source,
            },
            _ => PluginManagerError::PluginFormat(format!(
                "File config.json not exist, {}.",
                dir.join("config.json").display()
            )),
        })?;
        if manifest.plugin_type != info.plugin_type() {
            return Err(PluginManagerError::PluginFormat(format!(
                "config.PluginType[{}] not match to pluginType[{}]",
                manifest.plugin_type,
                info.plugin_type()
            )));
        }
        // The catalog carries no heartbeat interval; the package is authoritative.
        info.heartbeat_interval = manifest.effective_heartbeat_interval();
        info.plugin_type = manifest.plugin_type;
        info.is_removed = false;

        check_platform(&info.os_type, &info.arch)?;
        let entrypoint = dir.join(&manifest.run_path);
        ensure_executable(self.packages, &entrypoint).await?;

        let mut plugins = self
            .registry
            .load()
            .await
            .map_err(PluginManagerError::LoadInstalledPlugins)?;
        let existing = plugins
            .find_one_by_name(&info.name)
            .map(|(index, record)| (index, record.clone()));
        let mut pre_dir = None;
        match existing {
            Some((index, record)) => {
                if !record.is_removed {
                    pre_dir = Some(record.install_dir(&root));
                }
                plugins
                    .update(index, info)
                    .map_err(|err| PluginManagerError::DumpInstalledPlugins(err.into()))?;
            }
            None => {
                plugins.insert(info);
            }
        }
        self.registry
            .save(&plugins)
            .await
            .map_err(PluginManagerError::DumpInstalledPlugins)?;

        tracing::info!(
            plugin = manifest.name.as_str(),
            version = manifest.version.as_str(),
            "install_from_online_committed"
        );
        Ok(Fetched {
            plugin_name: manifest.name.clone(),
            plugin_version: manifest.version.clone(),
            plugin_type: manifest.plugin_type,
            entrypoint,
            execution_timeout_secs: manifest.timeout_secs().unwrap_or(DEFAULT_TIMEOUT_SECS),
            env_plugin_dir: self.packages.install_dir(&manifest.name, &manifest.version),
            env_pre_plugin_dir: pre_dir,
        })
    }

    async fn download(&self, url: &str, dest: &Path) -> anyhow::Result<()> {
        let attempts = async {
            let mut last_err = None;
            for attempt in 1..=DOWNLOAD_ATTEMPTS {
                match self.fetcher.fetch(url, dest).await {
                    Ok(()) => return Ok(()),
                    Err(err) => {
                        tracing::warn!(error = ?err, url, attempt, "plugin_download_attempt_failed");
                        last_err = Some(err);
                    }
                }
                if attempt < DOWNLOAD_ATTEMPTS {
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
            Err(last_err.unwrap_or_else(|| anyhow!("download was not attempted")))
        };
        if self.fetch_timeout.is_zero() {
            return attempts.await;
        }
        tokio::time::timeout(self.fetch_timeout, attempts)
            .await
            .map_err(|_| anyhow!("download timed out after {}s", self.fetch_timeout.as_secs()))?
    }
}

/// Unpacks `archive` into `dest`, bounded by `timeout` (zero waits forever).
pub async fn unpack_archive<P>(
    packages: &P,
    archive: &Path,
    dest: &Path,
    timeout: Duration,
) -> Result<(), PluginManagerError>
where
    P: PluginPackageStore + ?Sized,
{
    let tip = |err: &dyn std::fmt::Display| {
        format!(
            "Unzip err, file is [{}], target dir is [{}], err is [{err}]",
            archive.display(),
            dest.display()
        )
    };
    let unpack = packages.install_archive(archive, dest);
    let result = if timeout.is_zero() {
        unpack.await
    } else {
        match tokio::time::timeout(timeout, unpack).await {
            Ok(result) => result,
            Err(_) => {
                let source = anyhow!("unpacking timed out after {}s", timeout.as_secs());
                return Err(PluginManagerError::Unzip {
                    tip: tip(&source),
                    source,
                });
            }
        }
    };
    result.map_err(|err| PluginManagerError::Unzip {
        tip: tip(&err),
        source: err.into(),
    })
}

/// Checks that the entrypoint exists and marks it executable.
pub async fn ensure_executable<P>(packages: &P, entrypoint: &Path) -> Result<(), PluginManagerError>
where
    P: PluginPackageStore + ?Sized,
{
    if !tokio::fs::try_exists(entrypoint).await.unwrap_or(false) {
        tracing::info!(path = %entrypoint.display(), "plugin_entrypoint_missing");
        return Err(PluginManagerError::PluginFormat(format!(
            "Executable file not exist, {}.",
            entrypoint.display()
        )));
    }
    packages
        .make_executable(entrypoint)
        .await
        .map_err(|source| PluginManagerError::ExecutablePermission {
            tip: format!("Make plugin file executable err: {source:#}"),
            source,
        })
}

/// Reloads the registry and writes `record` over the entry with the same
/// name, or appends it. The reload keeps writes made by other processes
/// while this one was unpacking.
pub async fn upsert_by_name<S>(registry: &S, record: PluginInfo) -> Result<(), PluginManagerError>
where
    S: InstalledPluginStore + ?Sized,
{
    let mut plugins = registry
        .load()
        .await
        .map_err(PluginManagerError::LoadInstalledPlugins)?;
    let index = plugins.find_one_by_name(&record.name).map(|(index, _)| index);
    match index {
        Some(index) => plugins
            .update(index, record)
            .map_err(|err| PluginManagerError::DumpInstalledPlugins(err.into()))?,
        None => {
            plugins.insert(record);
        }
    }
    registry
        .save(&plugins)
        .await
        .map_err(PluginManagerError::DumpInstalledPlugins)
}

fn fresh_record() -> PluginInfo {
    PluginInfo {
        timeout: DEFAULT_TIMEOUT_SECS.to_string(),
        ..Default::default()
    }
}

/// Rejects packages declared for another OS or architecture.
pub fn check_platform(os_type: &str, arch: &str) -> Result<(), PluginManagerError> {
    let local_os = platform::current_os_type();
    if !os_matches(os_type, local_os) {
        return Err(PluginManagerError::PluginFormat(format!(
            "Plugin ostype[{os_type}] not suit for this system[{local_os}]"
        )));
    }
    let local_arch = platform::current_arch();
    if !arch_matches(arch, local_arch) {
        return Err(PluginManagerError::PluginFormat(format!(
            "Plugin arch[{arch}] not suit for this system[{local_arch}]"
        )));
    }
    Ok(())
}

/// Install directory of the currently registered, non-removed version of
/// `name`, used as `PRE_PLUGIN_DIR` during upgrades.
pub fn previous_install_dir(root: &Path, current: Option<&PluginInfo>) -> Option<PathBuf> {
    current
        .filter(|info| !info.is_removed)
        .map(|info| info.install_dir(root))
}
