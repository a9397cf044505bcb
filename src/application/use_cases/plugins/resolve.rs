use std::path::Path;

use crate::application::dto::plugins::{Fetched, PluginListRequest};
use crate::application::ports::control_plane::ControlPlane;
use crate::application::ports::installed_plugin_store::InstalledPluginStore;
use crate::application::ports::plugin_package_store::PluginPackageStore;
use crate::application::use_cases::plugins::errors::PluginManagerError;
use crate::domain::plugins::platform::{self, arch_matches};
use crate::domain::plugins::{PluginInfo, compare_version};

pub fn fetched_from_record(plugin_root: &Path, info: &PluginInfo) -> Fetched {
    let dir = info.install_dir(plugin_root);
    Fetched {
        plugin_name: info.name.clone(),
        plugin_version: info.version.clone(),
        plugin_type: info.plugin_type(),
        entrypoint: dir.join(&info.run_path),
        execution_timeout_secs: info.timeout_secs(),
        env_plugin_dir: dir,
        env_pre_plugin_dir: None,
    }
}

/// Installed, non-removed record for `name` (optionally pinned to a
/// version) resolved to its entrypoint.
pub async fn query_local_only<S>(
    registry: &S,
    plugin_root: &Path,
    name: &str,
    version: Option<&str>,
) -> Result<Fetched, PluginManagerError>
where
    S: InstalledPluginStore + ?Sized,
{
    let plugins = registry
        .load()
        .await
        .map_err(PluginManagerError::LoadInstalledPlugins)?;
    let (_, info) = plugins
        .find_one_not_removed_by_name_and_optional_version(name, version)
        .ok_or_else(|| {
            PluginManagerError::PackageNotFound(format!("Could not found local package [{name}]"))
        })?;
    Ok(fetched_from_record(plugin_root, info))
}

/// Best catalog match for this machine plus the arches of entries that were
/// skipped for not matching.
#[derive(Debug, Default)]
pub struct OnlineCandidate {
    pub matched: Option<PluginInfo>,
    pub other_arches: Vec<String>,
}

#[derive(Debug)]
pub enum Resolution {
    /// Already installed and current.
    Local(Fetched),
    /// Needs to be downloaded and installed from the catalog.
    Online(PluginInfo),
}

pub struct ResolvePlugin<'a, S, P, C>
where
    S: InstalledPluginStore + ?Sized,
    P: PluginPackageStore + ?Sized,
    C: ControlPlane + ?Sized,
{
    pub registry: &'a S,
    pub packages: &'a P,
    pub control_plane: &'a C,
}

impl<'a, S, P, C> ResolvePlugin<'a, S, P, C>
where
    S: InstalledPluginStore + ?Sized,
    P: PluginPackageStore + ?Sized,
    C: ControlPlane + ?Sized,
{
    pub async fn local_only(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<Fetched, PluginManagerError> {
        query_local_only(self.registry, &self.packages.plugin_root(), name, version).await
    }

    /// Local record when it matches the catalog version (or the catalog has
    /// nothing), otherwise the catalog entry to install.
    pub async fn online_or_local(
        &self,
        name: &str,
        plugin_id: Option<&str>,
        version: Option<&str>,
    ) -> Result<Resolution, PluginManagerError> {
        let plugins = self
            .registry
            .load()
            .await
            .map_err(PluginManagerError::LoadInstalledPlugins)?;
        let local = plugins
            .find_one_not_removed_by_name_and_optional_version(name, version)
            .map(|(_, info)| info.clone());

        let online = self
            .online_candidate(name, plugin_id, version)
            .await
            .map_err(PluginManagerError::GetOnlinePackageInfo)?;

        match (local, online.matched) {
            (Some(local), Some(remote)) => {
                if compare_version(&local.version, &remote.version).is_eq() {
                    tracing::info!(
                        plugin = name,
                        version = local.version.as_str(),
                        "local_version_matches_online"
                    );
                    Ok(Resolution::Local(fetched_from_record(
                        &self.packages.plugin_root(),
                        &local,
                    )))
                } else {
                    tracing::info!(
                        plugin = name,
                        local_version = local.version.as_str(),
                        online_version = remote.version.as_str(),
                        "local_version_differs_from_online"
                    );
                    Ok(Resolution::Online(remote))
                }
            }
            (Some(local), None) => Ok(Resolution::Local(fetched_from_record(
                &self.packages.plugin_root(),
                &local,
            ))),
            (None, Some(remote)) => Ok(Resolution::Online(remote)),
            (None, None) => {
                let version = version.unwrap_or_default();
                let tip = if online.other_arches.is_empty() {
                    format!(
                        "Could not found both local and online, package[{name}] version[{version}]"
                    )
                } else {
                    format!(
                        "Could not found local package[{name}] version[{version}], found online package but it`s arch[{}] not match local_arch[{}]",
                        online.other_arches.join(", "),
                        platform::current_arch()
                    )
                };
                Err(PluginManagerError::PackageNotFound(tip))
            }
        }
    }

    /// Queries the catalog for every arch and keeps the highest version
    /// among entries compatible with this machine.
    pub async fn online_candidate(
        &self,
        name: &str,
        plugin_id: Option<&str>,
        version: Option<&str>,
    ) -> anyhow::Result<OnlineCandidate> {
        let request = PluginListRequest {
            os_type: platform::current_os_type().to_string(),
            plugin_name: name.to_string(),
            version: version.unwrap_or_default().to_string(),
            arch: String::new(),
        };
        let list = self.control_plane.list_plugins(&request).await?;
        Ok(select_candidate(
            list,
            name,
            plugin_id,
            platform::current_arch(),
        ))
    }
}

pub(crate) fn select_candidate(
    list: Vec<PluginInfo>,
    name: &str,
    plugin_id: Option<&str>,
    local_arch: &str,
) -> OnlineCandidate {
    let mut candidate = OnlineCandidate::default();
    for mut plugin in list {
        if plugin.name != name {
            continue;
        }
        if let Some(id) = plugin_id.filter(|id| !id.is_empty()) {
            if plugin.plugin_id != id {
                continue;
            }
        }
        plugin.arch = plugin.arch.to_ascii_lowercase();
        if !arch_matches(&plugin.arch, local_arch) {
            candidate.other_arches.push(plugin.arch);
            continue;
        }
        let newer = candidate
            .matched
            .as_ref()
            .is_none_or(|best| compare_version(&plugin.version, &best.version).is_gt());
        if newer {
            candidate.matched = Some(plugin);
        }
    }
    candidate
}
