use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use async_trait::async_trait;

use crate::application::ports::installed_plugin_store::{InstalledPluginStore, RegistryError};
use crate::domain::plugins::InstalledPlugins;

pub const INSTALLED_PLUGINS_FILE: &str = "installed_plugins";

/// Registry persisted as one JSON document. Saves go through a temp file
/// in the same directory and a rename, so readers never see a torn file.
pub struct JsonInstalledPluginStore {
    path: PathBuf,
}

impl JsonInstalledPluginStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn under_root(plugin_root: &Path) -> Self {
        Self::new(plugin_root.join(INSTALLED_PLUGINS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save_blocking(path: &Path, body: &[u8]) -> anyhow::Result<()> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .map_err(|e| anyhow!(e.error))
            .with_context(|| format!("replace {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl InstalledPluginStore for JsonInstalledPluginStore {
    async fn load(&self) -> Result<InstalledPlugins, RegistryError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(InstalledPlugins::default());
            }
            Err(err) => {
                return Err(RegistryError::Load(
                    anyhow!(err).context(format!("read {}", self.path.display())),
                ));
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(InstalledPlugins::default());
        }
        serde_json::from_slice(&bytes).map_err(|err| {
            RegistryError::Load(anyhow!(err).context(format!("parse {}", self.path.display())))
        })
    }

    async fn save(&self, plugins: &InstalledPlugins) -> Result<(), RegistryError> {
        let body = serde_json::to_vec_pretty(plugins).map_err(|e| RegistryError::Save(anyhow!(e)))?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::save_blocking(&path, &body))
            .await
            .map_err(|e| RegistryError::Save(anyhow!(e)))?
            .map_err(RegistryError::Save)?;
        tracing::debug!(path = %self.path.display(), plugins = plugins.plugin_list.len(), "installed_plugins_saved");
        Ok(())
    }
}
