use async_trait::async_trait;

use crate::domain::plugins::InstalledPlugins;
use crate::domain::plugins::installed_plugins::IndexOutOfRange;

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("failed to load installed plugins")]
    Load(#[source] anyhow::Error),
    #[error("failed to save installed plugins")]
    Save(#[source] anyhow::Error),
    #[error(transparent)]
    Index(#[from] IndexOutOfRange),
}

/// Whole-document persistence for the installed-plugin registry.
///
/// Every call reads or rewrites the full document; callers hold the
/// plugin-version lock across load → mutate → save.
#[async_trait]
pub trait InstalledPluginStore: Send + Sync {
    async fn load(&self) -> Result<InstalledPlugins, RegistryError>;
    async fn save(&self, plugins: &InstalledPlugins) -> Result<(), RegistryError>;
}
