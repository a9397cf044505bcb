use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::plugins::PluginManifest;

#[derive(thiserror::Error, Debug)]
pub enum PackageError {
    #[error("package is not a zip archive")]
    NotZip(#[source] anyhow::Error),
    #[error("config.json not found in package")]
    ManifestMissing,
    #[error("failed to unpack package")]
    Unzip(#[source] anyhow::Error),
    #[error("failed to parse config.json")]
    Unmarshal(#[source] serde_json::Error),
    #[error("package storage error")]
    Io(#[source] anyhow::Error),
}

/// Plugin packages on local disk: layout of the plugin root, archive
/// unpacking and the per-file operations of the install pipeline.
#[async_trait]
pub trait PluginPackageStore: Send + Sync {
    fn plugin_root(&self) -> PathBuf;

    /// `<root>/<name>/<version>`
    fn install_dir(&self, name: &str, version: &str) -> PathBuf {
        self.plugin_root().join(name).join(version)
    }

    /// `<root>/<name>/<version>/heartbeat`
    fn heartbeat_path(&self, name: &str, version: &str) -> PathBuf {
        self.install_dir(name, version).join("heartbeat")
    }

    /// Scratch location for a downloaded archive.
    fn download_path(&self, file_name: &str) -> PathBuf {
        self.plugin_root().join(file_name)
    }

    /// Reads `config.json` from the archive root or one directory down
    /// without unpacking anything.
    async fn peek_manifest(&self, archive: &Path) -> Result<PluginManifest, PackageError>;

    /// Unpacks `archive` and places its content (the directory holding
    /// `config.json`, or the archive root) at `dest`, overwriting files.
    async fn install_archive(&self, archive: &Path, dest: &Path) -> Result<(), PackageError>;

    /// Parses `<dir>/config.json`.
    async fn read_manifest(&self, dir: &Path) -> Result<PluginManifest, PackageError>;

    /// Lower-case hex MD5 of a file.
    async fn md5_hex(&self, file: &Path) -> anyhow::Result<String>;

    /// `chmod 0744` on non-Windows targets.
    async fn make_executable(&self, path: &Path) -> anyhow::Result<()>;

    async fn remove_path(&self, path: &Path) -> anyhow::Result<()>;
}
