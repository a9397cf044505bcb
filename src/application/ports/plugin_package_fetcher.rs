use std::path::Path;

use async_trait::async_trait;

/// Downloads a plugin archive to `dest`. `http(s)://` and `file://` URLs
/// (or bare paths) are accepted.
#[async_trait]
pub trait PluginPackageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, dest: &Path) -> anyhow::Result<()>;
}
