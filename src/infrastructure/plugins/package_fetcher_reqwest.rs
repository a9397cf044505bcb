use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::application::ports::plugin_package_fetcher::PluginPackageFetcher;

pub struct ReqwestPluginPackageFetcher {
    client: reqwest::Client,
}

impl ReqwestPluginPackageFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn download(&self, url: &str, dest: &Path) -> anyhow::Result<()> {
        let mut resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("request failed: {e}"))?;
        if !resp.status().is_success() {
            anyhow::bail!("upstream returned status {}", resp.status());
        }
        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("create {}", dest.display()))?;
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| anyhow::anyhow!("failed to read body: {e}"))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

impl Default for ReqwestPluginPackageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginPackageFetcher for ReqwestPluginPackageFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> anyhow::Result<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let lower = url.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return self.download(url, dest).await;
        }
        let src = url.strip_prefix("file://").unwrap_or(url);
        tokio::fs::copy(src, dest)
            .await
            .with_context(|| format!("copy {src} to {}", dest.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn downloads_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pkg/demo.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK-bytes".to_vec()))
            .mount(&server)
            .await;
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("demo.zip");
        ReqwestPluginPackageFetcher::new()
            .fetch(&format!("{}/pkg/demo.zip", server.uri()), &dest)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"PK-bytes");
    }

    #[tokio::test]
    async fn http_error_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let temp = TempDir::new().unwrap();
        let err = ReqwestPluginPackageFetcher::new()
            .fetch(&format!("{}/missing.zip", server.uri()), &temp.path().join("x.zip"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn copies_file_urls() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src.zip");
        std::fs::write(&src, b"local").unwrap();
        let dest = temp.path().join("out").join("dest.zip");
        ReqwestPluginPackageFetcher::new()
            .fetch(&format!("file://{}", src.display()), &dest)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"local");
    }
}
