use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::sleep;

use crate::application::dto::plugins::{
    PluginListRequest, PluginListResponse, PluginStatusRequest, PluginStatusResponse,
    UpdateCheckRequest, UpdateCheckResponse,
};
use crate::application::ports::control_plane::ControlPlane;
use crate::domain::plugins::PluginInfo;

/// Extra attempts after the first POST fails.
pub const POST_RETRIES: u32 = 2;
pub const LIST_RETRY_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct ControlPlaneEndpoints {
    pub base_url: String,
    pub list_path: String,
    pub health_path: String,
    pub update_check_path: String,
}

pub struct ReqwestControlPlane {
    client: reqwest::Client,
    endpoints: ControlPlaneEndpoints,
    list_retry_delay: Duration,
    retry_delay: Duration,
}

impl ReqwestControlPlane {
    pub fn new(endpoints: ControlPlaneEndpoints, retry_delay: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build control plane http client")?;
        Ok(Self {
            client,
            endpoints,
            list_retry_delay: LIST_RETRY_DELAY,
            retry_delay,
        })
    }

    /// Overrides both retry delays; tests use zero.
    pub fn with_retry_delays(mut self, list: Duration, other: Duration) -> Self {
        self.list_retry_delay = list;
        self.retry_delay = other;
        self
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.endpoints.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn post_once<B, R>(&self, url: &str, body: &B) -> anyhow::Result<R>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| anyhow!("request failed: {e}"))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| anyhow!("failed to read body: {e}"))?;
        if !status.is_success() {
            anyhow::bail!("control plane returned status {status}: {text}");
        }
        serde_json::from_str(&text).with_context(|| format!("decode response from {url}: {text}"))
    }

    async fn post_with_retry<B, R>(&self, path: &str, body: &B, delay: Duration) -> anyhow::Result<R>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url(path);
        let mut attempt = 0;
        loop {
            match self.post_once(&url, body).await {
                Ok(resp) => return Ok(resp),
                Err(err) if attempt < POST_RETRIES => {
                    attempt += 1;
                    tracing::warn!(url = url.as_str(), attempt, error = %err, "control_plane_post_retry");
                    sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl ControlPlane for ReqwestControlPlane {
    async fn list_plugins(&self, request: &PluginListRequest) -> anyhow::Result<Vec<PluginInfo>> {
        let resp: PluginListResponse = self
            .post_with_retry(&self.endpoints.list_path, request, self.list_retry_delay)
            .await?;
        Ok(resp.plugin_list)
    }

    async fn report_plugin_status(
        &self,
        request: &PluginStatusRequest,
    ) -> anyhow::Result<PluginStatusResponse> {
        self.post_with_retry(&self.endpoints.health_path, request, self.retry_delay)
            .await
    }

    async fn check_update(
        &self,
        request: &UpdateCheckRequest,
    ) -> anyhow::Result<UpdateCheckResponse> {
        self.post_with_retry(&self.endpoints.update_check_path, request, self.retry_delay)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plugins::{PluginStatus, PluginStatusKind};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ReqwestControlPlane {
        ReqwestControlPlane::new(
            ControlPlaneEndpoints {
                base_url: server.uri(),
                list_path: "/plugin/list".into(),
                health_path: "/plugin/status".into(),
                update_check_path: "/plugin/update_check".into(),
            },
            Duration::ZERO,
        )
        .unwrap()
        .with_retry_delays(Duration::ZERO, Duration::ZERO)
    }

    #[tokio::test]
    async fn list_parses_catalog_entries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/plugin/list"))
            .and(body_partial_json(serde_json::json!({"pluginName": "demo"})))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"pluginList":[{"pluginId":"p1","name":"demo","version":"1.2","pluginType":"Persist"}]}"#,
            ))
            .mount(&server)
            .await;
        let list = client(&server)
            .list_plugins(&PluginListRequest {
                plugin_name: "demo".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(list.len(), 1);
        assert!(list[0].is_persist());
    }

    #[tokio::test]
    async fn status_report_retries_then_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/plugin/status"))
            .respond_with(ResponseTemplate::new(503))
            .expect(u64::from(POST_RETRIES + 1))
            .mount(&server)
            .await;
        let request = PluginStatusRequest {
            os: "linux".into(),
            arch: "x64".into(),
            plugin: vec![PluginStatus::new("demo", "1.0", PluginStatusKind::PersistRunning)],
        };
        assert!(client(&server).report_plugin_status(&request).await.is_err());
    }

    #[tokio::test]
    async fn status_report_reads_tuned_intervals() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/plugin/status"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"scanInterval":"600","pullInterval":120,"reportType":1}"#),
            )
            .mount(&server)
            .await;
        let resp = client(&server)
            .report_plugin_status(&PluginStatusRequest::default())
            .await
            .unwrap();
        assert_eq!(resp.scan_interval, 600);
        assert_eq!(resp.pull_interval, 120);
        assert_eq!(resp.report_type, 1);
    }
}
