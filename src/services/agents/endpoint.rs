use crate::error::{OrchestratorError, Result};
use crate::services::CapabilityResponse;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Primary request/response transport to one capability service.
#[derive(Debug, Clone)]
pub struct AgentEndpoint {
    name: &'static str,
    base_url: String,
    client: reqwest::Client,
}

impl AgentEndpoint {
    pub fn new(name: &'static str, base_url: &str, client: reqwest::Client) -> Self {
        Self {
            name,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Base URL with each segment appended and percent-encoded.
    pub fn url(&self, segments: &[&str]) -> Result<reqwest::Url> {
        let config_error = |detail: String| OrchestratorError::Configuration(detail);
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| config_error(format!("bad {} url: {e}", self.name)))?;
        url.path_segments_mut()
            .map_err(|_| config_error(format!("{} url cannot take a path", self.name)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn post_json<B>(
        &self,
        segments: &[&str],
        body: &B,
        timeout: Duration,
    ) -> Result<CapabilityResponse>
    where
        B: Serialize + ?Sized,
    {
        let url = self.url(segments)?;
        let response = self.client.post(url).json(body).timeout(timeout).send().await?;
        self.read(response).await
    }

    pub async fn get_json(
        &self,
        segments: &[&str],
        timeout: Duration,
    ) -> Result<CapabilityResponse> {
        let url = self.url(segments)?;
        let response = self.client.get(url).timeout(timeout).send().await?;
        self.read(response).await
    }

    async fn read(&self, response: reqwest::Response) -> Result<CapabilityResponse> {
        let status = response.status();
        if !status.is_success() {
            return Err(OrchestratorError::transport(
                self.name,
                format!("{} returned {status}", response.url()),
            ));
        }

        match response.json::<Value>().await? {
            Value::Object(map) => Ok(map),
            other => Err(OrchestratorError::malformed(
                self.name,
                format!("expected a JSON object, got {other}"),
            )),
        }
    }
}
