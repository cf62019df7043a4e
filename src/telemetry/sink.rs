use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

const SINK_TIMEOUT: Duration = Duration::from_secs(10);

/// Append-only external log sink keyed by topic. Delivery is best effort.
#[async_trait]
pub trait ExternalSink: Send + Sync + fmt::Debug {
    fn topic(&self) -> &str;

    async fn publish(&self, payload: Vec<u8>) -> Result<()>;
}

/// Posts each payload to `{base_url}/topics/{topic}:publish`.
#[derive(Clone)]
pub struct HttpLogSink {
    client: reqwest::Client,
    base_url: String,
    topic: String,
}

impl fmt::Debug for HttpLogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpLogSink")
            .field("base_url", &self.base_url)
            .field("topic", &self.topic)
            .finish()
    }
}

impl HttpLogSink {
    pub fn new(client: reqwest::Client, base_url: &str, topic: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            topic: topic.into(),
        }
    }

    fn publish_url(&self) -> String {
        format!("{}/topics/{}:publish", self.base_url, self.topic)
    }
}

#[async_trait]
impl ExternalSink for HttpLogSink {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn publish(&self, payload: Vec<u8>) -> Result<()> {
        let url = self.publish_url();
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .timeout(SINK_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OrchestratorError::transport(
                url,
                format!("sink returned {}", response.status()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_url_joins_topic() {
        let sink = HttpLogSink::new(reqwest::Client::new(), "http://sink:8085/", "agent-telemetry");
        assert_eq!(sink.publish_url(), "http://sink:8085/topics/agent-telemetry:publish");
        assert_eq!(sink.topic(), "agent-telemetry");
    }
}
