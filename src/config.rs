//! Process settings, read from the environment (and an optional `.env`).

use crate::error::Result;
use crate::tools::ToolServerConfig;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub quest_agent_url: String,
    pub economy_agent_url: String,
    pub security_agent_url: String,

    /// Shared pub/sub channel. Without it events only reach this process.
    #[serde(default)]
    pub redis_url: Option<String>,
    pub sse_channel: String,

    /// Secondary tool-call channel shared by all three capabilities.
    #[serde(default)]
    pub mcp_supervisor_url: Option<String>,

    /// Where this process serves its own tools.
    pub mcp_server_host: String,
    pub mcp_server_port: u16,
    pub mcp_server_path: String,

    #[serde(default)]
    pub log_sink_url: Option<String>,
    #[serde(default)]
    pub log_sink_topic: Option<String>,

    pub origin_prefix: String,

    pub quest_timeout_secs: u64,
    pub economy_timeout_secs: u64,
    pub emission_rate_timeout_secs: u64,
    pub security_timeout_secs: u64,

    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            quest_agent_url: "http://localhost:8001".to_string(),
            economy_agent_url: "http://localhost:8002".to_string(),
            security_agent_url: "http://localhost:8003".to_string(),
            redis_url: None,
            sse_channel: "agent-events".to_string(),
            mcp_supervisor_url: None,
            mcp_server_host: "0.0.0.0".to_string(),
            mcp_server_port: 9300,
            mcp_server_path: "mcp".to_string(),
            log_sink_url: None,
            log_sink_topic: None,
            origin_prefix: "backend-api".to_string(),
            quest_timeout_secs: 45,
            economy_timeout_secs: 90,
            emission_rate_timeout_secs: 15,
            security_timeout_secs: 60,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load `.env` if present, then overlay process environment on the defaults.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let defaults = Settings::default();

        let raw = config::Config::builder()
            .set_default("quest_agent_url", defaults.quest_agent_url)?
            .set_default("economy_agent_url", defaults.economy_agent_url)?
            .set_default("security_agent_url", defaults.security_agent_url)?
            .set_default("sse_channel", defaults.sse_channel)?
            .set_default("mcp_server_host", defaults.mcp_server_host)?
            .set_default("mcp_server_port", i64::from(defaults.mcp_server_port))?
            .set_default("mcp_server_path", defaults.mcp_server_path)?
            .set_default("origin_prefix", defaults.origin_prefix)?
            .set_default("quest_timeout_secs", defaults.quest_timeout_secs as i64)?
            .set_default("economy_timeout_secs", defaults.economy_timeout_secs as i64)?
            .set_default(
                "emission_rate_timeout_secs",
                defaults.emission_rate_timeout_secs as i64,
            )?
            .set_default("security_timeout_secs", defaults.security_timeout_secs as i64)?
            .set_default("log_level", defaults.log_level)?
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        let settings: Settings = raw.try_deserialize()?;
        Ok(settings.normalized())
    }

    /// Trims trailing slashes off base URLs and treats blank optionals as unset.
    pub fn normalized(mut self) -> Self {
        for url in [
            &mut self.quest_agent_url,
            &mut self.economy_agent_url,
            &mut self.security_agent_url,
        ] {
            let trimmed = url.trim_end_matches('/').to_string();
            *url = trimmed;
        }
        for opt in [
            &mut self.redis_url,
            &mut self.mcp_supervisor_url,
            &mut self.log_sink_url,
            &mut self.log_sink_topic,
        ] {
            if opt.as_deref().map(str::trim).is_some_and(str::is_empty) {
                *opt = None;
            }
        }
        self
    }

    pub fn tool_server(&self) -> ToolServerConfig {
        ToolServerConfig::new(
            self.mcp_server_host.as_str(),
            self.mcp_server_port,
            self.mcp_server_path.as_str(),
        )
    }

    pub fn quest_timeout(&self) -> Duration {
        Duration::from_secs(self.quest_timeout_secs)
    }

    pub fn economy_timeout(&self) -> Duration {
        Duration::from_secs(self.economy_timeout_secs)
    }

    pub fn emission_rate_timeout(&self) -> Duration {
        Duration::from_secs(self.emission_rate_timeout_secs)
    }

    pub fn security_timeout(&self) -> Duration {
        Duration::from_secs(self.security_timeout_secs)
    }
}
