//! Process-scoped wiring: one HTTP client, one shared channel, one tool
//! bridge and one telemetry bus, shared by every request. Background work
//! (publishers, the channel relay, the tool server) starts in
//! [`AppContext::start`] and stops in [`AppContext::shutdown`].

use crate::config::Settings;
use crate::error::Result;
use crate::logic;
use crate::services::agents::{
    AgentEndpoint, EconomyDispatcher, QuestDispatcher, QuestProfile, SecurityDispatcher,
    SimulationRequest,
};
use crate::services::tool_bridge::ToolBridge;
use crate::services::CapabilityResponse;
use crate::telemetry::{
    ChannelRelay, ExternalSink, HttpLogSink, InProcessChannel, LiveBroker, RedisChannel, RelayStats,
    SharedChannel, TelemetryBus,
};
use crate::tools::{ToolRouter, ToolServer, ToolServerConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

const IN_PROCESS_CAPACITY: usize = 1024;

/// The pieces an [`AppContext`] is assembled from. Tests build these by hand.
#[derive(Debug)]
pub struct ContextParts {
    pub origin: String,
    pub broker: Arc<LiveBroker>,
    pub channel: Arc<dyn SharedChannel>,
    pub sink: Option<Arc<dyn ExternalSink>>,
    pub bridge: Arc<ToolBridge>,
    pub quests: QuestDispatcher,
    pub economy: EconomyDispatcher,
    pub security: SecurityDispatcher,
    /// `None` runs without serving tools.
    pub tool_server: Option<ToolServerConfig>,
}

#[derive(Debug, Default)]
struct Background {
    started: bool,
    relay: Option<JoinHandle<RelayStats>>,
    publishers: Vec<JoinHandle<()>>,
    server: Option<JoinHandle<()>>,
    server_url: Option<String>,
}

#[derive(Debug)]
pub struct AppContext {
    origin: String,
    broker: Arc<LiveBroker>,
    channel: Arc<dyn SharedChannel>,
    telemetry: Arc<TelemetryBus>,
    bridge: Arc<ToolBridge>,
    quests: QuestDispatcher,
    economy: EconomyDispatcher,
    security: SecurityDispatcher,
    tool_server: Option<ToolServerConfig>,
    cancel: CancellationToken,
    background: Mutex<Background>,
}

impl AppContext {
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::new();
        let origin = format!("{}-{}", settings.origin_prefix, Uuid::new_v4());

        let channel: Arc<dyn SharedChannel> = match &settings.redis_url {
            Some(url) => Arc::new(RedisChannel::open(url, settings.sse_channel.as_str())?),
            None => {
                info!(channel = %settings.sse_channel, "REDIS_URL unset, using in-process channel");
                Arc::new(InProcessChannel::new(settings.sse_channel.as_str(), IN_PROCESS_CAPACITY))
            }
        };

        let sink: Option<Arc<dyn ExternalSink>> =
            match (&settings.log_sink_url, &settings.log_sink_topic) {
                (Some(url), Some(topic)) => {
                    Some(Arc::new(HttpLogSink::new(client.clone(), url, topic.as_str())))
                }
                (Some(_), None) => {
                    warn!("LOG_SINK_URL set without LOG_SINK_TOPIC; external sink disabled");
                    None
                }
                _ => None,
            };

        let bridge = Arc::new(ToolBridge::over_http(
            settings.mcp_supervisor_url.clone(),
            client.clone(),
        ));

        let quests = QuestDispatcher::new(
            AgentEndpoint::new("quest", &settings.quest_agent_url, client.clone()),
            Arc::clone(&bridge),
            settings.quest_timeout(),
        );
        let economy = EconomyDispatcher::new(
            AgentEndpoint::new("economy", &settings.economy_agent_url, client.clone()),
            Arc::clone(&bridge),
            settings.economy_timeout(),
            settings.emission_rate_timeout(),
        );
        let security = SecurityDispatcher::new(
            AgentEndpoint::new("security", &settings.security_agent_url, client),
            Arc::clone(&bridge),
            settings.security_timeout(),
        );

        Ok(Self::from_parts(ContextParts {
            origin,
            broker: Arc::new(LiveBroker::new()),
            channel,
            sink,
            bridge,
            quests,
            economy,
            security,
            tool_server: Some(settings.tool_server()),
        }))
    }

    pub fn from_parts(parts: ContextParts) -> Self {
        let telemetry = Arc::new(TelemetryBus::new(
            parts.origin.as_str(),
            Arc::clone(&parts.broker),
            Some(Arc::clone(&parts.channel)),
            parts.sink,
        ));
        Self {
            origin: parts.origin,
            broker: parts.broker,
            channel: parts.channel,
            telemetry,
            bridge: parts.bridge,
            quests: parts.quests,
            economy: parts.economy,
            security: parts.security,
            tool_server: parts.tool_server,
            cancel: CancellationToken::new(),
            background: Mutex::new(Background::default()),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn broker(&self) -> &Arc<LiveBroker> {
        &self.broker
    }

    pub fn telemetry(&self) -> &Arc<TelemetryBus> {
        &self.telemetry
    }

    pub fn tool_bridge(&self) -> &Arc<ToolBridge> {
        &self.bridge
    }

    pub fn economy(&self) -> &EconomyDispatcher {
        &self.economy
    }

    pub fn tool_router(&self) -> ToolRouter {
        ToolRouter::new(
            self.quests.clone(),
            self.economy.clone(),
            self.security.clone(),
            Arc::clone(&self.telemetry),
        )
    }

    /// Where the tool server is listening, once started.
    pub async fn tool_server_url(&self) -> Option<String> {
        self.background.lock().await.server_url.clone()
    }

    /// Bind the tool server, spawn the publisher workers, the channel relay
    /// and the server, then try the tool bridge once. Only a tool server that
    /// cannot bind fails start; an unreachable shared channel or bridge is
    /// retried in the background or on first use.
    pub async fn start(&self) -> Result<()> {
        let mut background = self.background.lock().await;
        if background.started {
            return Ok(());
        }

        let server = match &self.tool_server {
            Some(config) => Some(ToolServer::bind(config, self.tool_router()).await?),
            None => None,
        };

        background.publishers = self.telemetry.spawn_publishers();
        let relay = ChannelRelay::new(
            self.origin.as_str(),
            Arc::clone(&self.broker),
            Arc::clone(&self.channel),
        );
        background.relay = Some(relay.start(self.cancel.child_token()).await);
        if let Some(server) = server {
            background.server_url = Some(server.url().to_string());
            background.server = Some(server.spawn(self.cancel.child_token()));
        }
        background.started = true;
        drop(background);

        if let Err(e) = self.bridge.connect().await {
            warn!("Tool bridge unavailable at startup: {}", e);
        }
        info!(origin = %self.origin, "context started");
        Ok(())
    }

    pub async fn generate_personalized_quest(
        &self,
        profile: &QuestProfile,
    ) -> Result<CapabilityResponse> {
        logic::generate_personalized_quest(profile, &self.quests, &self.telemetry).await
    }

    pub async fn run_economy_simulation(
        &self,
        request: &SimulationRequest,
    ) -> Result<CapabilityResponse> {
        logic::run_economy_simulation(request, &self.economy, &self.telemetry).await
    }

    pub async fn analyze_user(&self, user_id: &str) -> Result<CapabilityResponse> {
        logic::analyze_user(user_id, &self.security, &self.telemetry).await
    }

    pub async fn current_emission_rate(&self) -> Result<CapabilityResponse> {
        self.economy.current_emission_rate().await
    }

    pub async fn health(&self) -> Value {
        json!({
            "status": "ok",
            "agents": {
                "quest": self.quests.base_url(),
                "economy": self.economy.base_url(),
                "security": self.security.base_url(),
            },
            "tool_bridge": {
                "configured": self.bridge.is_configured(),
                "connected": self.bridge.is_connected().await,
            },
            "tool_server": self.tool_server_url().await,
            "subscribers": self.broker.subscriber_count(),
            "origin": self.origin,
        })
    }

    /// Two phases: cancel background tasks and wait for them to finish, then
    /// release the shared connections they were using.
    pub async fn shutdown(&self) -> Result<RelayStats> {
        let mut background = self.background.lock().await;

        // 1. Relay and tool server first so nothing reads from the channel
        //    or calls a capability mid-teardown
        self.cancel.cancel();
        let stats = match background.relay.take() {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                warn!("Channel relay task failed: {}", e);
                RelayStats::default()
            }),
            None => RelayStats::default(),
        };
        if let Some(handle) = background.server.take() {
            if let Err(e) = handle.await {
                warn!("Tool server task failed: {}", e);
            }
        }
        background.server_url = None;

        // 2. Let publishers drain what is already queued
        self.telemetry.close();
        for handle in background.publishers.drain(..) {
            if let Err(e) = handle.await {
                warn!("Telemetry publisher task failed: {}", e);
            }
        }

        // 3. Shared connections
        self.bridge.disconnect().await?;
        info!(
            forwarded = stats.forwarded,
            echoes_dropped = stats.echoes_dropped,
            malformed_dropped = stats.malformed_dropped,
            resubscribes = stats.resubscribes,
            "context shut down"
        );
        Ok(stats)
    }
}
