use super::broker::LiveBroker;
use super::channel::{MessageStream, SharedChannel};
use super::envelope::TelemetryEnvelope;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Counters reported when the relay loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub forwarded: u64,
    pub echoes_dropped: u64,
    pub malformed_dropped: u64,
    /// Subscriptions opened after the first attempt at start.
    pub resubscribes: u64,
}

/// Re-broadcasts envelopes published by other instances into the local broker.
///
/// Envelopes carrying this process's own origin were already broadcast at
/// emit time and are dropped here. A channel that is down, or a subscription
/// that ends, is retried every `retry_delay` until cancelled.
#[derive(Debug)]
pub struct ChannelRelay {
    origin: String,
    broker: Arc<LiveBroker>,
    channel: Arc<dyn SharedChannel>,
    retry_delay: Duration,
}

enum Inbound {
    Forward(TelemetryEnvelope),
    Echo,
    Malformed,
}

impl ChannelRelay {
    pub fn new(
        origin: impl Into<String>,
        broker: Arc<LiveBroker>,
        channel: Arc<dyn SharedChannel>,
    ) -> Self {
        Self {
            origin: origin.into(),
            broker,
            channel,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Try to subscribe once, then run the relay loop on its own task until
    /// `cancel` fires. When the first attempt succeeds the subscription is
    /// live by the time this returns; otherwise the task keeps retrying.
    pub async fn start(self, cancel: CancellationToken) -> JoinHandle<RelayStats> {
        let first = match self.channel.subscribe().await {
            Ok(stream) => {
                info!(
                    channel = %self.channel.name(),
                    origin = %self.origin,
                    "channel relay subscribed"
                );
                Some(stream)
            }
            Err(e) => {
                warn!(
                    channel = %self.channel.name(),
                    error = %e,
                    retry_in = ?self.retry_delay,
                    "shared channel unavailable, relay will retry"
                );
                None
            }
        };
        tokio::spawn(self.run(first, cancel))
    }

    async fn run(self, mut first: Option<MessageStream>, cancel: CancellationToken) -> RelayStats {
        let mut stats = RelayStats::default();

        loop {
            let stream = match first.take() {
                Some(stream) => stream,
                None => match self.resubscribe(&cancel).await {
                    Some(stream) => {
                        stats.resubscribes += 1;
                        stream
                    }
                    None => break,
                },
            };
            if self.pump(stream, &cancel, &mut stats).await {
                break;
            }
        }

        info!(
            forwarded = stats.forwarded,
            echoes_dropped = stats.echoes_dropped,
            malformed_dropped = stats.malformed_dropped,
            resubscribes = stats.resubscribes,
            "channel relay stopped"
        );
        stats
    }

    /// Wait out the retry delay and subscribe again, until it works or
    /// `cancel` fires (`None`).
    async fn resubscribe(&self, cancel: &CancellationToken) -> Option<MessageStream> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
            let attempt = tokio::select! {
                _ = cancel.cancelled() => return None,
                attempt = self.channel.subscribe() => attempt,
            };
            match attempt {
                Ok(stream) => {
                    info!(channel = %self.channel.name(), "channel relay resubscribed");
                    return Some(stream);
                }
                Err(e) => {
                    debug!(channel = %self.channel.name(), error = %e, "resubscribe failed");
                }
            }
        }
    }

    /// Forward messages until the stream ends (`false`) or `cancel` fires
    /// (`true`). The subscription is released on return.
    async fn pump(
        &self,
        mut stream: MessageStream,
        cancel: &CancellationToken,
        stats: &mut RelayStats,
    ) -> bool {
        loop {
            let raw = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("channel relay cancelled");
                    return true;
                }
                next = stream.next() => match next {
                    Some(raw) => raw,
                    None => {
                        warn!(channel = %self.channel.name(), "shared channel subscription ended");
                        return false;
                    }
                },
            };

            match self.classify(&raw) {
                Inbound::Forward(envelope) => {
                    stats.forwarded += 1;
                    self.broker.broadcast(Arc::new(envelope));
                }
                Inbound::Echo => stats.echoes_dropped += 1,
                Inbound::Malformed => {
                    stats.malformed_dropped += 1;
                    debug!(bytes = raw.len(), "dropping malformed channel message");
                }
            }
        }
    }

    fn classify(&self, raw: &[u8]) -> Inbound {
        match TelemetryEnvelope::from_bytes(raw) {
            Ok(envelope) if envelope.origin == self.origin => Inbound::Echo,
            Ok(envelope) => Inbound::Forward(envelope),
            Err(_) => Inbound::Malformed,
        }
    }
}
