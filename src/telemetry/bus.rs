use super::broker::LiveBroker;
use super::channel::SharedChannel;
use super::envelope::TelemetryEnvelope;
use super::sink::ExternalSink;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Where a serialized envelope goes after the local broadcast.
#[derive(Debug, Clone)]
enum RemoteTarget {
    Channel(Arc<dyn SharedChannel>),
    Sink(Arc<dyn ExternalSink>),
}

impl RemoteTarget {
    fn label(&self) -> String {
        match self {
            RemoteTarget::Channel(ch) => format!("channel:{}", ch.name()),
            RemoteTarget::Sink(sink) => format!("sink:{}", sink.topic()),
        }
    }

    async fn deliver(&self, payload: Vec<u8>) {
        let result = match self {
            RemoteTarget::Channel(ch) => ch.publish(payload).await,
            RemoteTarget::Sink(sink) => sink.publish(payload).await,
        };
        if let Err(e) = result {
            warn!(target_name = %self.label(), error = %e, "telemetry publish failed");
        }
    }
}

/// Queue feeding one remote target, drained by its own worker task.
#[derive(Debug)]
struct Outbound {
    label: String,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

/// Fans one logical event out to the live broker, the shared channel and the
/// external sink.
///
/// The broker broadcast happens inline. Remote deliveries are queued to one
/// worker per target so `emit` never waits on the network, a slow sink never
/// holds back the channel, and each target sees envelopes in emit order.
/// Remote failures are logged and dropped.
///
/// Until [`TelemetryBus::spawn_publishers`] runs, the bus is broker-only:
/// nothing is queued for a remote target that has no worker yet.
#[derive(Debug)]
pub struct TelemetryBus {
    origin: String,
    broker: Arc<LiveBroker>,
    outbound: Mutex<Vec<Outbound>>,
    targets: Mutex<Vec<RemoteTarget>>,
}

impl TelemetryBus {
    pub fn new(
        origin: impl Into<String>,
        broker: Arc<LiveBroker>,
        channel: Option<Arc<dyn SharedChannel>>,
        sink: Option<Arc<dyn ExternalSink>>,
    ) -> Self {
        let targets = channel
            .map(RemoteTarget::Channel)
            .into_iter()
            .chain(sink.map(RemoteTarget::Sink))
            .collect();

        Self {
            origin: origin.into(),
            broker,
            outbound: Mutex::new(Vec::new()),
            targets: Mutex::new(targets),
        }
    }

    /// Broker-only bus; nothing leaves the process.
    pub fn local(origin: impl Into<String>, broker: Arc<LiveBroker>) -> Self {
        Self::new(origin, broker, None, None)
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn broker(&self) -> &Arc<LiveBroker> {
        &self.broker
    }

    /// Start the per-target delivery workers and open their queues. Call once
    /// at boot; later calls, and calls after `close`, return an empty list.
    pub fn spawn_publishers(&self) -> Vec<JoinHandle<()>> {
        let targets: Vec<RemoteTarget> = self.targets.lock().drain(..).collect();
        let mut outbound = self.outbound.lock();
        targets
            .into_iter()
            .map(|target| {
                let (tx, rx) = mpsc::unbounded_channel();
                outbound.push(Outbound {
                    label: target.label(),
                    tx,
                });
                tokio::spawn(run_publisher(target, rx))
            })
            .collect()
    }

    pub fn emit(&self, event_type: &str, payload: Map<String, Value>) -> Arc<TelemetryEnvelope> {
        let envelope = Arc::new(TelemetryEnvelope::new(event_type, self.origin.as_str(), payload));
        self.broker.broadcast(Arc::clone(&envelope));

        let outbound = self.outbound.lock();
        if outbound.is_empty() {
            return envelope;
        }

        match envelope.to_bytes() {
            Ok(bytes) => {
                for out in outbound.iter() {
                    if out.tx.send(bytes.clone()).is_err() {
                        debug!(target_name = %out.label, "publisher stopped; dropping envelope");
                    }
                }
            }
            Err(e) => warn!(event = %event_type, error = %e, "failed to serialize envelope"),
        }
        envelope
    }

    /// Stop accepting remote deliveries. Workers drain what is already queued
    /// and then exit.
    pub fn close(&self) {
        self.targets.lock().clear();
        self.outbound.lock().clear();
    }
}

async fn run_publisher(target: RemoteTarget, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    let label = target.label();
    debug!(target_name = %label, "telemetry publisher started");
    while let Some(payload) = rx.recv().await {
        target.deliver(payload).await;
    }
    debug!(target_name = %label, "telemetry publisher drained");
}
