use super::envelope::TelemetryEnvelope;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;
use uuid::Uuid;

pub type SubscriberId = Uuid;

/// A live subscriber's queue. Drain with [`Subscription::recv`] and hand the
/// id back to [`LiveBroker::unregister`] when the client goes away.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::UnboundedReceiver<Arc<TelemetryEnvelope>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next envelope, or `None` once the broker has dropped this queue.
    pub async fn recv(&mut self) -> Option<Arc<TelemetryEnvelope>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<TelemetryEnvelope>> {
        self.receiver.try_recv().ok()
    }

    pub fn into_stream(self) -> UnboundedReceiverStream<Arc<TelemetryEnvelope>> {
        UnboundedReceiverStream::new(self.receiver)
    }
}

/// In-process registry of live subscriber queues.
///
/// One mutex guards the whole map. Broadcast copies the senders out under the
/// lock and pushes after releasing it; queues are unbounded so a slow reader
/// grows its own backlog instead of stalling the broadcaster.
#[derive(Debug, Default)]
pub struct LiveBroker {
    clients: Mutex<HashMap<SubscriberId, mpsc::UnboundedSender<Arc<TelemetryEnvelope>>>>,
}

impl LiveBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.clients.lock().insert(id, tx);
        debug!(subscriber = %id, "live subscriber registered");
        Subscription { id, receiver: rx }
    }

    /// Stop tracking a subscriber. Unknown ids are ignored.
    pub fn unregister(&self, id: SubscriberId) {
        if self.clients.lock().remove(&id).is_some() {
            debug!(subscriber = %id, "live subscriber unregistered");
        }
    }

    pub fn broadcast(&self, envelope: Arc<TelemetryEnvelope>) {
        let snapshot: Vec<_> = self
            .clients
            .lock()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut closed = Vec::new();
        for (id, tx) in snapshot {
            if tx.send(Arc::clone(&envelope)).is_err() {
                closed.push(id);
            }
        }

        // Receivers dropped without unregistering.
        if !closed.is_empty() {
            let mut clients = self.clients.lock();
            for id in closed {
                clients.remove(&id);
                debug!(subscriber = %id, "pruned closed subscriber");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.clients.lock().len()
    }
}
