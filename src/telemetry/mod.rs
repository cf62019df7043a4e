//! Telemetry fan-out: live subscribers, the shared channel between backend
//! instances, and an optional external log sink.
//!
//! Telemetry never fails an orchestration. Only the local broker broadcast is
//! synchronous; everything that leaves the process is best effort.

pub mod broker;
pub mod bus;
pub mod channel;
pub mod envelope;
pub mod relay;
pub mod sink;

pub use broker::{LiveBroker, SubscriberId, Subscription};
pub use bus::TelemetryBus;
pub use channel::{InProcessChannel, RedisChannel, SharedChannel};
pub use envelope::TelemetryEnvelope;
pub use relay::{ChannelRelay, RelayStats};
pub use sink::{ExternalSink, HttpLogSink};
