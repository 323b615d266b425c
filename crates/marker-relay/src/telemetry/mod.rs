//! Telemetry: wire message, transport sinks, CSV log and the publisher.

mod logfile;
mod message;
mod publisher;
mod push;
mod sink;

pub use logfile::{TelemetryLog, LOG_HEADER};
#[cfg(test)]
pub(crate) use logfile::FullDisk;
pub use message::TelemetryMessage;
pub use publisher::{PublishStats, TelemetryPublisher};
pub use push::{PushSocket, DEFAULT_SEND_HWM};
pub use sink::{MemorySink, MessageSink, SendOutcome, SinkError, UnboundSink};
