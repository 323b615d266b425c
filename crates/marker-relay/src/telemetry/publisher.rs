use std::io;

use marker_relay_core::RelationResult;
use serde::Serialize;

#[cfg(feature = "tracing")]
use tracing::instrument;

use super::logfile::TelemetryLog;
use super::message::TelemetryMessage;
use super::sink::{MessageSink, SendOutcome};

/// Counters kept by a [`TelemetryPublisher`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PublishStats {
    /// Messages built, one per frame.
    pub published: u64,
    pub delivered: u64,
    /// No subscriber was ready.
    pub dropped: u64,
    /// The sink reported an error.
    pub failed: u64,
    pub log_failures: u64,
}

/// Serializes relation results and pushes them to a sink, best effort.
///
/// Neither send nor log failures stop publishing; each kind is reported
/// once and then only counted.
#[derive(Debug)]
pub struct TelemetryPublisher<S> {
    sink: S,
    log: Option<TelemetryLog>,
    stats: PublishStats,
    send_error_reported: bool,
    log_error_reported: bool,
}

impl<S: MessageSink> TelemetryPublisher<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            log: None,
            stats: PublishStats::default(),
            send_error_reported: false,
            log_error_reported: false,
        }
    }

    pub fn with_log(mut self, log: TelemetryLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn stats(&self) -> PublishStats {
        self.stats
    }

    /// Send one frame's message and append it to the log.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all))]
    pub fn publish(&mut self, result: &RelationResult) -> TelemetryMessage {
        let message = TelemetryMessage::from(result);
        let wire = message.to_wire();
        self.stats.published += 1;

        match self.sink.try_send(wire.as_bytes()) {
            Ok(SendOutcome::Delivered) => self.stats.delivered += 1,
            Ok(SendOutcome::Dropped) => {
                self.stats.dropped += 1;
                log::trace!("no subscriber ready, dropped: {wire}");
            }
            Err(err) => {
                self.stats.failed += 1;
                if !self.send_error_reported {
                    self.send_error_reported = true;
                    log::warn!("telemetry send failed: {err} (further send errors are not reported)");
                }
            }
        }

        if let Some(log) = self.log.as_mut() {
            if let Err(err) = log.append(&message) {
                self.stats.log_failures += 1;
                if !self.log_error_reported {
                    self.log_error_reported = true;
                    log::error!(
                        "cannot write telemetry log {}: {err} (further write errors are not reported)",
                        log.path().display()
                    );
                }
            }
        }

        message
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self.log.as_mut() {
            Some(log) => log.flush(),
            None => Ok(()),
        }
    }

    /// Close the log and return the final counters.
    ///
    /// A failing final flush counts as one more log failure.
    pub fn finish(mut self) -> PublishStats {
        if let Some(log) = self.log.take() {
            let path = log.path().to_path_buf();
            if let Err(err) = log.close() {
                self.stats.log_failures += 1;
                if !self.log_error_reported {
                    log::error!("cannot close telemetry log {}: {err}", path.display());
                }
            }
        }
        self.stats
    }
}
