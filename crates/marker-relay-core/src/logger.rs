//! Relay logger.
//!
//! Prints `[elapsed LEVEL] module: message` to stderr. Records from the relay
//! crates pass at the configured level; records from any other crate are
//! capped at `warn` so a `debug` session shows per-frame detail without
//! dependency chatter. Use `init_with_level` once at startup, or
//! `init_tracing` (feature `tracing`) for a `tracing-subscriber` formatter.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Target prefixes of the relay's own crates.
const RELAY_TARGETS: [&str; 2] = ["marker_relay_core", "marker_relay"];

/// Most verbose level let through for other crates.
const FOREIGN_LEVEL: LevelFilter = LevelFilter::Warn;

/// `marker_relay::telemetry::push` prints as `telemetry::push`.
fn short_target(target: &str) -> &str {
    RELAY_TARGETS
        .iter()
        .copied()
        .find_map(|krate| {
            let rest = target.strip_prefix(krate)?;
            match rest.strip_prefix("::") {
                Some(module) => Some(module),
                None if rest.is_empty() => Some(krate),
                None => None,
            }
        })
        .unwrap_or(target)
}

fn is_relay_target(target: &str) -> bool {
    RELAY_TARGETS.iter().any(|krate| {
        target
            .strip_prefix(krate)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

struct RelayLogger {
    level: LevelFilter,
    started: Instant,
}

impl RelayLogger {
    fn new(level: LevelFilter) -> Self {
        Self {
            level,
            started: Instant::now(),
        }
    }
}

impl Log for RelayLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        let limit = if is_relay_target(metadata.target()) {
            self.level
        } else {
            self.level.min(FOREIGN_LEVEL)
        };
        metadata.level() <= limit
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:8.3}s {:>5}] {}: {}",
            elapsed,
            record.level(),
            short_target(record.target()),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<RelayLogger> = OnceLock::new();

/// Install the stderr logger with the provided level filter.
///
/// Calling this more than once is a no-op after the first successful
/// initialization.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| RelayLogger::new(level));
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Default `tracing` filter: relay crates at `info`, everything else at `warn`.
#[cfg(feature = "tracing")]
pub const DEFAULT_TRACING_FILTER: &str = "marker_relay=info,marker_relay_core=info,warn";

/// Install a `tracing` subscriber; `RUST_LOG` overrides [`DEFAULT_TRACING_FILTER`].
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_TRACING_FILTER));
    if json {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .flatten_event(true)
            .finish()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}
