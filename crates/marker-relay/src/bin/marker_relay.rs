//! marker-relay: push per-frame marker pose telemetry to a downstream controller.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::thread;

use clap::{Parser, ValueEnum};
use log::LevelFilter;
use marker_relay::backend::{ReplayBackend, ReplaySource};
use marker_relay::io::{resolve_session, Overrides};
use marker_relay::telemetry::{
    MessageSink, PushSocket, TelemetryLog, TelemetryPublisher, UnboundSink,
};
use marker_relay::{FrameLoop, LoopExit, StopSignal};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser, Debug)]
#[command(name = "marker-relay")]
#[command(about = "Detect a marker and push its position over a ZeroMQ PUSH socket")]
#[command(version)]
struct Cli {
    /// Session file (JSON). Values it defines win over the flags below.
    #[arg(long)]
    conf: Option<PathBuf>,

    /// Marker dictionary index: DICT_4X4_50=0 ... DICT_7X7_1000=15, DICT_ARUCO_ORIGINAL=16.
    #[arg(short = 'd', long)]
    dictionary: Option<u32>,

    /// Camera calibration file (JSON). Enables pose estimation.
    #[arg(short = 'c', long)]
    camera_params: Option<PathBuf>,

    /// Marker side length in metres [default: 0.1].
    #[arg(short = 'l', long)]
    marker_length: Option<f64>,

    /// Detector parameters file (JSON).
    #[arg(long, visible_alias = "dp")]
    detector_params: Option<PathBuf>,

    /// Camera is mounted above the markers, looking down.
    #[arg(short = 't', long)]
    top: bool,

    /// Id of the tracked object marker [default: 0].
    #[arg(long)]
    object_id: Option<u32>,

    /// Id of the fixed ground marker [default: 1].
    #[arg(long)]
    ground_id: Option<u32>,

    /// Push socket endpoint [default: tcp://*:7777].
    #[arg(long)]
    bind: Option<String>,

    /// Per-frame CSV log.
    #[arg(short = 'L', long = "log")]
    log_path: Option<PathBuf>,

    /// Recorded detections, one JSON frame per line; `-` reads stdin.
    #[arg(long, default_value = "-")]
    input: PathBuf,

    /// Replay rate in frames per second (as fast as possible when omitted).
    #[arg(long)]
    rate: Option<f64>,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Use a JSON `tracing` subscriber instead of the plain logger.
    #[cfg(feature = "tracing")]
    #[arg(long)]
    json_log: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            dictionary: self.dictionary,
            camera_params: self.camera_params.clone(),
            marker_length: self.marker_length,
            detector_params: self.detector_params.clone(),
            camera_top: self.top,
            object_marker_id: self.object_id,
            ground_marker_id: self.ground_id,
            bind: self.bind.clone(),
            log_path: self.log_path.clone(),
        }
    }

    fn reads_stdin(&self) -> bool {
        self.input.as_os_str() == "-"
    }
}

fn init_logging(cli: &Cli) -> CliResult<()> {
    #[cfg(feature = "tracing")]
    if cli.json_log {
        marker_relay::core::init_tracing(true);
        return Ok(());
    }
    marker_relay::core::init_with_level(cli.log_level.into())?;
    Ok(())
}

/// Raise `stop` when the operator types `q` or ESC followed by Enter.
fn spawn_key_watcher(stop: StopSignal) -> io::Result<()> {
    thread::Builder::new()
        .name("key-watcher".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let key = line.trim();
                if key.eq_ignore_ascii_case("q") || key.contains('\u{1b}') {
                    log::info!("stop requested from keyboard");
                    stop.request_stop();
                    break;
                }
            }
        })?;
    Ok(())
}

fn open_input(cli: &Cli) -> CliResult<Box<dyn BufRead>> {
    if cli.reads_stdin() {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(&cli.input)
        .map_err(|e| format!("cannot open input {}: {e}", cli.input.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let config = resolve_session(cli.conf.as_deref(), &cli.overrides())?;

    let log = match &config.outputs.log_path {
        Some(path) => Some(
            TelemetryLog::create(path)
                .map_err(|e| format!("cannot open log {}: {e}", path.display()))?,
        ),
        None => None,
    };

    let sink: Box<dyn MessageSink> = match PushSocket::bind(&config.outputs.bind_addr) {
        Ok(socket) => Box::new(socket),
        Err(err) => {
            log::error!("{err}; telemetry will not be sent");
            Box::new(UnboundSink::new(config.outputs.bind_addr.clone()))
        }
    };
    let mut publisher = TelemetryPublisher::new(sink);
    if let Some(log) = log {
        publisher = publisher.with_log(log);
    }

    let stop = StopSignal::new();
    if cli.reads_stdin() {
        log::info!("reading frames from stdin; end the stream to stop");
    } else {
        spawn_key_watcher(stop.clone())?;
        log::info!("type q and Enter to stop");
    }

    let mut source = ReplaySource::new(open_input(&cli)?);
    if let Some(hz) = cli.rate {
        source = source.with_rate(hz);
    }
    let mut backend = ReplayBackend::new();

    let summary = FrameLoop::new(&config).run(&mut source, &mut backend, &mut publisher, &stop);
    let stats = publisher.finish();

    let reason = match summary.exit {
        LoopExit::EndOfStream => "end of stream",
        LoopExit::Interrupted => "stopped",
    };
    log::info!(
        "{reason}: {} frames, mean processing {:.3} ms, {} delivered, {} dropped, {} failed",
        summary.frames,
        summary.mean_processing_s * 1e3,
        stats.delivered,
        stats.dropped,
        stats.failed
    );
    if stats.log_failures > 0 {
        log::warn!("{} telemetry log writes failed", stats.log_failures);
    }
    if backend.rejected_ids() > 0 {
        log::warn!(
            "{} recorded markers had ids outside {}",
            backend.rejected_ids(),
            config.dictionary
        );
    }
    Ok(())
}
