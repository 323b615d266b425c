//! Per-frame acquisition loop.
//!
//! One thread pulls a frame, runs detection and pose estimation through the
//! backend, relates the markers and publishes exactly one telemetry message,
//! then moves on to the next frame. A stop request is honoured between frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use marker_relay_core::{relate, RelationResult, SessionConfig};
use serde::Serialize;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::backend::{FrameSource, VisionBackend};
use crate::telemetry::{MessageSink, TelemetryPublisher};

/// Frames between two latency reports.
pub const REPORT_EVERY_FRAMES: u64 = 30;

/// Monotonic tick counter.
pub trait TickClock {
    fn ticks(&self) -> u64;
    /// Ticks per second.
    fn tick_frequency(&self) -> f64;
}

/// Nanosecond ticks since construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TickClock for MonotonicClock {
    fn ticks(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn tick_frequency(&self) -> f64 {
        1e9
    }
}

/// Running loop statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopStats {
    frames: u64,
    total_processing_s: f64,
    last_processing_s: f64,
    previous_tick: Option<u64>,
    frame_rate: Option<f64>,
}

impl LoopStats {
    /// Account for one frame's processing time.
    pub fn record(&mut self, processing_s: f64) {
        self.frames += 1;
        self.total_processing_s += processing_s;
        self.last_processing_s = processing_s;
    }

    /// Register a frame arrival at `tick` and update the instantaneous rate.
    ///
    /// The rate is `None` for the first frame and for a zero tick delta.
    pub fn mark_frame(&mut self, tick: u64, tick_frequency: f64) {
        self.frame_rate = self.previous_tick.and_then(|prev| {
            let delta = tick.checked_sub(prev).filter(|&d| d > 0)?;
            Some(tick_frequency / delta as f64)
        });
        self.previous_tick = Some(tick);
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn last_processing_s(&self) -> f64 {
        self.last_processing_s
    }

    /// Cumulative mean processing time in seconds, `0` before the first frame.
    pub fn mean_processing_s(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.total_processing_s / self.frames as f64
        }
    }

    pub fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }
}

/// Shared stop flag, checked between frames.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopExit {
    /// The frame source ran dry.
    EndOfStream,
    /// A stop was requested.
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoopSummary {
    pub exit: LoopExit,
    pub frames: u64,
    pub mean_processing_s: f64,
}

/// The acquisition loop for one session.
pub struct FrameLoop<'a, C = MonotonicClock> {
    config: &'a SessionConfig,
    clock: C,
    stats: LoopStats,
    report_every: u64,
    warned_no_pose: bool,
}

impl<'a> FrameLoop<'a, MonotonicClock> {
    pub fn new(config: &'a SessionConfig) -> Self {
        Self::with_clock(config, MonotonicClock::new())
    }
}

impl<'a, C: TickClock> FrameLoop<'a, C> {
    pub fn with_clock(config: &'a SessionConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            stats: LoopStats::default(),
            report_every: REPORT_EVERY_FRAMES,
            warned_no_pose: false,
        }
    }

    /// Report mean latency every `frames` frames (`0` disables reports).
    pub fn with_report_every(mut self, frames: u64) -> Self {
        self.report_every = frames;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        self.config
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Detect, estimate and relate the markers of one frame.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub fn process_frame<Fr, B>(&mut self, backend: &mut B, frame: &Fr) -> RelationResult
    where
        B: VisionBackend<Fr> + ?Sized,
    {
        let config = self.config;
        let mut observations =
            match backend.detect(frame, config.dictionary, &config.detector) {
                Ok(obs) => obs,
                Err(err) => {
                    log::warn!("marker detection failed: {err}");
                    Vec::new()
                }
            };

        if !observations.is_empty() {
            match &config.camera {
                Some(camera) => {
                    backend.estimate_pose(&mut observations, config.marker_length_m, camera)
                }
                None if !self.warned_no_pose => {
                    self.warned_no_pose = true;
                    log::warn!("no camera calibration configured: no pose calculation");
                }
                None => {}
            }
        }

        let result = relate(&observations, config);
        if result.detected {
            log::debug!(
                "detected marker {}: {:.4}, {:.4}, {:.4}, {:.2}",
                config.object_marker_id,
                result.position.x,
                result.position.y,
                result.position.z,
                result.heading_degrees
            );
        }
        if let Some(delta) = result.ground_relative_delta {
            log::trace!(
                "ground-relative delta: ({:.4}, {:.4}, {:.4})",
                delta.x,
                delta.y,
                delta.z
            );
        }
        result
    }

    /// Run until the source is exhausted or `stop` is raised.
    pub fn run<F, B, S>(
        &mut self,
        source: &mut F,
        backend: &mut B,
        publisher: &mut TelemetryPublisher<S>,
        stop: &StopSignal,
    ) -> LoopSummary
    where
        F: FrameSource,
        B: VisionBackend<F::Frame>,
        S: MessageSink,
    {
        let exit = loop {
            if stop.is_stop_requested() {
                log::info!("stop requested after {} frames", self.stats.frames());
                break LoopExit::Interrupted;
            }
            let Some(frame) = source.next_frame() else {
                log::info!("end of stream after {} frames", self.stats.frames());
                break LoopExit::EndOfStream;
            };

            let started = Instant::now();
            self.stats
                .mark_frame(self.clock.ticks(), self.clock.tick_frequency());

            let result = self.process_frame(backend, &frame);
            publisher.publish(&result);

            self.stats.record(started.elapsed().as_secs_f64());
            self.report();
        };

        if let Err(err) = publisher.flush() {
            log::error!("failed to flush telemetry log: {err}");
        }

        LoopSummary {
            exit,
            frames: self.stats.frames(),
            mean_processing_s: self.stats.mean_processing_s(),
        }
    }

    fn report(&self) {
        if let Some(line) = self.report_line() {
            log::info!("{line}");
        }
    }

    /// Latency line due after the current frame, if any.
    fn report_line(&self) -> Option<String> {
        let frames = self.stats.frames();
        if self.report_every == 0 || frames == 0 || frames % self.report_every != 0 {
            return None;
        }
        let rate = self
            .stats
            .frame_rate()
            .map_or_else(|| "n/a".to_string(), |r| format!("{r:.1} fps"));
        Some(format!(
            "frames={frames} processing={:.3} ms (mean {:.3} ms) rate={rate}",
            self.stats.last_processing_s() * 1e3,
            self.stats.mean_processing_s() * 1e3
        ))
    }
}
