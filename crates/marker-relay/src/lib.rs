//! Fiducial marker pose relay.
//!
//! Each camera frame goes through detection, pose estimation and the pose
//! relator, and exactly one telemetry message is pushed for it:
//!
//! ```text
//! FrameSource -> VisionBackend::detect -> VisionBackend::estimate_pose
//!             -> relate -> TelemetryPublisher -> push socket (+ CSV log)
//! ```
//!
//! ## Quickstart
//!
//! ```no_run
//! use marker_relay::backend::{ReplayBackend, ReplaySource};
//! use marker_relay::core::{DictionaryId, SessionConfig};
//! use marker_relay::telemetry::{PushSocket, TelemetryPublisher};
//! use marker_relay::{FrameLoop, StopSignal};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::new(DictionaryId::Dict4x4_50);
//! let input = std::io::BufReader::new(std::fs::File::open("frames.jsonl")?);
//! let mut source = ReplaySource::new(input);
//! let mut publisher = TelemetryPublisher::new(PushSocket::bind(&config.outputs.bind_addr)?);
//!
//! let summary = FrameLoop::new(&config).run(
//!     &mut source,
//!     &mut ReplayBackend::new(),
//!     &mut publisher,
//!     &StopSignal::new(),
//! );
//! println!("{} frames", summary.frames);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `marker_relay::core`: session configuration, camera model, pose geometry
//!   and the pose relator.
//! - `marker_relay::backend`: frame source and vision backend seams, replay backend.
//! - `marker_relay::telemetry`: wire message, push socket, CSV log, publisher.
//! - `marker_relay::io`: session file and command-line resolution.

pub use marker_relay_core as core;

pub mod backend;
mod frame_loop;
pub mod io;
pub mod telemetry;

pub use frame_loop::{
    FrameLoop, LoopExit, LoopStats, LoopSummary, MonotonicClock, StopSignal, TickClock,
    REPORT_EVERY_FRAMES,
};
