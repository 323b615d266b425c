//! Seams to the outside world: where frames come from and who finds markers in them.
//!
//! The relay never looks inside a frame. A [`FrameSource`] yields opaque
//! frames at its own cadence and a [`VisionBackend`] turns each one into
//! marker observations, optionally with poses.

mod replay;

use marker_relay_core::{CameraModel, DetectorParams, DictionaryId, MarkerObservation};

pub use replay::{RecordedFrame, RecordedMarker, ReplayBackend, ReplayFrame, ReplaySource};

/// Errors a backend may report for a single frame.
///
/// These never stop the frame loop; the frame is published as "not detected".
#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("frame {index} is not a valid recorded frame: {source}")]
    InvalidFrame {
        index: u64,
        #[source]
        source: serde_json::Error,
    },
    #[error("marker detection failed: {0}")]
    Detection(String),
}

/// Produces frames until the stream ends.
pub trait FrameSource {
    type Frame;

    /// Next frame, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Option<Self::Frame>;
}

/// Marker detection and pose estimation for one frame type.
pub trait VisionBackend<F> {
    /// Detect markers; returned observations carry no pose yet.
    ///
    /// Corners must be ordered clockwise from the marker's top-left.
    fn detect(
        &mut self,
        frame: &F,
        dictionary: DictionaryId,
        params: &DetectorParams,
    ) -> Result<Vec<MarkerObservation>, BackendError>;

    /// Attach a pose to every observation where one can be estimated.
    fn estimate_pose(
        &mut self,
        observations: &mut [MarkerObservation],
        marker_length_m: f64,
        camera: &CameraModel,
    );
}
