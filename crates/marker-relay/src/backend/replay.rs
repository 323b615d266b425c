//! Replay of recorded detections.
//!
//! Each line of the input is one frame:
//! `{"markers": [{"id": 3, "corners": [[x, y], [x, y], [x, y], [x, y]]}]}`.
//! A blank line is a frame without markers. Poses are not recorded; they are
//! estimated from the corners with the planar single-marker solver.

use std::io::BufRead;
use std::thread;
use std::time::{Duration, Instant};

use marker_relay_core::{
    estimate_marker_pose, CameraModel, DetectorParams, DictionaryId, MarkerObservation,
};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use super::{BackendError, FrameSource, VisionBackend};

/// One recorded marker detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedMarker {
    pub id: u32,
    /// Pixel corners, clockwise from the marker's top-left.
    pub corners: [[f64; 2]; 4],
}

/// All detections of one recorded frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    #[serde(default)]
    pub markers: Vec<RecordedMarker>,
}

/// A raw replay line tagged with its position in the stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayFrame {
    pub index: u64,
    pub line: String,
}

/// Frame source reading one recorded frame per line.
pub struct ReplaySource<R> {
    reader: R,
    next_index: u64,
    interval: Option<Duration>,
    next_due: Option<Instant>,
}

impl<R: BufRead> ReplaySource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            next_index: 0,
            interval: None,
            next_due: None,
        }
    }

    /// Pace frames at `hz` instead of replaying as fast as possible.
    pub fn with_rate(mut self, hz: f64) -> Self {
        self.interval = (hz.is_finite() && hz > 0.0).then(|| Duration::from_secs_f64(1.0 / hz));
        self
    }

    fn wait_until_due(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                thread::sleep(due - now);
            }
        }
        self.next_due = Some(self.next_due.map_or(now, |d| d.max(now)) + interval);
    }
}

impl<R: BufRead> FrameSource for ReplaySource<R> {
    type Frame = ReplayFrame;

    fn next_frame(&mut self) -> Option<ReplayFrame> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => return None,
            Ok(_) => {}
            Err(err) => {
                log::error!("replay input failed after {} frames: {err}", self.next_index);
                return None;
            }
        }
        self.wait_until_due();

        let frame = ReplayFrame {
            index: self.next_index,
            line: line.trim_end_matches(['\r', '\n']).to_string(),
        };
        self.next_index += 1;
        Some(frame)
    }
}

/// Backend for [`ReplayFrame`]s: decodes recorded corners, estimates poses.
#[derive(Debug, Default)]
pub struct ReplayBackend {
    rejected_ids: u64,
}

impl ReplayBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded markers dropped because their id is not in the dictionary.
    pub fn rejected_ids(&self) -> u64 {
        self.rejected_ids
    }
}

impl VisionBackend<ReplayFrame> for ReplayBackend {
    fn detect(
        &mut self,
        frame: &ReplayFrame,
        dictionary: DictionaryId,
        _params: &DetectorParams,
    ) -> Result<Vec<MarkerObservation>, BackendError> {
        if frame.line.trim().is_empty() {
            return Ok(Vec::new());
        }
        let recorded: RecordedFrame =
            serde_json::from_str(&frame.line).map_err(|source| BackendError::InvalidFrame {
                index: frame.index,
                source,
            })?;

        let count = dictionary.marker_count();
        let mut observations = Vec::with_capacity(recorded.markers.len());
        for marker in recorded.markers {
            if marker.id >= count {
                self.rejected_ids += 1;
                log::debug!(
                    "frame {}: marker id {} is not in {dictionary}",
                    frame.index,
                    marker.id
                );
                continue;
            }
            let corners = marker.corners.map(|[x, y]| Point2::new(x, y));
            observations.push(MarkerObservation::new(marker.id, corners));
        }
        Ok(observations)
    }

    fn estimate_pose(
        &mut self,
        observations: &mut [MarkerObservation],
        marker_length_m: f64,
        camera: &CameraModel,
    ) {
        for obs in observations.iter_mut() {
            obs.pose = estimate_marker_pose(&obs.corners, marker_length_m, camera);
            if obs.pose.is_none() {
                log::debug!("marker {}: no pose for degenerate corners", obs.id);
            }
        }
    }
}
