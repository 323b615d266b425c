//! Core types and geometry for the marker pose relay.
//!
//! This crate is purely geometric and has no I/O. It covers:
//! - the resolved session configuration,
//! - per-frame marker observations and single-marker poses,
//! - planar pose estimation from four marker corners,
//! - relating the tracked object marker to the ground marker.
//!
//! Frame acquisition, marker detection and telemetry transport live in
//! `marker-relay`.

mod camera;
mod config;
mod homography;
mod logger;
mod observation;
mod pose;
mod relate;

pub use camera::{CameraIntrinsics, CameraModel, RadialTangentialDistortion, UndistortConfig};
pub use config::{
    ConfigValidationError, DetectorParams, DictionaryId, OutputConfig, SessionConfig,
    DEFAULT_BIND_ADDR, DEFAULT_GROUND_MARKER_ID, DEFAULT_MARKER_LENGTH_M,
    DEFAULT_OBJECT_MARKER_ID,
};
pub use homography::{homography_from_4pt, Homography};
pub use observation::{MarkerObservation, MarkerPose};
pub use pose::{estimate_marker_pose, marker_object_points, rotation_matrix};
pub use relate::{
    heading_degrees, relate, RelationResult, DIAGNOSTIC_GROUND_ID, DIAGNOSTIC_OBJECT_ID,
    HEADING_OFFSET_DEG,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
