//! Per-frame marker observations.

use nalgebra::{Matrix3, Point2, Vector3};
use serde::{Deserialize, Serialize};

use crate::pose::rotation_matrix;

/// Rigid transform of a marker relative to the camera.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerPose {
    /// Axis-angle rotation (direction = axis, norm = angle in radians).
    pub rvec: Vector3<f64>,
    /// Marker centre in camera coordinates (metres).
    pub tvec: Vector3<f64>,
}

impl MarkerPose {
    pub fn new(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self { rvec, tvec }
    }

    /// Rotation matrix of `rvec`.
    #[inline]
    pub fn rotation(&self) -> Matrix3<f64> {
        rotation_matrix(&self.rvec)
    }
}

/// One detected marker in one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerObservation {
    /// Dictionary id of the marker.
    pub id: u32,
    /// Image corners in pixels, clockwise starting at the marker's top-left.
    pub corners: [Point2<f64>; 4],
    /// Present only once pose estimation ran for this frame.
    #[serde(default)]
    pub pose: Option<MarkerPose>,
}

impl MarkerObservation {
    pub fn new(id: u32, corners: [Point2<f64>; 4]) -> Self {
        Self {
            id,
            corners,
            pose: None,
        }
    }

    pub fn with_pose(mut self, pose: MarkerPose) -> Self {
        self.pose = Some(pose);
        self
    }
}
