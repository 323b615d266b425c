//! Relating the tracked object marker to the ground marker.
//!
//! Two independent outputs are produced per frame:
//! - the primary result, keyed on the configured object marker id: its
//!   camera-frame translation and a corner-derived heading;
//! - a diagnostic ground-relative offset, keyed on the fixed ids
//!   [`DIAGNOSTIC_OBJECT_ID`] and [`DIAGNOSTIC_GROUND_ID`].
//!
//! The two paths use different id conventions and are kept apart on purpose;
//! the diagnostic never feeds into `detected`, `position` or the heading.

use std::f64::consts::PI;

use nalgebra::{Point2, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::config::SessionConfig;
use crate::observation::{MarkerObservation, MarkerPose};

/// Mounting offset between the marker's diagonal and the vehicle heading.
pub const HEADING_OFFSET_DEG: f64 = 45.0;
/// Fixed id of the tracked marker in the ground-relative diagnostic.
pub const DIAGNOSTIC_OBJECT_ID: u32 = 0;
/// Fixed id of the reference marker in the ground-relative diagnostic.
pub const DIAGNOSTIC_GROUND_ID: u32 = 1;

/// Per-frame relation between the object marker and the ground marker.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationResult {
    /// Object marker seen with a pose in this frame.
    pub detected: bool,
    /// Object translation in metres; zero when not detected.
    pub position: Vector3<f64>,
    /// Object heading in degrees; zero when not detected.
    pub heading_degrees: f64,
    /// `R_ground * (t_object - t_ground)` for the fixed diagnostic ids.
    pub ground_relative_delta: Option<Vector3<f64>>,
    /// The configured ground marker appears in the frame.
    pub ground_visible: bool,
}

impl RelationResult {
    /// The "not detected" sentinel: every numeric field is exactly zero.
    pub fn not_detected() -> Self {
        Self {
            detected: false,
            position: Vector3::zeros(),
            heading_degrees: 0.0,
            ground_relative_delta: None,
            ground_visible: false,
        }
    }
}

impl Default for RelationResult {
    fn default() -> Self {
        Self::not_detected()
    }
}

/// Heading of a marker from its first and third corner, with the mounting offset.
///
/// Image y grows downwards, hence `c0.y - c2.y`.
#[inline]
pub fn heading_degrees(corners: &[Point2<f64>; 4]) -> f64 {
    let c0 = corners[0];
    let c2 = corners[2];
    (c0.y - c2.y).atan2(c2.x - c0.x) * 180.0 / PI + HEADING_OFFSET_DEG
}

/// First observation with `id`; duplicates later in the scan are ignored.
fn first_with_id(observations: &[MarkerObservation], id: u32) -> Option<&MarkerObservation> {
    observations.iter().find(|o| o.id == id)
}

fn first_pose_with_id(observations: &[MarkerObservation], id: u32) -> Option<MarkerPose> {
    first_with_id(observations, id).and_then(|o| o.pose)
}

fn ground_relative_delta(observations: &[MarkerObservation]) -> Option<Vector3<f64>> {
    let object = first_pose_with_id(observations, DIAGNOSTIC_OBJECT_ID)?;
    let ground = first_pose_with_id(observations, DIAGNOSTIC_GROUND_ID)?;
    let delta = object.tvec - ground.tvec;
    log::trace!(
        "object t=({:.4}, {:.4}, {:.4}) ground t=({:.4}, {:.4}, {:.4}) diff=({:.4}, {:.4}, {:.4})",
        object.tvec.x,
        object.tvec.y,
        object.tvec.z,
        ground.tvec.x,
        ground.tvec.y,
        ground.tvec.z,
        delta.x,
        delta.y,
        delta.z
    );
    Some(ground.rotation() * delta)
}

/// Relate one frame's observations under `config`.
///
/// Pure function of its inputs: no state is carried between frames.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(observations, config), fields(markers = observations.len()))
)]
pub fn relate(observations: &[MarkerObservation], config: &SessionConfig) -> RelationResult {
    let mut result = RelationResult::not_detected();
    if !config.pose_enabled() || observations.is_empty() {
        return result;
    }

    result.ground_visible = first_with_id(observations, config.ground_marker_id).is_some();
    result.ground_relative_delta = ground_relative_delta(observations);

    let Some(object) = first_with_id(observations, config.object_marker_id) else {
        return result;
    };
    let Some(pose) = object.pose else {
        return result;
    };

    let mut position = pose.tvec;
    let mut heading = heading_degrees(&object.corners);
    if config.camera_mounted_on_top {
        position.y = -position.y;
        position.z = -position.z;
        heading = -heading;
    }

    result.detected = true;
    result.position = position;
    result.heading_degrees = heading;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraIntrinsics, CameraModel, RadialTangentialDistortion};
    use crate::config::DictionaryId;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn config(object: u32, ground: u32, top: bool) -> SessionConfig {
        let mut cfg = SessionConfig::new(DictionaryId::Dict4x4_50);
        cfg.object_marker_id = object;
        cfg.ground_marker_id = ground;
        cfg.camera_mounted_on_top = top;
        cfg.camera = Some(CameraModel::new(
            CameraIntrinsics {
                fx: 600.0,
                fy: 600.0,
                cx: 320.0,
                cy: 240.0,
            },
            RadialTangentialDistortion::default(),
        ));
        cfg
    }

    fn square(x0: f64, y0: f64, side: f64) -> [Point2<f64>; 4] {
        [
            Point2::new(x0, y0),
            Point2::new(x0 + side, y0),
            Point2::new(x0 + side, y0 + side),
            Point2::new(x0, y0 + side),
        ]
    }

    fn observed(id: u32, corners: [Point2<f64>; 4], t: Vector3<f64>) -> MarkerObservation {
        MarkerObservation::new(id, corners).with_pose(MarkerPose::new(Vector3::zeros(), t))
    }

    #[test]
    fn missing_object_is_all_zero() {
        let cfg = config(7, 1, false);
        let obs = vec![observed(3, square(10.0, 10.0, 20.0), Vector3::new(1.0, 2.0, 3.0))];
        let r = relate(&obs, &cfg);
        assert!(!r.detected);
        assert_eq!(r.position, Vector3::zeros());
        assert_eq!(r.heading_degrees, 0.0);

        assert_eq!(relate(&[], &cfg), RelationResult::not_detected());
    }

    #[test]
    fn pose_disabled_never_detects() {
        let mut cfg = config(7, 1, false);
        cfg.camera = None;
        let obs = vec![
            observed(7, square(10.0, 10.0, 20.0), Vector3::new(1.0, 2.0, 3.0)),
            observed(0, square(50.0, 10.0, 20.0), Vector3::new(1.0, 0.0, 3.0)),
            observed(1, square(90.0, 10.0, 20.0), Vector3::new(0.0, 0.0, 3.0)),
        ];
        let r = relate(&obs, &cfg);
        assert_eq!(r, RelationResult::not_detected());
    }

    #[test]
    fn object_without_pose_is_not_detected() {
        let cfg = config(7, 1, false);
        let obs = vec![MarkerObservation::new(7, square(10.0, 10.0, 20.0))];
        assert!(!relate(&obs, &cfg).detected);
    }

    #[test]
    fn heading_matches_corner_formula() {
        let cfg = config(7, 1, false);
        let corners = [
            Point2::new(100.0, 200.0),
            Point2::new(140.0, 190.0),
            Point2::new(150.0, 230.0),
            Point2::new(110.0, 240.0),
        ];
        let obs = vec![observed(7, corners, Vector3::new(0.1, 0.2, 1.5))];
        let r = relate(&obs, &cfg);

        let expected = (200.0_f64 - 230.0).atan2(150.0 - 100.0) * 180.0 / PI + 45.0;
        assert!(r.detected);
        assert_eq!(r.heading_degrees, expected);
        assert_eq!(r.position, Vector3::new(0.1, 0.2, 1.5));
    }

    #[test]
    fn axis_aligned_square_heads_zero() {
        // c0 top-left, c2 bottom-right: atan2(-s, s) = -45 deg
        assert_relative_eq!(heading_degrees(&square(0.0, 0.0, 10.0)), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn top_mount_negates_y_z_and_heading() {
        let corners = square(30.0, 40.0, 25.0);
        let mut corners_rot = corners;
        corners_rot[2] = Point2::new(60.0, 20.0);
        let t = Vector3::new(0.3, -0.4, 2.0);
        let obs = vec![observed(5, corners_rot, t)];

        let side = relate(&obs, &config(5, 1, false));
        let top = relate(&obs, &config(5, 1, true));

        assert!(side.detected && top.detected);
        assert_eq!(top.position.x, side.position.x);
        assert_eq!(top.position.y, -side.position.y);
        assert_eq!(top.position.z, -side.position.z);
        assert_eq!(top.heading_degrees, -side.heading_degrees);
    }

    #[test]
    fn duplicate_ids_take_first_in_scan_order() {
        let cfg = config(7, 1, false);
        let obs = vec![
            observed(7, square(0.0, 0.0, 10.0), Vector3::new(1.0, 1.0, 1.0)),
            observed(7, square(0.0, 0.0, 10.0), Vector3::new(9.0, 9.0, 9.0)),
        ];
        assert_eq!(relate(&obs, &cfg).position, Vector3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn delta_with_identity_ground_rotation_is_subtraction() {
        let cfg = config(7, 1, false);
        let obs = vec![
            observed(0, square(0.0, 0.0, 10.0), Vector3::new(0.5, 0.25, 2.0)),
            observed(1, square(50.0, 0.0, 10.0), Vector3::new(0.1, -0.25, 2.5)),
        ];
        let r = relate(&obs, &cfg);
        assert!(!r.detected, "diagnostic ids do not drive detection");
        assert!(r.ground_visible);
        let delta = r.ground_relative_delta.expect("delta");
        assert_relative_eq!(delta, Vector3::new(0.4, 0.5, -0.5), epsilon = 1e-12);
    }

    #[test]
    fn delta_is_rotated_by_ground_rotation() {
        let cfg = config(7, 1, false);
        let ground = MarkerObservation::new(1, square(50.0, 0.0, 10.0)).with_pose(MarkerPose::new(
            Vector3::new(0.0, 0.0, FRAC_PI_2),
            Vector3::new(0.0, 0.0, 2.0),
        ));
        let obs = vec![
            observed(0, square(0.0, 0.0, 10.0), Vector3::new(1.0, 0.0, 2.0)),
            ground,
        ];
        let delta = relate(&obs, &cfg).ground_relative_delta.expect("delta");
        // R_z(90) * (1, 0, 0) = (0, 1, 0)
        assert_relative_eq!(delta, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn delta_needs_both_diagnostic_markers() {
        let cfg = config(0, 2, false);
        let obs = vec![observed(0, square(0.0, 0.0, 10.0), Vector3::new(1.0, 0.0, 2.0))];
        let r = relate(&obs, &cfg);
        assert!(r.detected);
        assert!(r.ground_relative_delta.is_none());
        assert!(!r.ground_visible);
    }
}
