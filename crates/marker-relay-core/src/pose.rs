//! Single-marker pose estimation and axis-angle helpers.
//!
//! The pose of a square planar marker follows from the homography between the
//! marker plane and the undistorted normalized image plane:
//! `[x y 1]^T ~ [r1 r2 t] [X Y 1]^T`. The first two rotation columns and the
//! translation are read off `H`, scaled to unit rotation columns, then the
//! rotation is projected onto SO(3).

use nalgebra::{Matrix3, Point2, Rotation3, Vector3};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::camera::CameraModel;
use crate::homography::homography_from_4pt;
use crate::observation::MarkerPose;

/// Rotation matrix of an axis-angle vector (Rodrigues' formula).
///
/// A zero vector yields the identity.
pub fn rotation_matrix(rvec: &Vector3<f64>) -> Matrix3<f64> {
    if rvec.norm() < 1e-15 {
        return Matrix3::identity();
    }
    Rotation3::new(*rvec).into_inner()
}

/// Marker corners in the marker's own plane (z = 0), centre at the origin.
///
/// Order matches the detector output: top-left, top-right, bottom-right,
/// bottom-left, with +y pointing towards the marker's top edge.
pub fn marker_object_points(marker_length: f64) -> [Point2<f64>; 4] {
    let h = marker_length * 0.5;
    [
        Point2::new(-h, h),
        Point2::new(h, h),
        Point2::new(h, -h),
        Point2::new(-h, -h),
    ]
}

/// Estimate a marker pose from its four image corners.
///
/// Returns `None` when the corners cannot be undistorted, the homography is
/// degenerate, or the decomposition is not finite.
#[cfg_attr(feature = "tracing", instrument(level = "trace", skip(corners, camera)))]
pub fn estimate_marker_pose(
    corners: &[Point2<f64>; 4],
    marker_length: f64,
    camera: &CameraModel,
) -> Option<MarkerPose> {
    if !(marker_length.is_finite() && marker_length > 0.0) {
        return None;
    }

    let mut normalized = [Point2::origin(); 4];
    for (dst, &px) in normalized.iter_mut().zip(corners) {
        *dst = camera.undistort_to_normalized(px)?;
    }

    let object = marker_object_points(marker_length);
    let h = homography_from_4pt(&object, &normalized)?.h;

    let h1 = h.column(0).into_owned();
    let h2 = h.column(1).into_owned();
    let h3 = h.column(2).into_owned();

    let norm = 0.5 * (h1.norm() + h2.norm());
    if norm < 1e-12 {
        return None;
    }
    let mut lambda = 1.0 / norm;
    // the marker is in front of the camera
    if h3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = h1 * lambda;
    let r2 = h2 * lambda;
    let r3 = r1.cross(&r2);
    let tvec = h3 * lambda;

    let r_approx = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = r_approx.svd(true, true);
    let mut u = svd.u?;
    let v_t = svd.v_t?;
    if (u * v_t).determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    let rot = u * v_t;

    let rvec = Rotation3::from_matrix_unchecked(rot).scaled_axis();
    if rvec.iter().chain(tvec.iter()).any(|v| !v.is_finite()) {
        return None;
    }

    Some(MarkerPose::new(rvec, tvec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraIntrinsics, RadialTangentialDistortion};
    use approx::assert_relative_eq;

    fn camera() -> CameraModel {
        CameraModel::new(
            CameraIntrinsics {
                fx: 900.0,
                fy: 900.0,
                cx: 640.0,
                cy: 360.0,
            },
            RadialTangentialDistortion {
                k1: -0.12,
                k2: 0.03,
                p1: 0.0005,
                p2: -0.0002,
                k3: 0.0,
            },
        )
    }

    fn project(camera: &CameraModel, pose: &MarkerPose, length: f64) -> [Point2<f64>; 4] {
        let r = pose.rotation();
        marker_object_points(length).map(|p| {
            let c = r * Vector3::new(p.x, p.y, 0.0) + pose.tvec;
            camera.project_normalized(Point2::new(c.x / c.z, c.y / c.z))
        })
    }

    #[test]
    fn zero_rvec_is_identity() {
        assert_eq!(rotation_matrix(&Vector3::zeros()), Matrix3::identity());
    }

    #[test]
    fn quarter_turn_about_z() {
        let r = rotation_matrix(&Vector3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2));
        let v = r * Vector3::new(1.0, 0.0, 0.0);
        assert_relative_eq!(v, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn recovers_synthetic_pose() {
        let cam = camera();
        let length = 0.2;
        let truth = MarkerPose::new(Vector3::new(2.9, 0.15, -0.3), Vector3::new(0.12, -0.05, 1.6));
        let corners = project(&cam, &truth, length);

        let est = estimate_marker_pose(&corners, length, &cam).expect("pose");
        assert_relative_eq!(est.tvec, truth.tvec, epsilon = 1e-6);
        assert_relative_eq!(est.rotation(), truth.rotation(), epsilon = 1e-6);
    }

    #[test]
    fn translation_scales_with_marker_length() {
        let cam = camera();
        let truth = MarkerPose::new(Vector3::new(3.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 1.0));
        let corners = project(&cam, &truth, 0.1);

        let est = estimate_marker_pose(&corners, 0.2, &cam).expect("pose");
        assert_relative_eq!(est.tvec, truth.tvec * 2.0, epsilon = 1e-6);
    }

    #[test]
    fn rejects_non_positive_length() {
        let cam = camera();
        let corners = [Point2::new(600.0, 320.0); 4];
        assert!(estimate_marker_pose(&corners, 0.0, &cam).is_none());
    }
}
