//! Camera intrinsics and radial-tangential distortion model.
//!
//! The relay only needs the camera model to turn marker corner pixels into
//! undistorted normalized coordinates before pose estimation.

use nalgebra::{Matrix3, Point2};
use serde::{Deserialize, Serialize};

/// Pinhole camera intrinsics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraIntrinsics {
    /// Focal length in x (pixels).
    pub fx: f64,
    /// Focal length in y (pixels).
    pub fy: f64,
    /// Principal point x (pixels).
    pub cx: f64,
    /// Principal point y (pixels).
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Read intrinsics from a row-major 3x3 camera matrix.
    ///
    /// Skew is ignored; the last row must be `[0, 0, 1]`.
    pub fn from_matrix(rows: [[f64; 3]; 3]) -> Option<Self> {
        let last_row_ok = rows[2][0].abs() < 1e-9
            && rows[2][1].abs() < 1e-9
            && (rows[2][2] - 1.0).abs() < 1e-9;
        if !last_row_ok {
            return None;
        }
        let k = Self {
            fx: rows[0][0],
            fy: rows[1][1],
            cx: rows[0][2],
            cy: rows[1][2],
        };
        k.is_valid().then_some(k)
    }

    /// Returns `true` when all values are finite and focal lengths are non-zero.
    pub fn is_valid(self) -> bool {
        self.fx.is_finite()
            && self.fy.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.fx.abs() > 1e-12
            && self.fy.abs() > 1e-12
    }

    /// The camera matrix `K`.
    pub fn matrix(self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Convert pixel coordinates to normalized pinhole coordinates.
    pub fn pixel_to_normalized(self, pixel: Point2<f64>) -> Option<Point2<f64>> {
        if !self.is_valid() {
            return None;
        }
        let x = (pixel.x - self.cx) / self.fx;
        let y = (pixel.y - self.cy) / self.fy;
        (x.is_finite() && y.is_finite()).then(|| Point2::new(x, y))
    }

    /// Convert normalized pinhole coordinates to pixel coordinates.
    pub fn normalized_to_pixel(self, normalized: Point2<f64>) -> Point2<f64> {
        Point2::new(
            self.fx * normalized.x + self.cx,
            self.fy * normalized.y + self.cy,
        )
    }
}

/// Brown-Conrady radial-tangential distortion coefficients.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RadialTangentialDistortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl RadialTangentialDistortion {
    /// Build from an OpenCV-ordered coefficient list `k1, k2, p1, p2[, k3, ...]`.
    ///
    /// Coefficients past `k3` (rational and thin-prism terms) are not modelled
    /// and must be zero.
    pub fn from_coefficients(coeffs: &[f64]) -> Option<Self> {
        if coeffs.len() < 4 || coeffs.iter().any(|c| !c.is_finite()) {
            return None;
        }
        if coeffs.iter().skip(5).any(|c| c.abs() > 1e-12) {
            return None;
        }
        Some(Self {
            k1: coeffs[0],
            k2: coeffs[1],
            p1: coeffs[2],
            p2: coeffs[3],
            k3: coeffs.get(4).copied().unwrap_or(0.0),
        })
    }

    /// Apply distortion to normalized coordinates.
    pub fn distort_normalized(self, p: Point2<f64>) -> Point2<f64> {
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Point2::new(x * radial + x_tan, y * radial + y_tan)
    }
}

/// Distortion inversion settings used by iterative undistortion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UndistortConfig {
    /// Maximum fixed-point iterations.
    pub max_iters: usize,
    /// Stop when the coordinate update norm is below this threshold.
    pub eps: f64,
}

impl Default for UndistortConfig {
    fn default() -> Self {
        Self {
            max_iters: 20,
            eps: 1e-12,
        }
    }
}

/// Complete camera model (intrinsics + radial-tangential distortion).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraModel {
    pub intrinsics: CameraIntrinsics,
    #[serde(default)]
    pub distortion: RadialTangentialDistortion,
}

impl CameraModel {
    pub fn new(intrinsics: CameraIntrinsics, distortion: RadialTangentialDistortion) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    /// Project a normalized point into distorted image pixels.
    pub fn project_normalized(self, normalized: Point2<f64>) -> Point2<f64> {
        let xd = self.distortion.distort_normalized(normalized);
        self.intrinsics.normalized_to_pixel(xd)
    }

    /// Map a distorted image pixel to undistorted normalized coordinates.
    pub fn undistort_to_normalized(self, pixel: Point2<f64>) -> Option<Point2<f64>> {
        self.undistort_to_normalized_with(pixel, UndistortConfig::default())
    }

    /// Same as [`CameraModel::undistort_to_normalized`] with custom iteration settings.
    pub fn undistort_to_normalized_with(
        self,
        pixel: Point2<f64>,
        cfg: UndistortConfig,
    ) -> Option<Point2<f64>> {
        let xd = self.intrinsics.pixel_to_normalized(pixel)?;
        let d = self.distortion;
        let mut x = xd.x;
        let mut y = xd.y;

        for _ in 0..cfg.max_iters.max(1) {
            let r2 = x * x + y * y;
            let r4 = r2 * r2;
            let r6 = r4 * r2;
            let radial = 1.0 + d.k1 * r2 + d.k2 * r4 + d.k3 * r6;
            if !radial.is_finite() || radial.abs() < 1e-12 {
                return None;
            }

            let dx_tan = 2.0 * d.p1 * x * y + d.p2 * (r2 + 2.0 * x * x);
            let dy_tan = d.p1 * (r2 + 2.0 * y * y) + 2.0 * d.p2 * x * y;
            let x_next = (xd.x - dx_tan) / radial;
            let y_next = (xd.y - dy_tan) / radial;

            if !x_next.is_finite() || !y_next.is_finite() {
                return None;
            }

            let step = ((x_next - x).powi(2) + (y_next - y).powi(2)).sqrt();
            x = x_next;
            y = y_next;

            if step <= cfg.eps.max(0.0) {
                break;
            }
        }

        Some(Point2::new(x, y))
    }
}
