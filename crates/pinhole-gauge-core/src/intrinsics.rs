use crate::projection::Axis;
use nalgebra::{Matrix3, Point2, Point3, Vector2};
use serde::{Deserialize, Serialize};

/// Brown–Conrady lens distortion with three radial and two tangential terms.
///
/// Coefficients follow the OpenCV order `[k1, k2, p1, p2, k3]` and act on
/// normalized image coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    pub fn from_opencv(c: [f64; 5]) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
        }
    }

    pub fn to_opencv(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn distort(&self, n: Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;

        let xy = x * y;
        let x_tan = 2.0 * self.p1 * xy + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * xy;

        Vector2::new(x * radial + x_tan, y * radial + y_tan)
    }

    /// Fixed-point inversion of [`Self::distort`].
    pub fn undistort(&self, nd: Vector2<f64>, iters: usize) -> Vector2<f64> {
        let mut n = nd;
        for _ in 0..iters.max(1) {
            let err = self.distort(n) - nd;
            n -= err;
        }
        n
    }
}

/// Camera intrinsics recovered by a calibration run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicParameters {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    #[serde(default)]
    pub distortion: Distortion,
    /// Reprojection RMS in pixels over every corner used by the run.
    #[serde(default)]
    pub rms_error: f64,
    /// `[width, height]` of the calibration images.
    pub image_size: [u32; 2],
}

impl IntrinsicParameters {
    /// Distortion-free intrinsics, e.g. for measurement with a known focal length.
    pub fn pinhole(fx: f64, fy: f64, cx: f64, cy: f64, image_size: [u32; 2]) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            distortion: Distortion::default(),
            rms_error: 0.0,
            image_size,
        }
    }

    pub fn camera_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Focal length used for a measurement along `axis`.
    pub fn focal_for(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Horizontal => self.fx,
            Axis::Vertical => self.fy,
        }
    }

    pub fn mean_focal(&self) -> f64 {
        0.5 * (self.fx + self.fy)
    }

    /// Project a camera-frame point. Returns `None` behind the camera.
    pub fn project(&self, p: &Point3<f64>) -> Option<Point2<f64>> {
        if p.z <= f64::EPSILON {
            return None;
        }
        let n = self.distortion.distort(Vector2::new(p.x / p.z, p.y / p.z));
        Some(Point2::new(
            self.fx * n.x + self.cx,
            self.fy * n.y + self.cy,
        ))
    }

    /// Map a distorted pixel to undistorted normalized coordinates.
    pub fn normalize(&self, px: &Point2<f64>) -> Vector2<f64> {
        let nd = Vector2::new((px.x - self.cx) / self.fx, (px.y - self.cy) / self.fy);
        self.distortion.undistort(nd, 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn undistort_inverts_distort() {
        let d = Distortion {
            k1: -0.2,
            k2: 0.05,
            p1: 0.001,
            p2: -0.0005,
            k3: 0.0,
        };
        let n = Vector2::new(0.25, -0.18);
        let back = d.undistort(d.distort(n), 20);
        assert_relative_eq!(n.x, back.x, epsilon = 1e-9);
        assert_relative_eq!(n.y, back.y, epsilon = 1e-9);
    }

    #[test]
    fn opencv_order_round_trips() {
        let c = [0.1, -0.2, 0.003, 0.004, 0.05];
        assert_eq!(c, Distortion::from_opencv(c).to_opencv());
    }

    #[test]
    fn projects_principal_ray_to_principal_point() {
        let k = IntrinsicParameters::pinhole(800.0, 810.0, 320.0, 240.0, [640, 480]);
        let p = k.project(&Point3::new(0.0, 0.0, 2.0)).unwrap();
        assert_relative_eq!(320.0, p.x);
        assert_relative_eq!(240.0, p.y);
        assert!(k.project(&Point3::new(0.0, 0.0, -1.0)).is_none());
        assert_relative_eq!(810.0, k.focal_for(Axis::Vertical));
    }

    #[test]
    fn deserializes_without_optional_fields() {
        let json = r#"{"fx":1160.39,"fy":1161.54,"cx":960.0,"cy":540.0,"image_size":[1920,1080]}"#;
        let k: IntrinsicParameters = serde_json::from_str(json).unwrap();
        assert_eq!(Distortion::default(), k.distortion);
        assert_relative_eq!(1160.39, k.fx);
    }
}
