//! Synthetic chessboard views: board poses, ideal projections and rendered images.
//!
//! With an identity rotation the target's `x` axis points right and `y` down in
//! the image, so world corner `(0, 0)` is the top-left interior corner.

use crate::{CalibrationTarget, GrayImage, Homography, IntrinsicParameters};
use nalgebra::{Matrix3, Point2, Point3, Rotation3, Vector3};

/// Rigid transform from target coordinates to the camera frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoardPose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl BoardPose {
    /// Rotate the target about its own center by `(roll, pitch, yaw)` and put
    /// that center at `center` in the camera frame.
    pub fn centered(
        target: &CalibrationTarget,
        roll: f64,
        pitch: f64,
        yaw: f64,
        center: Vector3<f64>,
    ) -> Self {
        let s = target.square_size;
        let c = Vector3::new(
            0.5 * (target.grid_width - 1) as f64 * s,
            0.5 * (target.grid_height - 1) as f64 * s,
            0.0,
        );
        let rotation = Rotation3::from_euler_angles(roll, pitch, yaw);
        Self {
            rotation,
            translation: center - rotation * c,
        }
    }

    pub fn transform(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation * p + self.translation
    }
}

/// A varied set of poses at roughly `distance` from the camera, suitable for calibration.
pub fn calibration_poses(target: &CalibrationTarget, distance: f64) -> Vec<BoardPose> {
    let tilts: [(f64, f64, f64, f64, f64); 8] = [
        (0.25, 0.0, 0.02, 0.0, 0.0),
        (-0.25, 0.05, -0.03, 0.05, -0.04),
        (0.0, 0.3, 0.05, -0.06, 0.03),
        (0.05, -0.3, -0.02, 0.04, 0.05),
        (0.2, 0.2, 0.1, -0.03, -0.05),
        (-0.2, -0.2, -0.08, 0.06, 0.02),
        (0.3, -0.15, 0.0, -0.05, 0.06),
        (-0.15, 0.28, 0.04, 0.03, -0.06),
    ];
    tilts
        .iter()
        .enumerate()
        .map(|(k, &(roll, pitch, yaw, ox, oy))| {
            let d = distance * (1.0 + 0.05 * (k % 3) as f64);
            BoardPose::centered(
                target,
                roll,
                pitch,
                yaw,
                Vector3::new(ox * distance, oy * distance, d),
            )
        })
        .collect()
}

/// Project every target corner with full intrinsics including distortion.
///
/// Returns `None` when any corner falls behind the camera.
pub fn project_target(
    intrinsics: &IntrinsicParameters,
    target: &CalibrationTarget,
    pose: &BoardPose,
) -> Option<Vec<Point2<f64>>> {
    target
        .world_points()
        .iter()
        .map(|p| intrinsics.project(&pose.transform(p)))
        .collect()
}

/// `H = K [r1 r2 t]`, the image-from-target homography ignoring distortion.
pub fn board_homography(intrinsics: &IntrinsicParameters, pose: &BoardPose) -> Homography {
    let r = pose.rotation.matrix();
    let mut m = Matrix3::zeros();
    m.set_column(0, &r.column(0));
    m.set_column(1, &r.column(1));
    m.set_column(2, &pose.translation);
    Homography::new(intrinsics.camera_matrix() * m)
}

/// Appearance of a rendered board.
#[derive(Clone, Copy, Debug)]
pub struct RenderStyle {
    pub dark: u8,
    pub light: u8,
    /// Sub-samples per pixel edge used for anti-aliasing.
    pub supersample: usize,
    /// Peak brightness added by a radial highlight centred on the image.
    pub glare: f32,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            dark: 30,
            light: 220,
            supersample: 4,
            glare: 0.0,
        }
    }
}

fn is_dark(target: &CalibrationTarget, p: Point2<f64>) -> bool {
    let s = target.square_size;
    let qx = (p.x / s).floor();
    let qy = (p.y / s).floor();
    let inside = qx >= -1.0
        && qy >= -1.0
        && qx < target.grid_width as f64
        && qy < target.grid_height as f64;
    inside && (qx as i64 + qy as i64).rem_euclid(2) == 0
}

/// Render the target seen through `h_img_from_board` into a `width x height` image.
///
/// The board has one square beyond each outer interior corner and sits on a
/// light background. Pixel centers are at integer coordinates.
pub fn render_chessboard(
    target: &CalibrationTarget,
    h_img_from_board: &Homography,
    width: usize,
    height: usize,
    style: &RenderStyle,
) -> Option<GrayImage> {
    let h_board_from_img = h_img_from_board.inverse()?;
    let ss = style.supersample.max(1);
    let inv_ss = 1.0 / ss as f64;
    let (dark, light) = (style.dark as f32, style.light as f32);
    let (gx, gy) = (0.5 * width as f32, 0.5 * height as f32);
    let sigma2 = 2.0 * (0.35 * width.max(height) as f32).powi(2);

    Some(GrayImage::from_fn(width, height, |x, y| {
        let mut dark_count = 0usize;
        for a in 0..ss {
            for b in 0..ss {
                let px = x as f64 - 0.5 + (a as f64 + 0.5) * inv_ss;
                let py = y as f64 - 0.5 + (b as f64 + 0.5) * inv_ss;
                if is_dark(target, h_board_from_img.apply(Point2::new(px, py))) {
                    dark_count += 1;
                }
            }
        }
        let frac = dark_count as f32 / (ss * ss) as f32;
        let mut v = light + (dark - light) * frac;
        if style.glare > 0.0 {
            let d2 = (x as f32 - gx).powi(2) + (y as f32 - gy).powi(2);
            v += style.glare * (-d2 / sigma2).exp();
        }
        v.round().clamp(0.0, 255.0) as u8
    }))
}
