use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};
use pinhole_gauge_core::Homography;

/// Decompose a target-plane homography into the target pose in the camera frame.
///
/// `k` is the camera matrix. The scale is the mean of the first two column
/// norms of `K⁻¹H`, signed so that the target lies in front of the camera.
/// The rotation is projected back onto SO(3) with an SVD.
pub fn pose_from_homography(k: &Matrix3<f64>, h: &Homography) -> Option<Isometry3<f64>> {
    let k_inv = k.try_inverse()?;
    let a = k_inv * h.h;
    let a1 = a.column(0).into_owned();
    let a2 = a.column(1).into_owned();
    let a3 = a.column(2).into_owned();

    let norm = 0.5 * (a1.norm() + a2.norm());
    if norm <= f64::EPSILON {
        return None;
    }
    let mut lambda = 1.0 / norm;
    if a3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = a1 * lambda;
    let r2 = a2 * lambda;
    let r3 = r1.cross(&r2);
    let r = Matrix3::from_columns(&[r1, r2, r3]);

    let svd = r.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u = u;
        u.column_mut(2).neg_mut();
        r_orth = u * v_t;
    }

    let t: Vector3<f64> = a3 * lambda;
    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    Some(Isometry3::from_parts(Translation3::from(t), rotation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pinhole_gauge_core::synthetic::{board_homography, BoardPose};
    use pinhole_gauge_core::{CalibrationTarget, IntrinsicParameters};

    #[test]
    fn recovers_pose_regardless_of_homography_sign() {
        let camera = IntrinsicParameters::pinhole(800.0, 780.0, 640.0, 360.0, [1280, 720]);
        let target = CalibrationTarget::default();
        let pose = BoardPose::centered(&target, 0.2, -0.15, 0.1, Vector3::new(20.0, -10.0, 700.0));
        let h = board_homography(&camera, &pose);

        for scale in [1.0, -3.5] {
            let scaled = Homography::new(h.h * scale);
            let iso = pose_from_homography(&camera.camera_matrix(), &scaled).unwrap();
            assert_relative_eq!(iso.translation.vector, pose.translation, epsilon = 1e-6);
            assert_relative_eq!(
                *iso.rotation.to_rotation_matrix().matrix(),
                *pose.rotation.matrix(),
                epsilon = 1e-9
            );
        }
    }
}
