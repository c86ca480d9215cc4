//! Closed-form intrinsics from plane homographies (Zhang, 2000).

use crate::engine::CalibrationError;
use nalgebra::{DMatrix, Matrix3, SVector};
use pinhole_gauge_core::{Homography, IntrinsicParameters};

/// The 6-vector `v_ij` with `h_iᵀ B h_j = v_ijᵀ b`.
fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 6> {
    let hi = h.column(i);
    let hj = h.column(j);
    SVector::<f64, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Pixel-to-unit conditioning: centers the image and scales by its larger side.
fn conditioning(image_size: [u32; 2]) -> (Matrix3<f64>, f64, f64, f64) {
    let s = image_size[0].max(image_size[1]).max(1) as f64;
    let ox = 0.5 * image_size[0] as f64;
    let oy = 0.5 * image_size[1] as f64;
    let n = Matrix3::new(
        1.0 / s, 0.0, -ox / s, //
        0.0, 1.0 / s, -oy / s, //
        0.0, 0.0, 1.0,
    );
    (n, s, ox, oy)
}

/// Estimate a zero-skew pinhole camera from at least three homographies.
///
/// Homographies map target-plane coordinates to pixels. They are conditioned
/// into a unit frame around the image center before building `V b = 0`, with
/// one extra row enforcing `B12 = 0`.
pub fn intrinsics_from_homographies(
    homographies: &[Homography],
    image_size: [u32; 2],
) -> Result<IntrinsicParameters, CalibrationError> {
    if homographies.len() < 3 {
        return Err(CalibrationError::Degenerate(format!(
            "closed-form initialization needs 3 homographies, got {}",
            homographies.len()
        )));
    }

    let (n, s, ox, oy) = conditioning(image_size);
    let m = homographies.len();
    let mut v = DMatrix::<f64>::zeros(2 * m + 1, 6);
    for (k, h) in homographies.iter().enumerate() {
        let hn = n * h.h;
        let hn = hn / hn.norm();
        let v11 = v_ij(&hn, 0, 0);
        let v22 = v_ij(&hn, 1, 1);
        let v12 = v_ij(&hn, 0, 1);
        v.row_mut(2 * k).copy_from(&v12.transpose());
        v.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }
    v[(2 * m, 1)] = 1.0;

    let svd = v.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| CalibrationError::Degenerate("SVD did not converge".into()))?;
    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&a, &b| svd.singular_values[a].total_cmp(&svd.singular_values[b]));
    if order.len() < 6 {
        return Err(CalibrationError::Degenerate("empty SVD".into()));
    }
    // A null space wider than one dimension leaves b undetermined.
    let largest = svd.singular_values[order[5]];
    if svd.singular_values[order[1]] <= 1e-9 * largest {
        return Err(CalibrationError::Degenerate(
            "homographies are rank deficient; vary the board tilt".into(),
        ));
    }
    let b = v_t.row(order[0]);
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    let scale = b11 * b11 + b22 * b22;
    if scale <= 0.0 || denom.abs() / scale <= 1e-9 {
        return Err(CalibrationError::Degenerate(
            "views do not constrain the focal lengths; vary the board tilt".into(),
        ));
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    let fx2 = lambda / b11;
    let fy2 = lambda * b11 / denom;
    if !(fx2 > 0.0 && fy2 > 0.0) {
        return Err(CalibrationError::Degenerate(format!(
            "closed-form solution has no real focal length (lambda = {lambda:.3e})"
        )));
    }
    let alpha = fx2.sqrt();
    let beta = fy2.sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    Ok(IntrinsicParameters::pinhole(
        alpha * s,
        beta * s,
        u0 * s + ox,
        v0 * s + oy,
        image_size,
    ))
}
