//! Sub-pixel corner refinement.
//!
//! Two refiners, one per detector strategy:
//!
//! - [`refine_gradient`] solves for the point `q` where every image gradient
//!   in the window is orthogonal to `p - q`. This is the classical
//!   `cornerSubPix` formulation.
//! - [`refine_saddle`] fits `f(x, y) = a x² + b xy + c y² + d x + e y + g` to
//!   a smoothed patch and moves to the stationary point of the saddle.
//!
//! Both iterate until an update is shorter than `eps` or the iteration budget
//! runs out, and both report `None` when the system degenerates.

use crate::params::{SaddleParams, SubPixParams};
use nalgebra::{Matrix2, Matrix6, Point2, Vector2, Vector6};
use pinhole_gauge_core::{sample_bilinear, GrayImageView};

/// Outcome of one corner refinement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Refined {
    pub position: Point2<f32>,
    pub iterations: usize,
    pub converged: bool,
}

/// Gradient-orthogonality refinement around `start`.
pub fn refine_gradient(
    img: &GrayImageView<'_>,
    start: Point2<f32>,
    params: &SubPixParams,
) -> Option<Refined> {
    let hw = params.half_window.max(1) as i32;
    let sigma = hw as f32;
    let inv_two_s2 = 1.0 / (2.0 * sigma * sigma);

    let mut q = start;
    for iter in 0..params.max_iters.max(1) {
        let mut a = Matrix2::<f64>::zeros();
        let mut b = Vector2::<f64>::zeros();

        for dy in -hw..=hw {
            for dx in -hw..=hw {
                let px = q.x + dx as f32;
                let py = q.y + dy as f32;
                let gx = 0.5 * (sample_bilinear(img, px + 1.0, py) - sample_bilinear(img, px - 1.0, py));
                let gy = 0.5 * (sample_bilinear(img, px, py + 1.0) - sample_bilinear(img, px, py - 1.0));
                let w = (-((dx * dx + dy * dy) as f32) * inv_two_s2).exp();

                let (gx, gy, w) = (gx as f64, gy as f64, w as f64);
                let gxx = w * gx * gx;
                let gxy = w * gx * gy;
                let gyy = w * gy * gy;
                a[(0, 0)] += gxx;
                a[(0, 1)] += gxy;
                a[(1, 0)] += gxy;
                a[(1, 1)] += gyy;
                b[0] += gxx * px as f64 + gxy * py as f64;
                b[1] += gxy * px as f64 + gyy * py as f64;
            }
        }

        // No gradient structure, or gradients along a single direction (an edge).
        let (det, trace) = (a.determinant(), a.trace());
        if !det.is_finite() || trace < 1e-9 || det <= 1e-6 * trace * trace {
            return None;
        }
        let next = a.try_inverse()? * b;
        let next = Point2::new(next[0] as f32, next[1] as f32);
        let shift = (next - q).norm();
        q = next;
        if shift < params.eps {
            return Some(Refined {
                position: q,
                iterations: iter + 1,
                converged: true,
            });
        }
    }

    Some(Refined {
        position: q,
        iterations: params.max_iters.max(1),
        converged: false,
    })
}

/// Stationary point of a least-squares quadratic fitted around `center`.
///
/// Returns the offset from `center`, or `None` when the fit is not a saddle.
fn saddle_step(img: &GrayImageView<'_>, center: Point2<f32>, hw: i32) -> Option<Vector2<f64>> {
    let mut ata = Matrix6::<f64>::zeros();
    let mut atb = Vector6::<f64>::zeros();
    for dy in -hw..=hw {
        for dx in -hw..=hw {
            let v = sample_bilinear(img, center.x + dx as f32, center.y + dy as f32) as f64;
            let (x, y) = (dx as f64, dy as f64);
            let row = Vector6::new(x * x, x * y, y * y, x, y, 1.0);
            ata += row * row.transpose();
            atb += row * v;
        }
    }

    let coef = ata.cholesky()?.solve(&atb);
    let (qa, qb, qc, qd, qe) = (coef[0], coef[1], coef[2], coef[3], coef[4]);

    // A saddle has an indefinite Hessian.
    let hessian = Matrix2::new(2.0 * qa, qb, qb, 2.0 * qc);
    if hessian.determinant() > -1e-6 {
        return None;
    }
    let offset = hessian.try_inverse()? * Vector2::new(-qd, -qe);
    offset.iter().all(|v| v.is_finite()).then_some(offset)
}

/// Iterated quadratic saddle fit around `start`, on a smoothed image.
pub fn refine_saddle(
    img: &GrayImageView<'_>,
    start: Point2<f32>,
    params: &SaddleParams,
) -> Option<Refined> {
    let hw = params.half_window.max(1) as i32;
    let mut q = start;
    for iter in 0..params.max_iters.max(1) {
        let step = saddle_step(img, q, hw)?;
        // A stationary point outside the window is an extrapolation.
        if step.norm() > hw as f64 {
            return None;
        }
        q = Point2::new(q.x + step[0] as f32, q.y + step[1] as f32);
        if (step.norm() as f32) < params.eps {
            return Some(Refined {
                position: q,
                iterations: iter + 1,
                converged: true,
            });
        }
    }
    Some(Refined {
        position: q,
        iterations: params.max_iters.max(1),
        converged: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinhole_gauge_core::{gaussian_blur, GrayImage};

    /// Anti-aliased X-corner at a sub-pixel location.
    fn x_corner(size: usize, cx: f32, cy: f32) -> GrayImage {
        let ss = 8;
        GrayImage::from_fn(size, size, |x, y| {
            let mut acc = 0.0f32;
            for a in 0..ss {
                for b in 0..ss {
                    let px = x as f32 - 0.5 + (a as f32 + 0.5) / ss as f32;
                    let py = y as f32 - 0.5 + (b as f32 + 0.5) / ss as f32;
                    let dark = (px < cx) == (py < cy);
                    acc += if dark { 30.0 } else { 220.0 };
                }
            }
            (acc / (ss * ss) as f32).round() as u8
        })
    }

    #[test]
    fn gradient_refinement_reaches_subpixel_corner() {
        let img = x_corner(41, 20.3, 19.6);
        let r = refine_gradient(&img.view(), Point2::new(20.0, 20.0), &SubPixParams::default())
            .expect("refined");
        assert!(r.converged);
        assert!((r.position.x - 20.3).abs() < 0.05, "{:?}", r.position);
        assert!((r.position.y - 19.6).abs() < 0.05, "{:?}", r.position);
    }

    #[test]
    fn saddle_refinement_reaches_subpixel_corner() {
        let img = x_corner(41, 19.7, 20.4);
        let smooth = gaussian_blur(&img.view(), 1.5);
        let r = refine_saddle(&smooth.view(), Point2::new(20.0, 20.0), &SaddleParams::default())
            .expect("refined");
        assert!((r.position.x - 19.7).abs() < 0.1, "{:?}", r.position);
        assert!((r.position.y - 20.4).abs() < 0.1, "{:?}", r.position);
    }

    #[test]
    fn flat_patch_is_degenerate() {
        let img = GrayImage::from_fn(30, 30, |_, _| 90);
        assert!(refine_gradient(&img.view(), Point2::new(15.0, 15.0), &SubPixParams::default())
            .is_none());
        assert!(refine_saddle(&img.view(), Point2::new(15.0, 15.0), &SaddleParams::default())
            .is_none());
    }
}
