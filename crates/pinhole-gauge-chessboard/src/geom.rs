use pinhole_gauge_core::Corner;
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};

/// Compute the absolute difference between two angles (radians),
/// normalized into `[0, π]`.
pub fn angle_diff_abs(a: f32, b: f32) -> f32 {
    let two_pi = 2.0 * PI;
    // Normalize angle difference to [-π, π).
    let mut diff = (b - a).rem_euclid(two_pi);
    if diff >= PI {
        diff -= two_pi;
    }
    diff.abs()
}

/// Angle between two undirected axes (both defined modulo π), in `[0, π/2]`.
pub fn axis_diff(a: f32, b: f32) -> f32 {
    let d = angle_diff_abs(a, b);
    d.min(PI - d)
}

/// Check whether two undirected orientations are approximately orthogonal
/// within the given `tolerance`.
pub fn is_orthogonal(reference_angle: f32, other_angle: f32, tolerance: f32) -> bool {
    (FRAC_PI_2 - axis_diff(reference_angle, other_angle)).abs() <= tolerance.abs()
}

/// Dominant grid axis from corner orientations.
///
/// Direct neighbours carry orientations 90° apart, so the orientations are
/// averaged in quadruple-angle space where both families coincide. The grid
/// axes lie at 45° to the mean diagonal; the returned `u` axis is the one
/// closest to the image `x` axis, in `(-π/4, π/4]`. The second axis is `u + π/2`.
pub fn estimate_grid_axis(corners: &[Corner]) -> Option<f32> {
    let mut sx = 0.0f32;
    let mut sy = 0.0f32;
    let mut weight_sum = 0.0f32;
    for c in corners {
        let w = c.strength.max(0.0);
        if w <= 0.0 {
            continue;
        }
        let four_theta = 4.0 * c.orientation;
        sx += w * four_theta.cos();
        sy += w * four_theta.sin();
        weight_sum += w;
    }
    if weight_sum <= 0.0 {
        return None;
    }
    let (mx, my) = (sx / weight_sum, sy / weight_sum);
    if mx * mx + my * my < 1e-4 {
        // No dominant orientation.
        return None;
    }

    let diagonal = 0.25 * my.atan2(mx);
    let mut u = diagonal + FRAC_PI_4;
    // Reduce modulo π/2 into (-π/4, π/4].
    while u > FRAC_PI_4 {
        u -= FRAC_PI_2;
    }
    while u <= -FRAC_PI_4 {
        u += FRAC_PI_2;
    }
    Some(u)
}
