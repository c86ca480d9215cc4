//! Pinhole projection arithmetic.
//!
//! Everything here follows from similar triangles, `w / f = W / D`, with `w`
//! a length in pixels, `f` a focal length in pixels, `W` the real length and
//! `D` the distance from the camera to the measured object (same unit as `W`).
//! Every function validates its inputs before dividing.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("invalid {name}: {value} (must be finite and > 0)")]
    InvalidParameter { name: &'static str, value: f64 },
}

/// Image axis of a linear measurement. Horizontal spans use `fx`, vertical ones `fy`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Horizontal,
    Vertical,
}

fn positive(name: &'static str, value: f64) -> Result<f64, ProjectionError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ProjectionError::InvalidParameter { name, value })
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<f64, ProjectionError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ProjectionError::InvalidParameter { name, value })
    }
}

/// Focal length in pixels from an object of known size at a known distance:
/// `f = w * D / W`.
pub fn calibrate_focal(
    pixel_length: f64,
    distance: f64,
    real_length: f64,
) -> Result<f64, ProjectionError> {
    let w = positive("pixel length", pixel_length)?;
    let d = positive("distance", distance)?;
    let real = positive("real length", real_length)?;
    Ok(w * d / real)
}

/// Real length of a pixel span at a known distance: `W = w * D / f`.
pub fn measure_real(pixel_length: f64, distance: f64, focal: f64) -> Result<f64, ProjectionError> {
    let w = non_negative("pixel length", pixel_length)?;
    let d = positive("distance", distance)?;
    let f = positive("focal length", focal)?;
    Ok(w * d / f)
}

/// Same as [`measure_real`], under the name used by the measurement tooling.
#[inline]
pub fn get_real_size(px: f64, dist: f64, focal: f64) -> Result<f64, ProjectionError> {
    measure_real(px, dist, focal)
}

/// Pixel displacement between two selected points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PixelSpan {
    pub dx: f64,
    pub dy: f64,
}

impl PixelSpan {
    pub fn between(a: Point2<f64>, b: Point2<f64>) -> Self {
        Self {
            dx: b.x - a.x,
            dy: b.y - a.y,
        }
    }

    pub fn euclidean(&self) -> f64 {
        self.dx.hypot(self.dy)
    }

    pub fn along(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Horizontal => self.dx.abs(),
            Axis::Vertical => self.dy.abs(),
        }
    }
}

/// Real width and height of a span measured independently along each axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RealExtent {
    pub width: f64,
    pub height: f64,
}

/// `width = |dx| * D / fx`, `height = |dy| * D / fy`.
pub fn measure_extent(
    span: &PixelSpan,
    distance: f64,
    fx: f64,
    fy: f64,
) -> Result<RealExtent, ProjectionError> {
    Ok(RealExtent {
        width: measure_real(span.along(Axis::Horizontal), distance, fx)?,
        height: measure_real(span.along(Axis::Vertical), distance, fy)?,
    })
}
