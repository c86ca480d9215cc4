use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// A chessboard X-junction found by a corner response detector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Corner {
    /// Pixel position, pixel centers at integer coordinates.
    pub position: Point2<f32>,
    /// Direction of the bright diagonal in radians, defined modulo π.
    ///
    /// Grid axes lie at ±45° to this direction, and direct grid neighbours
    /// have orientations rotated by 90° relative to each other.
    pub orientation: f32,
    /// Corner response at the detected peak.
    pub strength: f32,
}

impl Corner {
    pub fn new(x: f32, y: f32, orientation: f32, strength: f32) -> Self {
        Self {
            position: Point2::new(x, y),
            orientation,
            strength,
        }
    }
}
