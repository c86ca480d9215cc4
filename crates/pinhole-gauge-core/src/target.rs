use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// Errors produced while validating a [`CalibrationTarget`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TargetError {
    #[error("grid width and height must be >= 2 (got {width}x{height})")]
    InvalidGrid { width: usize, height: usize },
    #[error("square_size must be finite and > 0 (got {0})")]
    InvalidSquareSize(f64),
}

/// Errors produced while building an [`ObservedView`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ViewError {
    #[error("view '{label}' has {got} corners, expected {expected}")]
    CornerCount {
        label: String,
        expected: usize,
        got: usize,
    },
    #[error("view '{label}' contains a non-finite corner at index {index}")]
    NonFinite { label: String, index: usize },
}

/// Planar chessboard target: interior corner counts and the square edge length.
///
/// `grid_width` counts interior corners along a row, `grid_height` along a
/// column. The square size unit (mm in practice) is carried into every
/// extrinsic translation estimated from this target.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTarget {
    pub grid_width: usize,
    pub grid_height: usize,
    pub square_size: f64,
}

impl Default for CalibrationTarget {
    fn default() -> Self {
        Self {
            grid_width: 7,
            grid_height: 7,
            square_size: 25.0,
        }
    }
}

impl CalibrationTarget {
    pub fn new(grid_width: usize, grid_height: usize, square_size: f64) -> Result<Self, TargetError> {
        let target = Self {
            grid_width,
            grid_height,
            square_size,
        };
        target.validate()?;
        Ok(target)
    }

    /// Check a target that may have been deserialized without going through [`Self::new`].
    pub fn validate(&self) -> Result<(), TargetError> {
        if self.grid_width < 2 || self.grid_height < 2 {
            return Err(TargetError::InvalidGrid {
                width: self.grid_width,
                height: self.grid_height,
            });
        }
        if !self.square_size.is_finite() || self.square_size <= 0.0 {
            return Err(TargetError::InvalidSquareSize(self.square_size));
        }
        Ok(())
    }

    #[inline]
    pub fn corner_count(&self) -> usize {
        self.grid_width * self.grid_height
    }

    /// Row-major index of the interior corner at column `i`, row `j`.
    #[inline]
    pub fn index(&self, i: usize, j: usize) -> usize {
        j * self.grid_width + i
    }

    /// World coordinates of every interior corner on the `z = 0` plane, row-major.
    pub fn world_points(&self) -> Vec<Point3<f64>> {
        let s = self.square_size;
        (0..self.grid_height)
            .flat_map(|j| {
                (0..self.grid_width).map(move |i| Point3::new(i as f64 * s, j as f64 * s, 0.0))
            })
            .collect()
    }

    /// Planar `(x, y)` part of [`Self::world_points`].
    pub fn plane_points(&self) -> Vec<Point2<f64>> {
        self.world_points()
            .into_iter()
            .map(|p| Point2::new(p.x, p.y))
            .collect()
    }
}

/// One image's successful detection: ordered pixel corners paired by index
/// with the target's world grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObservedView {
    label: String,
    image_points: Vec<Point2<f64>>,
}

impl ObservedView {
    pub fn new(
        label: impl Into<String>,
        target: &CalibrationTarget,
        image_points: Vec<Point2<f64>>,
    ) -> Result<Self, ViewError> {
        let label = label.into();
        if image_points.len() != target.corner_count() {
            return Err(ViewError::CornerCount {
                label,
                expected: target.corner_count(),
                got: image_points.len(),
            });
        }
        if let Some(index) = image_points
            .iter()
            .position(|p| !p.x.is_finite() || !p.y.is_finite())
        {
            return Err(ViewError::NonFinite { label, index });
        }
        Ok(Self {
            label,
            image_points,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn image_points(&self) -> &[Point2<f64>] {
        &self.image_points
    }

    pub fn len(&self) -> usize {
        self.image_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_points_are_row_major() {
        let target = CalibrationTarget::new(3, 2, 10.0).unwrap();
        let pts = target.world_points();
        assert_eq!(6, pts.len());
        assert_eq!(Point3::new(0.0, 0.0, 0.0), pts[0]);
        assert_eq!(Point3::new(20.0, 0.0, 0.0), pts[2]);
        assert_eq!(Point3::new(0.0, 10.0, 0.0), pts[3]);
        assert_eq!(Point3::new(10.0, 10.0, 0.0), pts[target.index(1, 1)]);
    }

    #[test]
    fn rejects_degenerate_targets() {
        assert_eq!(
            Err(TargetError::InvalidGrid {
                width: 1,
                height: 5
            }),
            CalibrationTarget::new(1, 5, 25.0)
        );
        assert!(matches!(
            CalibrationTarget::new(7, 7, 0.0),
            Err(TargetError::InvalidSquareSize(_))
        ));
        assert!(CalibrationTarget::new(7, 7, f64::NAN).is_err());
    }

    #[test]
    fn view_requires_full_grid() {
        let target = CalibrationTarget::new(2, 2, 1.0).unwrap();
        let err = ObservedView::new("a.png", &target, vec![Point2::new(0.0, 0.0); 3]).unwrap_err();
        assert_eq!(
            ViewError::CornerCount {
                label: "a.png".to_string(),
                expected: 4,
                got: 3
            },
            err
        );

        let view = ObservedView::new("b.png", &target, vec![Point2::new(1.0, 1.0); 4]).unwrap();
        assert_eq!("b.png", view.label());
        assert_eq!(4, view.len());
    }

    #[test]
    fn view_rejects_nan_corners() {
        let target = CalibrationTarget::new(2, 2, 1.0).unwrap();
        let mut pts = vec![Point2::new(1.0, 1.0); 4];
        pts[2].y = f64::NAN;
        assert!(matches!(
            ObservedView::new("c.png", &target, pts),
            Err(ViewError::NonFinite { index: 2, .. })
        ));
    }
}
