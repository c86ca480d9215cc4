use crate::chess::detect_candidates;
use crate::geom::estimate_grid_axis;
use crate::grid::order_component;
use crate::gridgraph::{assign_grid_coordinates, connected_components, GridGraph};
use crate::params::DetectorParams;
use crate::refine::{refine_gradient, refine_saddle, Refined};
use log::debug;
use nalgebra::Point2;
use pinhole_gauge_core::{
    equalize_hist, gaussian_blur, CalibrationTarget, Corner, GrayImage, GrayImageView,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Reasons a single image yields no usable chessboard.
///
/// All variants are per-image failures; callers drop the image and continue.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DetectError {
    #[error("image is empty ({width}x{height})")]
    EmptyImage { width: usize, height: usize },
    #[error("pattern not found: {found} corner candidates, {expected} needed")]
    TooFewCorners { found: usize, expected: usize },
    #[error("pattern not found: corner orientations have no dominant grid axis")]
    NoGridAxis,
    #[error("pattern not found: no {width}x{height} corner grid (largest component has {largest} corners)")]
    IncompleteGrid {
        width: usize,
        height: usize,
        largest: usize,
    },
    #[error("corner {index} failed sub-pixel refinement")]
    RefinementFailed { index: usize },
}

/// Ordered corners of one detected chessboard.
#[derive(Clone, Debug, PartialEq)]
pub struct ChessboardDetection {
    /// Row-major interior corners, `target.grid_width` per row.
    pub corners: Vec<Point2<f32>>,
    /// Number of ChESS candidates considered before grid assembly.
    pub candidates: usize,
    /// Grid `u` axis angle in radians, in `(-π/4, π/4]`.
    pub grid_axis: f32,
}

/// A chessboard corner detection strategy.
pub trait CornerDetector: Send + Sync {
    fn kind(&self) -> DetectorKind;

    /// Find the full interior corner grid of `target` in `image`.
    fn detect(
        &self,
        image: &GrayImageView<'_>,
        target: &CalibrationTarget,
    ) -> Result<ChessboardDetection, DetectError>;
}

/// Which [`CornerDetector`] strategy to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    /// Corner response on the raw image, gradient-based sub-pixel refinement.
    #[default]
    Classical,
    /// Histogram equalization and smoothing first, saddle-fit refinement.
    /// Suited to low-contrast targets and boards shown on screens.
    Normalized,
}

impl DetectorKind {
    pub fn build(self, params: DetectorParams) -> Box<dyn CornerDetector> {
        match self {
            Self::Classical => Box::new(ClassicalDetector::new(params)),
            Self::Normalized => Box::new(NormalizedDetector::new(params)),
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Classical => "classical",
            Self::Normalized => "normalized",
        })
    }
}

impl FromStr for DetectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "classical" => Ok(Self::Classical),
            "normalized" | "normalised" => Ok(Self::Normalized),
            other => Err(format!(
                "unknown detector '{other}' (expected 'classical' or 'normalized')"
            )),
        }
    }
}

fn check_image(image: &GrayImageView<'_>) -> Result<(), DetectError> {
    if image.is_empty() {
        return Err(DetectError::EmptyImage {
            width: image.width,
            height: image.height,
        });
    }
    Ok(())
}

/// ChESS candidates, grid graph and canonical ordering, shared by both strategies.
fn locate_grid(
    image: &GrayImageView<'_>,
    target: &CalibrationTarget,
    params: &DetectorParams,
) -> Result<(Vec<Corner>, usize, f32), DetectError> {
    let expected = target.corner_count();
    let corners = detect_candidates(image, &params.response);
    debug!("{} corner candidates, {} expected", corners.len(), expected);

    if corners.len() < expected {
        return Err(DetectError::TooFewCorners {
            found: corners.len(),
            expected,
        });
    }

    let grid_axis = estimate_grid_axis(&corners).ok_or(DetectError::NoGridAxis)?;
    let graph = GridGraph::new(&corners, &params.graph, grid_axis);

    let mut components = connected_components(&graph);
    components.sort_by_key(|c| std::cmp::Reverse(c.len()));
    let largest = components.first().map_or(0, Vec::len);

    for component in components.iter().filter(|c| c.len() == expected) {
        let Some(coords) = assign_grid_coordinates(&graph, component) else {
            debug!("component of {} corners is not a consistent lattice", component.len());
            continue;
        };
        if let Some(order) =
            order_component(&coords, &corners, target.grid_width, target.grid_height)
        {
            let ordered = order.into_iter().map(|n| corners[n]).collect();
            return Ok((ordered, corners.len(), grid_axis));
        }
    }

    Err(DetectError::IncompleteGrid {
        width: target.grid_width,
        height: target.grid_height,
        largest,
    })
}

/// Apply `refine` to every ordered corner, rejecting diverging results.
fn refine_all(
    ordered: &[Corner],
    max_shift: f32,
    refine: impl Fn(Point2<f32>) -> Option<Refined>,
) -> Result<Vec<Point2<f32>>, DetectError> {
    ordered
        .iter()
        .enumerate()
        .map(|(index, c)| {
            let refined = refine(c.position).ok_or(DetectError::RefinementFailed { index })?;
            if (refined.position - c.position).norm() > max_shift {
                return Err(DetectError::RefinementFailed { index });
            }
            Ok(refined.position)
        })
        .collect()
}

/// Corner response on the raw image with `cornerSubPix`-style refinement.
pub struct ClassicalDetector {
    pub params: DetectorParams,
}

impl ClassicalDetector {
    pub fn new(params: DetectorParams) -> Self {
        Self { params }
    }
}

impl CornerDetector for ClassicalDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Classical
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(width = image.width, height = image.height))
    )]
    fn detect(
        &self,
        image: &GrayImageView<'_>,
        target: &CalibrationTarget,
    ) -> Result<ChessboardDetection, DetectError> {
        check_image(image)?;
        let (ordered, candidates, grid_axis) = locate_grid(image, target, &self.params)?;
        let corners = refine_all(&ordered, self.params.max_refine_shift(), |p| {
            refine_gradient(image, p, &self.params.subpix)
        })?;
        Ok(ChessboardDetection {
            corners,
            candidates,
            grid_axis,
        })
    }
}

/// Equalized and smoothed preprocessing with saddle-point refinement.
pub struct NormalizedDetector {
    pub params: DetectorParams,
}

impl NormalizedDetector {
    pub fn new(params: DetectorParams) -> Self {
        Self { params }
    }

    /// The image the detector actually works on.
    pub fn preprocess(&self, image: &GrayImageView<'_>) -> GrayImage {
        let norm = &self.params.normalize;
        let equalized = if norm.equalize {
            equalize_hist(image)
        } else {
            GrayImage {
                width: image.width,
                height: image.height,
                data: image.data[..image.width * image.height].to_vec(),
            }
        };
        gaussian_blur(&equalized.view(), norm.blur_sigma)
    }
}

impl CornerDetector for NormalizedDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Normalized
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(width = image.width, height = image.height))
    )]
    fn detect(
        &self,
        image: &GrayImageView<'_>,
        target: &CalibrationTarget,
    ) -> Result<ChessboardDetection, DetectError> {
        check_image(image)?;
        let work = self.preprocess(image);
        let work = work.view();
        let (ordered, candidates, grid_axis) = locate_grid(&work, target, &self.params)?;
        let corners = refine_all(&ordered, self.params.max_refine_shift(), |p| {
            refine_saddle(&work, p, &self.params.saddle)
        })?;
        Ok(ChessboardDetection {
            corners,
            candidates,
            grid_axis,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_and_prints() {
        assert_eq!(Ok(DetectorKind::Normalized), "Normalized".parse::<DetectorKind>());
        assert_eq!(Ok(DetectorKind::Classical), "classical".parse::<DetectorKind>());
        assert!("sb".parse::<DetectorKind>().is_err());
        assert_eq!("normalized", DetectorKind::Normalized.to_string());
    }

    #[test]
    fn kind_builds_matching_strategy() {
        for kind in [DetectorKind::Classical, DetectorKind::Normalized] {
            assert_eq!(kind, kind.build(DetectorParams::default()).kind());
        }
    }

    #[test]
    fn empty_image_is_rejected() {
        let target = CalibrationTarget::default();
        let view = GrayImageView {
            width: 0,
            height: 0,
            data: &[],
        };
        let err = ClassicalDetector::new(DetectorParams::default())
            .detect(&view, &target)
            .unwrap_err();
        assert_eq!(DetectError::EmptyImage { width: 0, height: 0 }, err);
    }

    #[test]
    fn blank_image_has_too_few_corners() {
        let target = CalibrationTarget::default();
        let img = GrayImage::from_fn(64, 64, |_, _| 200);
        let err = NormalizedDetector::new(DetectorParams::default())
            .detect(&img.view(), &target)
            .unwrap_err();
        assert_eq!(
            DetectError::TooFewCorners {
                found: 0,
                expected: 49
            },
            err
        );
    }
}
