//! Chessboard corner detection for camera calibration.
//!
//! Pipeline shared by both strategies:
//! 1. ChESS X-corner candidates from the `chess-corners` detector.
//! 2. Dominant grid axis from corner orientations (quadruple-angle mean).
//! 3. k-nearest-neighbour grid graph: orthogonal diagonals, edges at 45°,
//!    spacing window, one neighbour per direction, mutual links only.
//! 4. Breadth-first integer coordinates per connected component.
//! 5. The component covering exactly the target grid is relabelled into a
//!    canonical row-major order.
//! 6. Sub-pixel refinement.
//!
//! [`ClassicalDetector`] runs on the raw image and refines with image
//! gradients; [`NormalizedDetector`] equalizes and smooths first and refines
//! with a quadratic saddle fit. [`DetectorKind`] selects one from
//! configuration.

mod chess;
mod detector;
mod geom;
mod grid;
mod gridgraph;
mod params;
mod refine;

pub use detector::{
    ChessboardDetection, ClassicalDetector, CornerDetector, DetectError, DetectorKind,
    NormalizedDetector,
};
pub use gridgraph::{GridGraph, NeighborDirection};
pub use params::{
    DetectorParams, GridGraphParams, NormalizeParams, ResponseParams, SaddleParams, SubPixParams,
};
pub use refine::{refine_gradient, refine_saddle, Refined};
pub use chess::{chess_config, detect_candidates};
