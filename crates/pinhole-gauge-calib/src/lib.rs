//! Planar camera calibration.
//!
//! [`CalibrationEngine`] takes ordered corner views of a
//! [`CalibrationTarget`](pinhole_gauge_core::CalibrationTarget) and:
//!
//! 1. fits one homography per view,
//! 2. solves Zhang's closed form for a zero-skew camera matrix,
//! 3. decomposes each homography into an initial target pose,
//! 4. refines intrinsics, Brown–Conrady distortion and every pose jointly with
//!    Levenberg–Marquardt on the reprojection error.
//!
//! Results are kept by [`CalibrationStore`] as one JSON record per run.

mod engine;
mod extrinsics;
mod lm;
mod store;
mod zhang;

pub use engine::{
    reproject, reprojection_errors, CalibrationConfig, CalibrationEngine, CalibrationError,
    CalibrationResult, ViewPose, MIN_VIEWS,
};
pub use extrinsics::pose_from_homography;
pub use lm::{solve, NllsProblem, SolveOptions, SolveReport};
pub use store::{default_run_id, CalibrationRecord, CalibrationStore, StoreError};
pub use zhang::intrinsics_from_homographies;
