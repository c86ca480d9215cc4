//! Core types and utilities for pinhole-gauge.
//!
//! This crate is small and purely geometric: the calibration target and view
//! model, camera intrinsics with Brown–Conrady distortion, the pinhole
//! projection arithmetic used by measurement sessions, a lightweight grayscale
//! image type and a planar homography estimator. It does *not* depend on any
//! image decoding crate.

mod corner;
mod homography;
mod image;
mod intrinsics;
mod logger;
mod projection;
pub mod synthetic;
mod target;

pub use corner::Corner;
pub use homography::{estimate_homography, homography_from_4pt, Homography};
pub use image::{
    equalize_hist, gaussian_blur, sample_bilinear, sample_bilinear_u8, GrayImage, GrayImageView,
};
pub use intrinsics::{Distortion, IntrinsicParameters};
pub use projection::{
    calibrate_focal, get_real_size, measure_extent, measure_real, Axis, PixelSpan,
    ProjectionError, RealExtent,
};
pub use target::{CalibrationTarget, ObservedView, TargetError, ViewError};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_for_verbosity};
