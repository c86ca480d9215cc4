//! High-level facade crate for the `pinhole-gauge-*` workspace.
//!
//! This crate provides:
//! - re-exports of the core, detector and calibration crates
//! - a batch pipeline that turns a directory of chessboard photos into a
//!   stored calibration record ([`run_calibration`])
//! - an interactive two-point measurement session ([`MeasurementSession`])
//!   with a line-based event loop in front of it ([`Dispatcher`])
//! - percent-error validation of a measured dimension against ground truth
//!
//! ## Quickstart
//!
//! ```no_run
//! use pinhole_gauge::{run_calibration, PipelineConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::default();
//! let report = run_calibration(&config, None)?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `pinhole_gauge::core`: target and view model, intrinsics, projection arithmetic.
//! - `pinhole_gauge::chessboard`: classical and normalized chessboard detectors.
//! - `pinhole_gauge::calib`: closed-form init, bundle refinement, calibration store.
//! - [`session`] and [`dispatch`]: measurement state machine and event loop.
//! - [`validation`]: percent error against a known dimension.

pub use pinhole_gauge_calib as calib;
pub use pinhole_gauge_chessboard as chessboard;
pub use pinhole_gauge_core as core;

pub mod config;
pub mod dispatch;
pub mod load;
pub mod pipeline;
pub mod session;
pub mod validation;

pub use config::{ConfigError, PipelineConfig};
pub use dispatch::{parse_line, run_console, Dispatcher, InputEvent, Outcome, Prompt};
pub use load::{gray_view, list_images, load_gray, LoadError};
pub use pipeline::{
    detect_views, rms_quality, run_calibration, CalibrationReport, DetectedViews, PipelineError,
    Rejection,
};
pub use session::{
    Measurement, MeasurementRecord, MeasurementSession, Mode, SessionError, SessionState,
};
pub use validation::{percent_error, validate_extent, ValidationError, ValidationResult};
