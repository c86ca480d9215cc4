//! Batch calibration: photos on disk to a stored calibration record.

use crate::calib::{
    default_run_id, CalibrationEngine, CalibrationError, CalibrationRecord, CalibrationResult,
    CalibrationStore, StoreError,
};
use crate::chessboard::CornerDetector;
use crate::config::PipelineConfig;
use crate::core::{CalibrationTarget, ObservedView};
use crate::load::{gray_view, label_for, list_images, load_gray, LoadError};
use log::{info, warn};
use nalgebra::Point2;
use rayon::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("no calibration images found in {}", .dir.display())]
    NoImages { dir: PathBuf },
    #[error("none of the {total} images in {} could be decoded", .dir.display())]
    NothingDecoded { dir: PathBuf, total: usize },
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An image that did not produce a view, and why.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    pub label: String,
    pub reason: String,
}

/// Per-image outcome of the detection stage.
#[derive(Clone, Debug)]
pub enum ImageOutcome {
    View {
        view: ObservedView,
        image_size: [u32; 2],
    },
    Unreadable(Rejection),
    NotFound(Rejection),
}

/// Views from the detection stage, in input order.
#[derive(Clone, Debug, Default)]
pub struct DetectedViews {
    pub total_images: usize,
    pub decoded: usize,
    pub views: Vec<ObservedView>,
    pub image_size: Option<[u32; 2]>,
    pub rejected: Vec<Rejection>,
}

fn detect_one(path: &Path, detector: &dyn CornerDetector, target: &CalibrationTarget) -> ImageOutcome {
    let label = label_for(path);
    let img = match load_gray(path) {
        Ok(img) => img,
        Err(err) => {
            return ImageOutcome::Unreadable(Rejection {
                label,
                reason: err.to_string(),
            })
        }
    };
    let image_size = [img.width(), img.height()];
    let detection = match detector.detect(&gray_view(&img), target) {
        Ok(d) => d,
        Err(err) => {
            return ImageOutcome::NotFound(Rejection {
                label,
                reason: err.to_string(),
            })
        }
    };
    let points = detection
        .corners
        .iter()
        .map(|p| Point2::new(p.x as f64, p.y as f64))
        .collect();
    match ObservedView::new(label.clone(), target, points) {
        Ok(view) => ImageOutcome::View { view, image_size },
        Err(err) => ImageOutcome::NotFound(Rejection {
            label,
            reason: err.to_string(),
        }),
    }
}

/// Run corner detection over `paths` in parallel and gather the results in
/// input order.
///
/// The first decoded image fixes the resolution; views from images of any
/// other size are rejected.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(images = paths.len()))
)]
pub fn detect_views(
    paths: &[PathBuf],
    detector: &dyn CornerDetector,
    target: &CalibrationTarget,
) -> DetectedViews {
    let outcomes: Vec<ImageOutcome> = paths
        .par_iter()
        .map(|path| detect_one(path, detector, target))
        .collect();

    let mut out = DetectedViews {
        total_images: paths.len(),
        ..DetectedViews::default()
    };
    for outcome in outcomes {
        match outcome {
            ImageOutcome::View { view, image_size } => {
                out.decoded += 1;
                let expected = *out.image_size.get_or_insert(image_size);
                if image_size != expected {
                    warn!(
                        "[SKIP] {}: {}x{} differs from {}x{}",
                        view.label(),
                        image_size[0],
                        image_size[1],
                        expected[0],
                        expected[1]
                    );
                    out.rejected.push(Rejection {
                        label: view.label().to_string(),
                        reason: format!(
                            "image size {}x{} differs from {}x{}",
                            image_size[0], image_size[1], expected[0], expected[1]
                        ),
                    });
                    continue;
                }
                info!("[OK] corners detected: {}", view.label());
                out.views.push(view);
            }
            ImageOutcome::Unreadable(r) => {
                warn!("[SKIP] cannot read {}: {}", r.label, r.reason);
                out.rejected.push(r);
            }
            ImageOutcome::NotFound(r) => {
                out.decoded += 1;
                warn!("[FAIL] no corners detected: {}: {}", r.label, r.reason);
                out.rejected.push(r);
            }
        }
    }
    out
}

/// Everything a successful run produced.
#[derive(Clone, Debug)]
pub struct CalibrationReport {
    pub run_id: String,
    pub total_images: usize,
    pub target: CalibrationTarget,
    pub result: CalibrationResult,
    pub rejected: Vec<Rejection>,
    pub record_path: PathBuf,
}

impl CalibrationReport {
    pub fn valid_views(&self) -> usize {
        self.result.views.len()
    }
}

/// Coarse verdict on a reprojection RMS in pixels.
pub fn rms_quality(rms: f64) -> &'static str {
    match rms {
        r if r < 0.2 => "VERY GOOD",
        r if r < 0.5 => "GOOD",
        r if r < 1.0 => "FINE",
        r if r < 2.0 => "BAD",
        _ => "VERY BAD",
    }
}

impl fmt::Display for CalibrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let k = &self.result.intrinsics;
        let d = k.distortion.to_opencv();
        writeln!(f, "==============================")?;
        writeln!(f, " CALIBRATION SUMMARY")?;
        writeln!(f, "==============================")?;
        writeln!(f, "Run id           : {}", self.run_id)?;
        writeln!(f, "Total images     : {}", self.total_images)?;
        writeln!(f, "Valid detections : {}", self.valid_views())?;
        for r in &self.rejected {
            writeln!(f, "  rejected {}: {}", r.label, r.reason)?;
        }
        writeln!(f)?;
        writeln!(f, "Camera intrinsic matrix (K):")?;
        writeln!(f, "  [{:12.4} {:12.4} {:12.4}]", k.fx, 0.0, k.cx)?;
        writeln!(f, "  [{:12.4} {:12.4} {:12.4}]", 0.0, k.fy, k.cy)?;
        writeln!(f, "  [{:12.4} {:12.4} {:12.4}]", 0.0, 0.0, 1.0)?;
        writeln!(f, "Distortion [k1 k2 p1 p2 k3]:")?;
        writeln!(
            f,
            "  [{:.6} {:.6} {:.6} {:.6} {:.6}]",
            d[0], d[1], d[2], d[3], d[4]
        )?;
        writeln!(f, "Focal length (pixels): fx={:.2} fy={:.2}", k.fx, k.fy)?;
        writeln!(
            f,
            "RMS reprojection error: {:.4} px ({})",
            k.rms_error,
            rms_quality(k.rms_error)
        )?;
        write!(f, "Saved to: {}", self.record_path.display())
    }
}

/// Detect, calibrate and persist. Nothing is written unless calibration succeeds.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
pub fn run_calibration(
    config: &PipelineConfig,
    run_id: Option<String>,
) -> Result<CalibrationReport, PipelineError> {
    let target = config.calibration.target;
    target.validate().map_err(CalibrationError::from)?;

    let paths = list_images(&config.image_dir, &config.extensions)?;
    if paths.is_empty() {
        return Err(PipelineError::NoImages {
            dir: config.image_dir.clone(),
        });
    }
    info!(
        "found {} images in {}, detector: {}",
        paths.len(),
        config.image_dir.display(),
        config.detector
    );

    let detector = config.detector.build(config.detector_params.clone());
    let detected = detect_views(&paths, detector.as_ref(), &target);
    if detected.decoded == 0 {
        return Err(PipelineError::NothingDecoded {
            dir: config.image_dir.clone(),
            total: detected.total_images,
        });
    }
    info!(
        "{} of {} images gave valid detections",
        detected.views.len(),
        detected.total_images
    );

    let required = config.calibration.required_views();
    let image_size = match detected.image_size {
        Some(size) if detected.views.len() >= required => size,
        _ => {
            return Err(CalibrationError::InsufficientViews {
                found: detected.views.len(),
                required,
            }
            .into())
        }
    };

    let engine = CalibrationEngine::new(config.calibration.clone());
    let result = engine.calibrate(&detected.views, image_size)?;

    let run_id = run_id.unwrap_or_else(default_run_id);
    let rejected_labels = detected.rejected.iter().map(|r| r.label.clone()).collect();
    let record = CalibrationRecord::new(run_id.clone(), target, &result, rejected_labels);
    let record_path = CalibrationStore::new(&config.output_dir).save(&record)?;

    Ok(CalibrationReport {
        run_id,
        total_images: detected.total_images,
        target,
        result,
        rejected: detected.rejected,
        record_path,
    })
}
