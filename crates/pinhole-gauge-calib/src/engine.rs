use crate::extrinsics::pose_from_homography;
use crate::lm::{solve, NllsProblem, SolveOptions, SolveReport};
use crate::zhang::intrinsics_from_homographies;
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector, Point2, Point3, Rotation3, Vector2, Vector3};
use pinhole_gauge_core::{
    estimate_homography, CalibrationTarget, Distortion, IntrinsicParameters, ObservedView,
    TargetError,
};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Default minimum number of valid views for a calibration run.
pub const MIN_VIEWS: usize = 6;

const INTRINSIC_PARAMS: usize = 9;
const POSE_PARAMS: usize = 6;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error(
        "insufficient views: {found} valid detections, at least {required} needed; \
         capture more images with the whole board visible at varied tilts"
    )]
    InsufficientViews { found: usize, required: usize },
    #[error("view '{label}' has {got} corners, target has {expected}")]
    InvalidView {
        label: String,
        expected: usize,
        got: usize,
    },
    #[error("invalid image size {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },
    #[error("degenerate calibration: {0}")]
    Degenerate(String),
    #[error(transparent)]
    Target(#[from] TargetError),
}

/// Settings of one calibration run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub target: CalibrationTarget,
    /// Runs with fewer valid views abort. Values below 3 are raised to 3.
    pub min_views: usize,
    pub solve: SolveOptions,
    /// Keep `p1 = p2 = 0`.
    pub fix_tangential: bool,
    /// Keep `k3 = 0`.
    pub fix_k3: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            target: CalibrationTarget::default(),
            min_views: MIN_VIEWS,
            solve: SolveOptions::default(),
            fix_tangential: false,
            fix_k3: false,
        }
    }
}

impl CalibrationConfig {
    pub fn required_views(&self) -> usize {
        self.min_views.max(3)
    }
}

/// Target pose for one view: axis-angle rotation and translation, target to camera.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewPose {
    pub label: String,
    pub rotation: [f64; 3],
    pub translation: [f64; 3],
    /// Reprojection RMS of this view alone, in pixels.
    pub rms: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationResult {
    /// Refined intrinsics; `rms_error` holds the RMS over every corner.
    pub intrinsics: IntrinsicParameters,
    pub views: Vec<ViewPose>,
    pub report: SolveReport,
}

/// Joint reprojection problem over intrinsics, distortion and every view pose.
///
/// Layout: `[fx, fy, cx, cy, k1, k2, p1, p2, k3]` then `[ω, t]` per view.
struct BundleProblem<'a> {
    world: Vec<Point3<f64>>,
    views: &'a [ObservedView],
    image_size: [u32; 2],
}

impl BundleProblem<'_> {
    fn intrinsics(&self, x: &DVector<f64>) -> IntrinsicParameters {
        IntrinsicParameters {
            fx: x[0],
            fy: x[1],
            cx: x[2],
            cy: x[3],
            distortion: Distortion::from_opencv([x[4], x[5], x[6], x[7], x[8]]),
            rms_error: 0.0,
            image_size: self.image_size,
        }
    }

    /// Residuals of view `v` written into `out` (two per corner).
    fn view_residuals(&self, x: &DVector<f64>, v: usize, out: &mut [f64]) {
        let intr = self.intrinsics(x);
        let base = INTRINSIC_PARAMS + POSE_PARAMS * v;
        let rotation = Rotation3::from_scaled_axis(Vector3::new(x[base], x[base + 1], x[base + 2]));
        let t = Vector3::new(x[base + 3], x[base + 4], x[base + 5]);

        for (n, (w, obs)) in self.world.iter().zip(self.views[v].image_points()).enumerate() {
            let (ex, ey) = match intr.project(&(rotation * w + t)) {
                Some(p) => (p.x - obs.x, p.y - obs.y),
                None => (f64::NAN, f64::NAN),
            };
            out[2 * n] = ex;
            out[2 * n + 1] = ey;
        }
    }

    fn rows_per_view(&self) -> usize {
        2 * self.world.len()
    }
}

impl NllsProblem for BundleProblem<'_> {
    fn num_params(&self) -> usize {
        INTRINSIC_PARAMS + POSE_PARAMS * self.views.len()
    }

    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let rows = self.rows_per_view();
        let mut r = DVector::zeros(rows * self.views.len());
        for v in 0..self.views.len() {
            self.view_residuals(x, v, &mut r.as_mut_slice()[v * rows..(v + 1) * rows]);
        }
        r
    }

    /// Central differences. A view's residuals depend only on the shared
    /// intrinsics and that view's own pose.
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let rows = self.rows_per_view();
        let mut j = DMatrix::zeros(rows * self.views.len(), self.num_params());
        let mut plus = vec![0.0; rows];
        let mut minus = vec![0.0; rows];
        let mut xp = x.clone();

        for v in 0..self.views.len() {
            let base = INTRINSIC_PARAMS + POSE_PARAMS * v;
            for col in (0..INTRINSIC_PARAMS).chain(base..base + POSE_PARAMS) {
                let h = 1e-6 * x[col].abs().max(1.0);
                xp[col] = x[col] + h;
                self.view_residuals(&xp, v, &mut plus);
                xp[col] = x[col] - h;
                self.view_residuals(&xp, v, &mut minus);
                xp[col] = x[col];
                for row in 0..rows {
                    j[(v * rows + row, col)] = (plus[row] - minus[row]) / (2.0 * h);
                }
            }
        }
        j
    }
}

/// Estimates camera intrinsics from ordered corner detections of a planar target.
#[derive(Clone, Debug, Default)]
pub struct CalibrationEngine {
    config: CalibrationConfig,
}

impl CalibrationEngine {
    pub fn new(config: CalibrationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    fn check_inputs(&self, views: &[ObservedView], image_size: [u32; 2]) -> Result<(), CalibrationError> {
        self.config.target.validate()?;
        if image_size[0] == 0 || image_size[1] == 0 {
            return Err(CalibrationError::InvalidImageSize {
                width: image_size[0],
                height: image_size[1],
            });
        }
        let expected = self.config.target.corner_count();
        if let Some(bad) = views.iter().find(|v| v.len() != expected) {
            return Err(CalibrationError::InvalidView {
                label: bad.label().to_string(),
                expected,
                got: bad.len(),
            });
        }
        let required = self.config.required_views();
        if views.len() < required {
            return Err(CalibrationError::InsufficientViews {
                found: views.len(),
                required,
            });
        }
        Ok(())
    }

    /// Closed-form intrinsics and one initial pose per view.
    fn initialize(
        &self,
        views: &[ObservedView],
        image_size: [u32; 2],
    ) -> Result<(IntrinsicParameters, DVector<f64>), CalibrationError> {
        let plane = self.config.target.plane_points();
        let homographies = views
            .iter()
            .map(|v| {
                estimate_homography(&plane, v.image_points()).ok_or_else(|| {
                    CalibrationError::Degenerate(format!("no homography for view '{}'", v.label()))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let init = intrinsics_from_homographies(&homographies, image_size)?;
        debug!(
            "closed-form init: fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
            init.fx, init.fy, init.cx, init.cy
        );

        let k = init.camera_matrix();
        let mut x = DVector::zeros(INTRINSIC_PARAMS + POSE_PARAMS * views.len());
        x[0] = init.fx;
        x[1] = init.fy;
        x[2] = init.cx;
        x[3] = init.cy;
        for (v, (view, h)) in views.iter().zip(&homographies).enumerate() {
            let pose = pose_from_homography(&k, h).ok_or_else(|| {
                CalibrationError::Degenerate(format!("no initial pose for view '{}'", view.label()))
            })?;
            let base = INTRINSIC_PARAMS + POSE_PARAMS * v;
            let omega = pose.rotation.scaled_axis();
            let t = pose.translation.vector;
            x.rows_mut(base, 3).copy_from(&omega);
            x.rows_mut(base + 3, 3).copy_from(&t);
        }
        Ok((init, x))
    }

    fn fixed_mask(&self) -> Vec<bool> {
        let mut fixed = vec![false; INTRINSIC_PARAMS];
        if self.config.fix_tangential {
            fixed[6] = true;
            fixed[7] = true;
        }
        if self.config.fix_k3 {
            fixed[8] = true;
        }
        fixed
    }

    /// Calibrate from at least `min_views` views of the configured target.
    ///
    /// Every view must carry the full corner grid; `image_size` is the common
    /// `[width, height]` of the source images.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(views = views.len()))
    )]
    pub fn calibrate(
        &self,
        views: &[ObservedView],
        image_size: [u32; 2],
    ) -> Result<CalibrationResult, CalibrationError> {
        self.check_inputs(views, image_size)?;
        info!(
            "calibrating from {} views of a {}x{} target",
            views.len(),
            self.config.target.grid_width,
            self.config.target.grid_height
        );

        let (_, x0) = self.initialize(views, image_size)?;
        let problem = BundleProblem {
            world: self.config.target.world_points(),
            views,
            image_size,
        };
        let (x, report) = solve(&problem, x0, &self.fixed_mask(), &self.config.solve);
        if !report.converged {
            warn!(
                "refinement stopped after {} iterations without converging",
                report.iterations
            );
        }

        let residuals = problem.residuals(&x);
        if residuals.iter().any(|r| !r.is_finite()) {
            return Err(CalibrationError::Degenerate(
                "refined model projects corners behind the camera".into(),
            ));
        }

        let rows = problem.rows_per_view();
        let poses = views
            .iter()
            .enumerate()
            .map(|(v, view)| {
                let base = INTRINSIC_PARAMS + POSE_PARAMS * v;
                let block = residuals.rows(v * rows, rows);
                ViewPose {
                    label: view.label().to_string(),
                    rotation: [x[base], x[base + 1], x[base + 2]],
                    translation: [x[base + 3], x[base + 4], x[base + 5]],
                    rms: (block.norm_squared() / view.len() as f64).sqrt(),
                }
            })
            .collect();

        let points: usize = views.iter().map(ObservedView::len).sum();
        let mut intrinsics = problem.intrinsics(&x);
        intrinsics.rms_error = (residuals.norm_squared() / points as f64).sqrt();
        if !(intrinsics.fx > 0.0 && intrinsics.fy > 0.0) {
            return Err(CalibrationError::Degenerate(format!(
                "non-positive focal length fx={:.3} fy={:.3}",
                intrinsics.fx, intrinsics.fy
            )));
        }
        info!(
            "calibrated: fx={:.3} fy={:.3} cx={:.3} cy={:.3} rms={:.4}px",
            intrinsics.fx, intrinsics.fy, intrinsics.cx, intrinsics.cy, intrinsics.rms_error
        );

        Ok(CalibrationResult {
            intrinsics,
            views: poses,
            report,
        })
    }
}

/// Reproject the target with a view pose; used to inspect residuals.
pub fn reproject(
    intrinsics: &IntrinsicParameters,
    target: &CalibrationTarget,
    pose: &ViewPose,
) -> Option<Vec<Point2<f64>>> {
    let rotation = Rotation3::from_scaled_axis(Vector3::from(pose.rotation));
    let t = Vector3::from(pose.translation);
    target
        .world_points()
        .iter()
        .map(|w| intrinsics.project(&(rotation * w + t)))
        .collect()
}

/// Per-corner reprojection errors of one view, in pixels.
pub fn reprojection_errors(
    intrinsics: &IntrinsicParameters,
    target: &CalibrationTarget,
    pose: &ViewPose,
    view: &ObservedView,
) -> Option<Vec<f64>> {
    let projected = reproject(intrinsics, target, pose)?;
    Some(
        projected
            .iter()
            .zip(view.image_points())
            .map(|(p, o)| Vector2::new(p.x - o.x, p.y - o.y).norm())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinhole_gauge_core::synthetic::{calibration_poses, project_target};

    fn views_for(camera: &IntrinsicParameters, target: &CalibrationTarget, n: usize) -> Vec<ObservedView> {
        calibration_poses(target, 500.0)
            .iter()
            .take(n)
            .enumerate()
            .map(|(k, pose)| {
                let pts = project_target(camera, target, pose).unwrap();
                ObservedView::new(format!("view_{k}.png"), target, pts).unwrap()
            })
            .collect()
    }

    #[test]
    fn too_few_views_abort() {
        let camera = IntrinsicParameters::pinhole(800.0, 800.0, 320.0, 240.0, [640, 480]);
        let target = CalibrationTarget::default();
        let views = views_for(&camera, &target, 5);
        let err = CalibrationEngine::default()
            .calibrate(&views, camera.image_size)
            .unwrap_err();
        assert_eq!(
            CalibrationError::InsufficientViews {
                found: 5,
                required: 6
            },
            err
        );
        assert!(err.to_string().contains("capture more images"));
    }

    #[test]
    fn wrong_corner_count_is_rejected() {
        let target = CalibrationTarget::default();
        let small = CalibrationTarget::new(3, 3, 25.0).unwrap();
        let view = ObservedView::new("a", &small, vec![Point2::new(1.0, 1.0); 9]).unwrap();
        let err = CalibrationEngine::new(CalibrationConfig {
            target,
            ..CalibrationConfig::default()
        })
        .calibrate(&[view], [640, 480])
        .unwrap_err();
        assert!(matches!(err, CalibrationError::InvalidView { got: 9, expected: 49, .. }));
    }

    #[test]
    fn zero_image_size_is_rejected() {
        let err = CalibrationEngine::default().calibrate(&[], [0, 480]).unwrap_err();
        assert_eq!(
            CalibrationError::InvalidImageSize {
                width: 0,
                height: 480
            },
            err
        );
    }

    #[test]
    fn min_views_floor_is_three() {
        let config = CalibrationConfig {
            min_views: 1,
            ..CalibrationConfig::default()
        };
        assert_eq!(3, config.required_views());
    }

    #[test]
    fn fixed_mask_follows_config() {
        let engine = CalibrationEngine::new(CalibrationConfig {
            fix_tangential: true,
            fix_k3: true,
            ..CalibrationConfig::default()
        });
        let mask = engine.fixed_mask();
        assert_eq!(
            vec![false, false, false, false, false, false, true, true, true],
            mask
        );
    }
}
