use approx::assert_abs_diff_eq;
use pinhole_gauge_calib::{
    reprojection_errors, CalibrationConfig, CalibrationEngine, CalibrationRecord,
    CalibrationStore,
};
use pinhole_gauge_core::synthetic::{calibration_poses, project_target};
use pinhole_gauge_core::{CalibrationTarget, Distortion, IntrinsicParameters, ObservedView};

fn camera(distortion: Distortion) -> IntrinsicParameters {
    IntrinsicParameters {
        distortion,
        ..IntrinsicParameters::pinhole(800.0, 810.0, 320.0, 245.0, [640, 480])
    }
}

fn observe(camera: &IntrinsicParameters, target: &CalibrationTarget, jitter: f64) -> Vec<ObservedView> {
    // Small LCG so the noise is the same on every run.
    let mut state: u64 = 12345;
    let mut noise = move || {
        state = (state * 1_103_515_245 + 12_345) % (1 << 31);
        (state as f64 / (1u64 << 31) as f64 - 0.5) * jitter
    };
    calibration_poses(target, 500.0)
        .iter()
        .enumerate()
        .map(|(k, pose)| {
            let pts = project_target(camera, target, pose)
                .unwrap()
                .into_iter()
                .map(|p| nalgebra::Point2::new(p.x + noise(), p.y + noise()))
                .collect();
            ObservedView::new(format!("IMG_{k:04}.png"), target, pts).unwrap()
        })
        .collect()
}

#[test]
fn recovers_distortion_free_camera() {
    let truth = camera(Distortion::default());
    let target = CalibrationTarget::default();
    let views = observe(&truth, &target, 0.0);

    let result = CalibrationEngine::default()
        .calibrate(&views, truth.image_size)
        .unwrap();
    let k = result.intrinsics;
    assert_abs_diff_eq!(k.fx, truth.fx, epsilon = 1e-3);
    assert_abs_diff_eq!(k.fy, truth.fy, epsilon = 1e-3);
    assert_abs_diff_eq!(k.cx, truth.cx, epsilon = 1e-3);
    assert_abs_diff_eq!(k.cy, truth.cy, epsilon = 1e-3);
    assert!(k.rms_error < 1e-6, "rms {}", k.rms_error);
    assert_eq!(8, result.views.len());
    assert_eq!("IMG_0000.png", result.views[0].label);
}

#[test]
fn recovers_radial_distortion() {
    let truth = camera(Distortion {
        k1: -0.12,
        k2: 0.05,
        ..Distortion::default()
    });
    let target = CalibrationTarget::default();
    let views = observe(&truth, &target, 0.0);

    let config = CalibrationConfig {
        fix_tangential: true,
        fix_k3: true,
        ..CalibrationConfig::default()
    };
    let result = CalibrationEngine::new(config)
        .calibrate(&views, truth.image_size)
        .unwrap();
    let k = result.intrinsics;
    assert_abs_diff_eq!(k.fx, truth.fx, epsilon = 1e-2);
    assert_abs_diff_eq!(k.fy, truth.fy, epsilon = 1e-2);
    assert_abs_diff_eq!(k.distortion.k1, -0.12, epsilon = 1e-3);
    assert_abs_diff_eq!(k.distortion.k2, 0.05, epsilon = 1e-2);
    assert_eq!(0.0, k.distortion.p1);
    assert_eq!(0.0, k.distortion.k3);

    let errors = reprojection_errors(&k, &target, &result.views[3], &views[3]).unwrap();
    assert!(errors.iter().all(|e| *e < 1e-4));
}

#[test]
fn noisy_corners_give_subpixel_rms() {
    let truth = camera(Distortion::default());
    let target = CalibrationTarget::default();
    let views = observe(&truth, &target, 0.2);

    let result = CalibrationEngine::default()
        .calibrate(&views, truth.image_size)
        .unwrap();
    let k = result.intrinsics;
    assert!(k.rms_error > 0.02 && k.rms_error < 0.15, "rms {}", k.rms_error);
    assert!((k.fx - truth.fx).abs() / truth.fx < 0.01, "fx {}", k.fx);
    assert!((k.fy - truth.fy).abs() / truth.fy < 0.01, "fy {}", k.fy);
    assert!(result.views.iter().all(|v| v.rms < 0.2));
}

#[test]
fn stored_run_feeds_measurement() {
    let truth = camera(Distortion::default());
    let target = CalibrationTarget::default();
    let views = observe(&truth, &target, 0.0);
    let result = CalibrationEngine::default()
        .calibrate(&views, truth.image_size)
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = CalibrationStore::new(dir.path());
    let record = CalibrationRecord::new("calib-test", target, &result, vec![]);
    let path = store.save(&record).unwrap();

    let loaded = CalibrationStore::load_path(&path).unwrap();
    assert_eq!(8, loaded.used.len());
    assert_abs_diff_eq!(loaded.intrinsics.fx, 800.0, epsilon = 1e-3);
    assert_eq!(Some(record), store.latest().unwrap());
}
