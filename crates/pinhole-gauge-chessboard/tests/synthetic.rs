use nalgebra::Point2;
use pinhole_gauge_chessboard::{
    ClassicalDetector, CornerDetector, DetectError, DetectorKind, DetectorParams,
    NormalizedDetector,
};
use pinhole_gauge_core::synthetic::{
    board_homography, calibration_poses, project_target, render_chessboard, BoardPose,
    RenderStyle,
};
use pinhole_gauge_core::{CalibrationTarget, GrayImage, IntrinsicParameters};

const WIDTH: usize = 640;
const HEIGHT: usize = 480;

fn camera() -> IntrinsicParameters {
    IntrinsicParameters::pinhole(800.0, 800.0, 320.0, 240.0, [WIDTH as u32, HEIGHT as u32])
}

fn target() -> CalibrationTarget {
    CalibrationTarget::new(7, 5, 25.0).unwrap()
}

fn render(pose: &BoardPose, style: &RenderStyle) -> (GrayImage, Vec<Point2<f64>>) {
    let k = camera();
    let t = target();
    let img = render_chessboard(&t, &board_homography(&k, pose), WIDTH, HEIGHT, style).unwrap();
    let truth = project_target(&k, &t, pose).unwrap();
    (img, truth)
}

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn max_error(found: &[Point2<f32>], truth: &[Point2<f64>]) -> f64 {
    assert_eq!(truth.len(), found.len());
    found
        .iter()
        .zip(truth)
        .map(|(f, t)| (f.x as f64 - t.x).hypot(f.y as f64 - t.y))
        .fold(0.0, f64::max)
}

#[test]
fn classical_detects_ordered_grid_across_poses() {
    init_logs();
    let detector = ClassicalDetector::new(DetectorParams::default());
    for (k, pose) in calibration_poses(&target(), 500.0).iter().enumerate() {
        let (img, truth) = render(pose, &RenderStyle::default());
        let detection = detector
            .detect(&img.view(), &target())
            .unwrap_or_else(|e| panic!("pose {k}: {e}"));
        assert_eq!(35, detection.corners.len());
        // Edges are rendered with 4x4 supersampling, so truth is only good to ~0.1 px.
        let err = max_error(&detection.corners, &truth);
        assert!(err < 0.3, "pose {k}: max corner error {err:.3} px");
    }
}

#[test]
fn detection_is_reproducible() {
    let pose = calibration_poses(&target(), 500.0)[4];
    let (img, _) = render(&pose, &RenderStyle::default());
    let detector = DetectorKind::Classical.build(DetectorParams::default());
    let a = detector.detect(&img.view(), &target()).unwrap();
    let b = detector.detect(&img.view(), &target()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn normalized_handles_low_contrast_with_glare() {
    init_logs();
    let style = RenderStyle {
        dark: 105,
        light: 135,
        supersample: 4,
        glare: 60.0,
    };
    let detector = NormalizedDetector::new(DetectorParams::default());
    for (k, pose) in calibration_poses(&target(), 500.0).iter().take(4).enumerate() {
        let (img, truth) = render(pose, &style);
        let detection = detector
            .detect(&img.view(), &target())
            .unwrap_or_else(|e| panic!("pose {k}: {e}"));
        let err = max_error(&detection.corners, &truth);
        assert!(err < 0.35, "pose {k}: max corner error {err:.3} px");
    }
}

#[test]
fn wrong_grid_size_is_not_found() {
    let pose = calibration_poses(&target(), 500.0)[0];
    let (img, _) = render(&pose, &RenderStyle::default());
    let bigger = CalibrationTarget::new(8, 6, 25.0).unwrap();
    let err = ClassicalDetector::new(DetectorParams::default())
        .detect(&img.view(), &bigger)
        .unwrap_err();
    assert!(
        matches!(
            err,
            DetectError::TooFewCorners { expected: 48, .. }
                | DetectError::IncompleteGrid {
                    width: 8,
                    height: 6,
                    ..
                }
        ),
        "{err:?}"
    );
}

#[test]
fn partially_visible_board_is_not_found() {
    let t = target();
    // Shift the board so its right part leaves the image.
    let pose = BoardPose::centered(&t, 0.0, 0.0, 0.0, nalgebra::Vector3::new(180.0, 0.0, 500.0));
    let (img, _) = render(&pose, &RenderStyle::default());
    let err = ClassicalDetector::new(DetectorParams::default())
        .detect(&img.view(), &t)
        .unwrap_err();
    assert!(
        matches!(
            err,
            DetectError::TooFewCorners { .. } | DetectError::IncompleteGrid { .. }
        ),
        "{err:?}"
    );
}
