//! Two-point measurement session.
//!
//! The operator selects two pixels, then either calibrates a focal length from
//! an object of known size or measures an unknown object with a known focal
//! length. One event is processed at a time; a failed entry never changes
//! the state or the stored record.

use crate::core::{
    calibrate_focal, measure_extent, measure_real, IntrinsicParameters, PixelSpan,
    ProjectionError, RealExtent,
};
use log::{debug, info};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    InvalidParameter(#[from] ProjectionError),
    #[error("{action} needs two selected points (session is {state:?})")]
    NotReady {
        action: &'static str,
        state: SessionState,
    },
    #[error("session has ended")]
    Terminated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    OnePointSelected,
    TwoPointsSelected,
    ResultComputed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Known real size and distance give a focal length.
    Calibrate,
    /// Known focal length and distance give a real size.
    Measure,
}

/// The selected pair and what was computed from it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub points: [Point2<f64>; 2],
    pub span: PixelSpan,
    /// Euclidean pixel distance between the points.
    pub pixel_distance: f64,
    pub mode: Option<Mode>,
    pub distance: Option<f64>,
    /// Entered for `Measure`, derived for `Calibrate`.
    pub focal_length: Option<f64>,
    /// Entered for `Calibrate`, derived for `Measure`.
    pub real_length: Option<f64>,
    /// Per-axis size when measured with calibrated intrinsics.
    pub extent: Option<RealExtent>,
}

impl MeasurementRecord {
    fn new(a: Point2<f64>, b: Point2<f64>) -> Self {
        let span = PixelSpan::between(a, b);
        Self {
            points: [a, b],
            span,
            pixel_distance: span.euclidean(),
            mode: None,
            distance: None,
            focal_length: None,
            real_length: None,
            extent: None,
        }
    }

    /// Focal length for `Calibrate`, real size for `Measure`.
    pub fn computed(&self) -> Option<f64> {
        match self.mode? {
            Mode::Calibrate => self.focal_length,
            Mode::Measure => self.real_length,
        }
    }
}

/// Result of a `Measure` action.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Measurement {
    pub real_length: f64,
    pub focal_length: f64,
    pub extent: Option<RealExtent>,
}

#[derive(Clone, Debug)]
pub struct MeasurementSession {
    state: SessionState,
    first: Option<Point2<f64>>,
    record: Option<MeasurementRecord>,
    intrinsics: Option<IntrinsicParameters>,
    bounds: Option<[u32; 2]>,
    terminated: bool,
}

impl Default for MeasurementSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            first: None,
            record: None,
            intrinsics: None,
            bounds: None,
            terminated: false,
        }
    }

    /// Use calibrated intrinsics when no focal length is entered.
    pub fn with_intrinsics(mut self, intrinsics: IntrinsicParameters) -> Self {
        self.intrinsics = Some(intrinsics);
        self
    }

    /// Reject clicks outside a `width x height` image.
    pub fn with_bounds(mut self, width: u32, height: u32) -> Self {
        self.bounds = Some([width, height]);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn record(&self) -> Option<&MeasurementRecord> {
        self.record.as_ref()
    }

    pub fn intrinsics(&self) -> Option<&IntrinsicParameters> {
        self.intrinsics.as_ref()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Currently selected points: none, one, or the recorded pair.
    pub fn points(&self) -> Vec<Point2<f64>> {
        match self.state {
            SessionState::Idle => Vec::new(),
            SessionState::OnePointSelected => self.first.into_iter().collect(),
            SessionState::TwoPointsSelected | SessionState::ResultComputed => self
                .record
                .as_ref()
                .map(|r| r.points.to_vec())
                .unwrap_or_default(),
        }
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.terminated {
            Err(SessionError::Terminated)
        } else {
            Ok(())
        }
    }

    fn ensure_pair(&self, action: &'static str) -> Result<MeasurementRecord, SessionError> {
        match (&self.record, self.state) {
            (Some(r), SessionState::TwoPointsSelected) => Ok(r.clone()),
            _ => Err(SessionError::NotReady {
                action,
                state: self.state,
            }),
        }
    }

    /// Select a point. A click while a pair (or a result) is held starts a
    /// new selection with this point.
    pub fn click(&mut self, x: f64, y: f64) -> Result<SessionState, SessionError> {
        self.ensure_active()?;
        if !x.is_finite() || !y.is_finite() {
            return Err(SessionError::InvalidInput(format!("bad point ({x}, {y})")));
        }
        if let Some([w, h]) = self.bounds {
            if x < 0.0 || y < 0.0 || x >= w as f64 || y >= h as f64 {
                return Err(SessionError::InvalidInput(format!(
                    "point ({x}, {y}) is outside the {w}x{h} image"
                )));
            }
        }

        let p = Point2::new(x, y);
        self.state = match (self.state, self.first) {
            (SessionState::OnePointSelected, Some(a)) => {
                let record = MeasurementRecord::new(a, p);
                info!(
                    "points selected: ({}, {}) ({}, {}), pixel distance {:.2}",
                    a.x, a.y, p.x, p.y, record.pixel_distance
                );
                self.record = Some(record);
                self.first = None;
                SessionState::TwoPointsSelected
            }
            _ => {
                self.record = None;
                self.first = Some(p);
                SessionState::OnePointSelected
            }
        };
        Ok(self.state)
    }

    /// `f = w * D / W` for the selected pair. The session returns to `Idle`
    /// and keeps the record.
    pub fn calibrate(&mut self, real_length: f64, distance: f64) -> Result<f64, SessionError> {
        self.ensure_active()?;
        let mut record = self.ensure_pair("calibrate")?;
        let focal = calibrate_focal(record.pixel_distance, distance, real_length)?;

        record.mode = Some(Mode::Calibrate);
        record.distance = Some(distance);
        record.real_length = Some(real_length);
        record.focal_length = Some(focal);
        debug!("calibrated focal length {focal:.4} px");
        self.record = Some(record);
        self.first = None;
        self.state = SessionState::Idle;
        Ok(focal)
    }

    /// `W = w * D / f` for the selected pair.
    ///
    /// Without a focal length the loaded intrinsics are used: the Euclidean
    /// size comes from the mean focal length and the per-axis extent from
    /// `fx` and `fy`.
    pub fn measure(&mut self, focal: Option<f64>, distance: f64) -> Result<Measurement, SessionError> {
        self.ensure_active()?;
        let mut record = self.ensure_pair("measure")?;

        let (focal_length, extent) = match (focal, &self.intrinsics) {
            (Some(f), _) => (f, None),
            (None, Some(k)) => (
                k.mean_focal(),
                Some(measure_extent(&record.span, distance, k.fx, k.fy)?),
            ),
            (None, None) => {
                return Err(SessionError::InvalidInput(
                    "a focal length is required when no intrinsics are loaded".into(),
                ))
            }
        };
        let real_length = measure_real(record.pixel_distance, distance, focal_length)?;

        record.mode = Some(Mode::Measure);
        record.distance = Some(distance);
        record.focal_length = Some(focal_length);
        record.real_length = Some(real_length);
        record.extent = extent;
        debug!("measured {real_length:.4} units with f = {focal_length:.4} px");
        self.record = Some(record);
        self.state = SessionState::ResultComputed;
        Ok(Measurement {
            real_length,
            focal_length,
            extent,
        })
    }

    /// Back to `Idle`, dropping points and record.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.state = SessionState::Idle;
        self.first = None;
        self.record = None;
        info!("reset");
        Ok(())
    }

    /// End the session; every later call fails with [`SessionError::Terminated`].
    pub fn quit(&mut self) {
        self.terminated = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(session: &mut MeasurementSession) {
        session.click(10.0, 20.0).unwrap();
        session.click(13.0, 24.0).unwrap();
    }

    #[test]
    fn two_clicks_select_a_pair() {
        let mut s = MeasurementSession::new();
        assert_eq!(SessionState::Idle, s.state());
        assert_eq!(SessionState::OnePointSelected, s.click(10.0, 20.0).unwrap());
        assert_eq!(SessionState::TwoPointsSelected, s.click(13.0, 24.0).unwrap());
        let r = s.record().unwrap();
        assert_eq!(5.0, r.pixel_distance);
        assert_eq!(None, r.mode);
        assert_eq!(2, s.points().len());
    }

    #[test]
    fn third_click_starts_over() {
        let mut s = MeasurementSession::new();
        pair(&mut s);
        assert_eq!(SessionState::OnePointSelected, s.click(50.0, 60.0).unwrap());
        assert!(s.record().is_none());
        assert_eq!(vec![Point2::new(50.0, 60.0)], s.points());
    }

    #[test]
    fn calibrate_returns_to_idle_with_focal() {
        let mut s = MeasurementSession::new();
        pair(&mut s);
        let f = s.calibrate(2.0, 100.0).unwrap();
        assert_eq!(250.0, f);
        assert_eq!(SessionState::Idle, s.state());
        assert_eq!(Some(250.0), s.record().unwrap().computed());
        assert!(s.points().is_empty());
    }

    #[test]
    fn measure_computes_result() {
        let mut s = MeasurementSession::new();
        pair(&mut s);
        let m = s.measure(Some(250.0), 100.0).unwrap();
        assert_eq!(2.0, m.real_length);
        assert_eq!(SessionState::ResultComputed, s.state());
        assert_eq!(Some(Mode::Measure), s.record().unwrap().mode);
    }

    #[test]
    fn click_after_result_starts_over() {
        let mut s = MeasurementSession::new();
        pair(&mut s);
        s.measure(Some(250.0), 100.0).unwrap();
        assert_eq!(SessionState::OnePointSelected, s.click(1.0, 1.0).unwrap());
        assert!(s.record().is_none());
    }

    #[test]
    fn invalid_parameter_keeps_state_and_record() {
        let mut s = MeasurementSession::new();
        pair(&mut s);
        let before = s.record().cloned();
        assert!(matches!(
            s.calibrate(0.0, 100.0),
            Err(SessionError::InvalidParameter(_))
        ));
        assert!(matches!(
            s.measure(Some(-3.0), 100.0),
            Err(SessionError::InvalidParameter(_))
        ));
        assert_eq!(SessionState::TwoPointsSelected, s.state());
        assert_eq!(before.as_ref(), s.record());
    }

    #[test]
    fn actions_need_a_pair() {
        let mut s = MeasurementSession::new();
        s.click(1.0, 1.0).unwrap();
        assert!(matches!(
            s.measure(Some(100.0), 10.0),
            Err(SessionError::NotReady {
                state: SessionState::OnePointSelected,
                ..
            })
        ));
    }

    #[test]
    fn measure_without_focal_uses_intrinsics_per_axis() {
        let k = IntrinsicParameters::pinhole(1160.39054, 1161.54557, 640.0, 360.0, [1280, 720]);
        let mut s = MeasurementSession::new().with_intrinsics(k);
        s.click(100.0, 100.0).unwrap();
        s.click(105.0, 215.0).unwrap();
        let m = s.measure(None, 2000.0).unwrap();
        let extent = m.extent.unwrap();
        assert!((extent.width - 8.62).abs() < 0.005);
        assert!((extent.height - 198.012).abs() < 0.001);
        assert_eq!(k.mean_focal(), m.focal_length);
    }

    #[test]
    fn measure_without_focal_or_intrinsics_is_invalid() {
        let mut s = MeasurementSession::new();
        pair(&mut s);
        assert!(matches!(s.measure(None, 10.0), Err(SessionError::InvalidInput(_))));
        assert_eq!(SessionState::TwoPointsSelected, s.state());
    }

    #[test]
    fn out_of_bounds_click_changes_nothing() {
        let mut s = MeasurementSession::new().with_bounds(640, 480);
        s.click(10.0, 10.0).unwrap();
        assert!(matches!(s.click(640.0, 10.0), Err(SessionError::InvalidInput(_))));
        assert_eq!(SessionState::OnePointSelected, s.state());
    }

    #[test]
    fn reset_and_quit() {
        let mut s = MeasurementSession::new();
        pair(&mut s);
        s.reset().unwrap();
        assert_eq!(SessionState::Idle, s.state());
        assert!(s.record().is_none());
        s.quit();
        assert_eq!(Err(SessionError::Terminated), s.click(1.0, 1.0));
        assert_eq!(Err(SessionError::Terminated), s.reset());
    }
}
