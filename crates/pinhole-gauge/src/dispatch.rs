//! Single-threaded event loop in front of a [`MeasurementSession`].
//!
//! Clicks, key commands and free-text entries arrive as [`InputEvent`]s. The
//! [`Dispatcher`] remembers which value it is waiting for, routes each event
//! to the session and returns an [`Outcome`] for the front end to render.

use crate::session::{Measurement, MeasurementSession, SessionError, SessionState};
use crate::validation::ValidationResult;
use log::debug;
use std::io::{self, BufRead, Write};

#[derive(Clone, Debug, PartialEq)]
pub enum InputEvent {
    Click { x: f64, y: f64 },
    Key(char),
    Text(String),
}

/// Value the dispatcher is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prompt {
    ChooseMode,
    RealWidth,
    Distance,
    FocalLength,
    ValidateChoice,
    ActualDimension,
}

impl Prompt {
    pub fn text(&self) -> &'static str {
        match self {
            Prompt::ChooseMode => "Mode? 1 = calibrate (known size), 2 = measure (known focal length):",
            Prompt::RealWidth => "Real width of the object:",
            Prompt::Distance => "Distance from camera to object:",
            Prompt::FocalLength => "Focal length in pixels:",
            Prompt::ValidateChoice => "Validate against a known dimension? (y/n):",
            Prompt::ActualDimension => "Actual dimension:",
        }
    }
}

/// What handling one event produced.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    PointSelected { x: f64, y: f64 },
    PairSelected { x: f64, y: f64, pixel_distance: f64 },
    Prompt(Prompt),
    /// Mode entry was neither calibrate nor measure; the pair stays selected.
    Cancelled,
    Focal(f64),
    Measured(Measurement),
    Validated(ValidationResult),
    /// Validation declined.
    Done,
    Reset,
    Quit,
    /// Recoverable failure. `prompt` is what the dispatcher waits for next.
    Error { message: String, prompt: Option<Prompt> },
    Ignored,
    Terminated,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Pending {
    Mode,
    CalibrateWidth,
    CalibrateDistance { real_length: f64 },
    MeasureFocal,
    MeasureDistance { focal: Option<f64> },
    Validate { calculated: f64 },
    Actual { calculated: f64 },
}

impl Pending {
    fn prompt(self) -> Prompt {
        match self {
            Pending::Mode => Prompt::ChooseMode,
            Pending::CalibrateWidth => Prompt::RealWidth,
            Pending::CalibrateDistance { .. } | Pending::MeasureDistance { .. } => Prompt::Distance,
            Pending::MeasureFocal => Prompt::FocalLength,
            Pending::Validate { .. } => Prompt::ValidateChoice,
            Pending::Actual { .. } => Prompt::ActualDimension,
        }
    }
}

fn parse_number(text: &str) -> Result<f64, SessionError> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| SessionError::InvalidInput(format!("'{}' is not a number", text.trim())))
}

pub struct Dispatcher {
    session: MeasurementSession,
    pending: Option<Pending>,
}

impl Dispatcher {
    pub fn new(session: MeasurementSession) -> Self {
        Self {
            session,
            pending: None,
        }
    }

    pub fn session(&self) -> &MeasurementSession {
        &self.session
    }

    pub fn pending(&self) -> Option<Prompt> {
        self.pending.map(Pending::prompt)
    }

    /// Prompt line for the front end, if a value is expected.
    pub fn prompt_line(&self) -> Option<&'static str> {
        match self.pending()? {
            Prompt::FocalLength if self.session.intrinsics().is_some() => {
                Some("Focal length in pixels (empty to use the calibrated fx/fy):")
            }
            p => Some(p.text()),
        }
    }

    fn wait(&mut self, next: Pending) -> Outcome {
        self.pending = Some(next);
        Outcome::Prompt(next.prompt())
    }

    /// Report `err` and wait for `next`.
    fn fail(&mut self, err: SessionError, next: Option<Pending>) -> Outcome {
        debug!("recoverable: {err}");
        self.pending = next;
        Outcome::Error {
            message: err.to_string(),
            prompt: self.pending(),
        }
    }

    pub fn handle(&mut self, event: InputEvent) -> Outcome {
        if self.session.is_terminated() {
            return Outcome::Terminated;
        }
        match event {
            InputEvent::Key(c) => match c.to_ascii_lowercase() {
                'q' => {
                    self.session.quit();
                    self.pending = None;
                    Outcome::Quit
                }
                'r' => match self.session.reset() {
                    Ok(()) => {
                        self.pending = None;
                        Outcome::Reset
                    }
                    Err(err) => self.fail(err, self.pending),
                },
                _ => Outcome::Ignored,
            },
            InputEvent::Click { x, y } => self.click(x, y),
            InputEvent::Text(text) => self.text(&text),
        }
    }

    fn click(&mut self, x: f64, y: f64) -> Outcome {
        match self.session.click(x, y) {
            Ok(SessionState::TwoPointsSelected) => {
                let pixel_distance = self
                    .session
                    .record()
                    .map(|r| r.pixel_distance)
                    .unwrap_or_default();
                self.pending = Some(Pending::Mode);
                Outcome::PairSelected {
                    x,
                    y,
                    pixel_distance,
                }
            }
            Ok(_) => {
                self.pending = None;
                Outcome::PointSelected { x, y }
            }
            Err(err) => self.fail(err, self.pending),
        }
    }

    fn text(&mut self, text: &str) -> Outcome {
        let Some(pending) = self.pending else {
            return Outcome::Ignored;
        };
        let entry = text.trim();
        match pending {
            Pending::Mode => match entry {
                "1" => self.wait(Pending::CalibrateWidth),
                "2" => self.wait(Pending::MeasureFocal),
                _ => {
                    self.pending = None;
                    Outcome::Cancelled
                }
            },
            Pending::CalibrateWidth => match parse_number(entry) {
                Ok(real_length) => self.wait(Pending::CalibrateDistance { real_length }),
                Err(err) => self.fail(err, Some(Pending::Mode)),
            },
            Pending::CalibrateDistance { real_length } => {
                match parse_number(entry).and_then(|d| self.session.calibrate(real_length, d)) {
                    Ok(focal) => {
                        self.pending = None;
                        Outcome::Focal(focal)
                    }
                    Err(err) => self.fail(err, Some(Pending::Mode)),
                }
            }
            Pending::MeasureFocal => {
                if entry.is_empty() && self.session.intrinsics().is_some() {
                    return self.wait(Pending::MeasureDistance { focal: None });
                }
                match parse_number(entry) {
                    Ok(f) => self.wait(Pending::MeasureDistance { focal: Some(f) }),
                    Err(err) => self.fail(err, Some(Pending::Mode)),
                }
            }
            Pending::MeasureDistance { focal } => {
                match parse_number(entry).and_then(|d| self.session.measure(focal, d)) {
                    Ok(m) => {
                        self.pending = Some(Pending::Validate {
                            calculated: m.real_length,
                        });
                        Outcome::Measured(m)
                    }
                    Err(err) => self.fail(err, Some(Pending::Mode)),
                }
            }
            Pending::Validate { calculated } => {
                if entry.eq_ignore_ascii_case("y") {
                    self.wait(Pending::Actual { calculated })
                } else {
                    self.pending = None;
                    Outcome::Done
                }
            }
            Pending::Actual { calculated } => {
                let result = parse_number(entry).and_then(|actual| {
                    ValidationResult::new(calculated, actual)
                        .map_err(|e| SessionError::InvalidInput(e.to_string()))
                });
                match result {
                    Ok(r) => {
                        self.pending = None;
                        Outcome::Validated(r)
                    }
                    Err(err) => self.fail(err, Some(pending)),
                }
            }
        }
    }
}

/// Console syntax: `click X Y`, `r`, `q`, anything else is a text entry.
pub fn parse_line(line: &str) -> InputEvent {
    let trimmed = line.trim();
    if trimmed.eq_ignore_ascii_case("r") || trimmed.eq_ignore_ascii_case("q") {
        if let Some(c) = trimmed.chars().next() {
            return InputEvent::Key(c);
        }
    }
    let mut parts = trimmed.split_whitespace();
    if parts.next() == Some("click") {
        let coords: Vec<f64> = parts.filter_map(|p| p.parse().ok()).collect();
        if let [x, y] = coords.as_slice() {
            return InputEvent::Click { x: *x, y: *y };
        }
    }
    InputEvent::Text(trimmed.to_string())
}

fn render(outcome: &Outcome, out: &mut impl Write) -> io::Result<()> {
    match outcome {
        Outcome::PointSelected { x, y } => writeln!(out, "Point 1: ({x}, {y})"),
        Outcome::PairSelected {
            x,
            y,
            pixel_distance,
        } => {
            writeln!(out, "Point 2: ({x}, {y})")?;
            writeln!(out, "Pixel distance: {pixel_distance:.2}")
        }
        Outcome::Cancelled => writeln!(out, "Cancelled."),
        Outcome::Focal(f) => writeln!(out, "Focal length: {f:.4} px"),
        Outcome::Measured(m) => {
            writeln!(out, "Real size: {:.4} (f = {:.4} px)", m.real_length, m.focal_length)?;
            if let Some(e) = m.extent {
                writeln!(out, "Width : {:.4}", e.width)?;
                writeln!(out, "Height: {:.4}", e.height)?;
            }
            Ok(())
        }
        Outcome::Validated(r) => writeln!(out, "{r}"),
        Outcome::Reset => writeln!(out, "Reset."),
        Outcome::Quit => writeln!(out, "Session ended."),
        Outcome::Error { message, .. } => writeln!(out, "Error: {message}"),
        Outcome::Ignored => writeln!(out, "Expected: click X Y | r | q"),
        Outcome::Prompt(_) | Outcome::Done | Outcome::Terminated => Ok(()),
    }
}

/// Drive `dispatcher` from line-based input until `q` or end of input.
pub fn run_console<R: BufRead, W: Write>(
    dispatcher: &mut Dispatcher,
    input: R,
    mut out: W,
) -> io::Result<()> {
    writeln!(out, "Select two points with `click X Y`. `r` resets, `q` quits.")?;
    for line in input.lines() {
        let outcome = dispatcher.handle(parse_line(&line?));
        render(&outcome, &mut out)?;
        if matches!(outcome, Outcome::Quit | Outcome::Terminated) {
            break;
        }
        if let Some(prompt) = dispatcher.prompt_line() {
            writeln!(out, "{prompt}")?;
        }
    }
    out.flush()
}
