//! Comparison of measured dimensions against known ground truth.

use crate::core::RealExtent;
use std::fmt;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// `|calculated - actual| / |actual| * 100`.
pub fn percent_error(calculated: f64, actual: f64) -> Result<f64, ValidationError> {
    if !calculated.is_finite() {
        return Err(ValidationError::InvalidInput(format!(
            "calculated value {calculated} is not finite"
        )));
    }
    if !actual.is_finite() || actual == 0.0 {
        return Err(ValidationError::InvalidInput(format!(
            "actual value must be finite and non-zero (got {actual})"
        )));
    }
    Ok(((calculated - actual) / actual).abs() * 100.0)
}

/// One measured value checked against its ground truth. Display only.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValidationResult {
    pub actual: f64,
    pub calculated: f64,
    pub percent_error: f64,
}

impl ValidationResult {
    pub fn new(calculated: f64, actual: f64) -> Result<Self, ValidationError> {
        Ok(Self {
            actual,
            calculated,
            percent_error: percent_error(calculated, actual)?,
        })
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[VALIDATION] Actual: {:.4}", self.actual)?;
        writeln!(f, "[VALIDATION] Calculated: {:.4}", self.calculated)?;
        write!(f, "[VALIDATION] Percentage Error: {:.2}%", self.percent_error)
    }
}

/// Width and height checked separately.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtentValidation {
    pub width: ValidationResult,
    pub height: ValidationResult,
}

pub fn validate_extent(
    calculated: &RealExtent,
    actual: &RealExtent,
) -> Result<ExtentValidation, ValidationError> {
    Ok(ExtentValidation {
        width: ValidationResult::new(calculated.width, actual.width)?,
        height: ValidationResult::new(calculated.height, actual.height)?,
    })
}

impl fmt::Display for ExtentValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Width : {:.2} (actual {:.2}, error {:.2}%)",
            self.width.calculated, self.width.actual, self.width.percent_error
        )?;
        write!(
            f,
            "Height: {:.2} (actual {:.2}, error {:.2}%)",
            self.height.calculated, self.height.actual, self.height.percent_error
        )
    }
}
