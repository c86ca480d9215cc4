//! JSON configuration of a calibration run.

use crate::calib::CalibrationConfig;
use crate::chessboard::{DetectorKind, DetectorParams};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn default_extensions() -> Vec<String> {
    ["jpeg", "jpg", "png"].iter().map(|s| s.to_string()).collect()
}

/// Everything `calibrate` needs: where the photos are, how to find the
/// board in them and how to solve for the camera.
///
/// Every field has a default, so a config file only names what it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub image_dir: PathBuf,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    pub output_dir: PathBuf,
    pub detector: DetectorKind,
    pub detector_params: DetectorParams,
    pub calibration: CalibrationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("board_photos"),
            extensions: default_extensions(),
            output_dir: PathBuf::from("outputs"),
            detector: DetectorKind::default(),
            detector_params: DetectorParams::default(),
            calibration: CalibrationConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_usual_setup() {
        let cfg = PipelineConfig::default();
        assert_eq!(Path::new("board_photos"), cfg.image_dir);
        assert_eq!(Path::new("outputs"), cfg.output_dir);
        assert_eq!((7, 7), (cfg.calibration.target.grid_width, cfg.calibration.target.grid_height));
        assert_eq!(25.0, cfg.calibration.target.square_size);
        assert_eq!(6, cfg.calibration.min_views);
        assert_eq!(DetectorKind::Classical, cfg.detector);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let cfg: PipelineConfig = serde_json::from_str(
            r#"{
                "image_dir": "shots",
                "detector": "normalized",
                "calibration": { "target": { "grid_width": 9, "grid_height": 6, "square_size": 20.0 } }
            }"#,
        )
        .unwrap();
        assert_eq!(Path::new("shots"), cfg.image_dir);
        assert_eq!(DetectorKind::Normalized, cfg.detector);
        assert_eq!(9, cfg.calibration.target.grid_width);
        assert_eq!(6, cfg.calibration.min_views);
        assert_eq!(default_extensions(), cfg.extensions);
    }

    #[test]
    fn json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibrate.json");
        let mut cfg = PipelineConfig::default();
        cfg.calibration.fix_k3 = true;
        cfg.extensions = vec!["tif".into()];
        cfg.write_json(&path).unwrap();
        assert_eq!(cfg, PipelineConfig::load_json(&path).unwrap());
    }
}
