//! Durable storage of calibration runs as pretty JSON, one file per run.

use crate::engine::{CalibrationResult, ViewPose};
use log::info;
use pinhole_gauge_core::{CalibrationTarget, IntrinsicParameters};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("no calibration run '{0}'")]
    NotFound(String),
}

/// Everything a later measurement run needs from one calibration run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub run_id: String,
    pub created_unix: u64,
    pub target: CalibrationTarget,
    pub image_size: [u32; 2],
    pub intrinsics: IntrinsicParameters,
    #[serde(default)]
    pub views: Vec<ViewPose>,
    /// Labels of the images that produced a view.
    #[serde(default)]
    pub used: Vec<String>,
    /// Labels of the images dropped before calibration.
    #[serde(default)]
    pub rejected: Vec<String>,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// `calib-<unix seconds>`.
pub fn default_run_id() -> String {
    format!("calib-{}", unix_now())
}

impl CalibrationRecord {
    pub fn new(
        run_id: impl Into<String>,
        target: CalibrationTarget,
        result: &CalibrationResult,
        rejected: Vec<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            created_unix: unix_now(),
            target,
            image_size: result.intrinsics.image_size,
            intrinsics: result.intrinsics,
            used: result.views.iter().map(|v| v.label.clone()).collect(),
            views: result.views.clone(),
            rejected,
        }
    }
}

/// A directory of [`CalibrationRecord`]s keyed by run id.
#[derive(Clone, Debug)]
pub struct CalibrationStore {
    dir: PathBuf,
}

impl CalibrationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    /// Write `record`, replacing any earlier record with the same run id.
    pub fn save(&self, record: &CalibrationRecord) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&record.run_id);
        fs::write(&path, serde_json::to_string_pretty(record)?)?;
        info!("saved calibration '{}' to {}", record.run_id, path.display());
        Ok(path)
    }

    pub fn load(&self, run_id: &str) -> Result<CalibrationRecord, StoreError> {
        let path = self.path_for(run_id);
        if !path.is_file() {
            return Err(StoreError::NotFound(run_id.to_string()));
        }
        Self::load_path(path)
    }

    pub fn load_path(path: impl AsRef<Path>) -> Result<CalibrationRecord, StoreError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Run ids present in the store, sorted. A missing directory is empty.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids: Vec<String> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|e| e == "json"))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// The most recently created run; ties go to the greater run id.
    pub fn latest(&self) -> Result<Option<CalibrationRecord>, StoreError> {
        let mut best: Option<CalibrationRecord> = None;
        for id in self.list()? {
            // Foreign JSON files in the directory are not runs.
            let Ok(record) = self.load(&id) else {
                continue;
            };
            let newer = best.as_ref().is_none_or(|b| {
                (record.created_unix, &record.run_id) > (b.created_unix, &b.run_id)
            });
            if newer {
                best = Some(record);
            }
        }
        Ok(best)
    }
}
