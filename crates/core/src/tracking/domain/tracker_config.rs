use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{
    DEFAULT_INITIAL_UNCERTAINTY, DEFAULT_IOU_THRESHOLD, DEFAULT_MEASUREMENT_NOISE,
    DEFAULT_PROCESS_NOISE,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// How detections in the same frame compete for tracked identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Each detection independently takes its best identity. Two detections
    /// can claim the same identity in one frame.
    #[default]
    PerDetection,
    /// Once claimed, an identity is unavailable for the rest of the frame.
    Exclusive,
}

/// Noise magnitudes of the constant-velocity motion model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionNoise {
    pub process: f64,
    pub measurement: f64,
    pub initial_uncertainty: f64,
}

impl Default for MotionNoise {
    fn default() -> Self {
        Self {
            process: DEFAULT_PROCESS_NOISE,
            measurement: DEFAULT_MEASUREMENT_NOISE,
            initial_uncertainty: DEFAULT_INITIAL_UNCERTAINTY,
        }
    }
}

/// Tuning for association, motion estimation and identity expiry.
///
/// Fixed for the lifetime of a run; every field has a default so a config
/// file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub iou_threshold: f64,
    pub match_policy: MatchPolicy,
    pub motion: MotionNoise,
    /// Evict an identity from memory after this many consecutive frames
    /// without a match. `None` keeps every identity for the whole run.
    pub max_missed_frames: Option<usize>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            match_policy: MatchPolicy::default(),
            motion: MotionNoise::default(),
            max_missed_frames: None,
        }
    }
}

impl TrackerConfig {
    /// Loads and validates a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: TrackerConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(ConfigError::Invalid(format!(
                "iou_threshold must be between 0.0 and 1.0, got {}",
                self.iou_threshold
            )));
        }
        let noise = [
            ("motion.process", self.motion.process),
            ("motion.measurement", self.motion.measurement),
            ("motion.initial_uncertainty", self.motion.initial_uncertainty),
        ];
        for (name, value) in noise {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        Ok(())
    }
}
