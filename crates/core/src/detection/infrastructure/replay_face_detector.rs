use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::detection::domain::detection::Detection;
use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("failed to read detections from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid detections file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("frame {0} is listed more than once")]
    DuplicateFrame(usize),
}

#[derive(Deserialize)]
struct DetectionFile {
    frames: Vec<FrameDetections>,
}

#[derive(Deserialize)]
struct FrameDetections {
    index: usize,
    #[serde(default)]
    detections: Vec<Detection>,
}

/// Serves pre-computed detections by frame index.
///
/// Stands in for a live detection model: the detections file is produced
/// by whatever model runs upstream, in the model's own output order.
///
/// ```json
/// {"frames": [{"index": 0, "detections": [
///     {"x": 10, "y": 10, "width": 50, "height": 50, "confidence": 0.8}]}]}
/// ```
///
/// Frames missing from the file yield no detections.
pub struct ReplayFaceDetector {
    by_frame: HashMap<usize, Vec<Detection>>,
}

impl ReplayFaceDetector {
    pub fn new(by_frame: HashMap<usize, Vec<Detection>>) -> Self {
        Self { by_frame }
    }

    pub fn from_file(path: &Path) -> Result<Self, ReplayError> {
        let json = fs::read_to_string(path).map_err(|source| ReplayError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, ReplayError> {
        let file: DetectionFile = serde_json::from_str(json)?;
        let mut by_frame = HashMap::with_capacity(file.frames.len());
        for entry in file.frames {
            if by_frame.insert(entry.index, entry.detections).is_some() {
                return Err(ReplayError::DuplicateFrame(entry.index));
            }
        }
        log::debug!("Loaded detections for {} frames", by_frame.len());
        Ok(Self::new(by_frame))
    }

    pub fn frame_count(&self) -> usize {
        self.by_frame.len()
    }
}

impl FaceDetector for ReplayFaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
        Ok(self.by_frame.get(&frame.index()).cloned().unwrap_or_default())
    }
}
