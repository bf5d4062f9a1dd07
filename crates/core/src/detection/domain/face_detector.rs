use crate::detection::domain::detection::Detection;
use crate::shared::frame::Frame;

/// Domain interface for the face-detection model.
///
/// Detections are returned in source order; matching is order-sensitive,
/// so implementations must not reorder them between runs.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>>;
}
