use thiserror::Error;

use crate::persistence::domain::records::{
    DetectionRecord, FaceRecord, Observation, UpdateOutcome,
};
use crate::shared::face_id::FaceId;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("face {0} already exists")]
    DuplicateFace(FaceId),
    #[error("face {0} does not exist")]
    UnknownFace(FaceId),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("storage backend failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Durable record of every identity's best observation and full history.
///
/// Each write touches a face row and a detection row; implementations must
/// make both visible together or not at all. The best-image comparison and
/// replacement in [`update_identity`](Self::update_identity) must be a
/// single indivisible step.
pub trait FaceRepository: Send {
    /// Inserts the face summary and its first detection.
    fn create_identity(&mut self, observation: &Observation<'_>) -> Result<(), StoreError>;

    /// Sets `last_seen`, replaces the best image only on strictly higher
    /// confidence, and appends a detection.
    fn update_identity(&mut self, observation: &Observation<'_>)
        -> Result<UpdateOutcome, StoreError>;

    fn face(&self, face_id: &FaceId) -> Result<Option<FaceRecord>, StoreError>;

    /// All faces, oldest first.
    fn faces(&self) -> Result<Vec<FaceRecord>, StoreError>;

    /// Detections of one face in the order they were recorded.
    fn detections(&self, face_id: &FaceId) -> Result<Vec<DetectionRecord>, StoreError>;
}
