use std::collections::{HashMap, HashSet};

use crate::shared::bounding_box::BoundingBox;
use crate::shared::face_id::FaceId;
use crate::tracking::domain::association::Prediction;
use crate::tracking::domain::motion_estimator::MotionEstimator;
use crate::tracking::domain::tracker_config::{MotionNoise, TrackerConfig};

/// One live identity and the motion state that follows it.
#[derive(Clone, Debug)]
pub struct TrackedIdentity {
    face_id: FaceId,
    estimator: MotionEstimator,
    frames_since_match: usize,
    corrected_this_frame: bool,
}

impl TrackedIdentity {
    pub fn face_id(&self) -> FaceId {
        self.face_id
    }

    pub fn estimator(&self) -> &MotionEstimator {
        &self.estimator
    }

    pub fn frames_since_match(&self) -> usize {
        self.frames_since_match
    }
}

/// Owns every live identity, in creation order.
///
/// Creation and correction are staged: the caller's `commit` closure runs
/// against the new state (typically the persistence write) and the registry
/// only keeps that state if the closure succeeds.
pub struct IdentityRegistry {
    identities: Vec<TrackedIdentity>,
    index: HashMap<FaceId, usize>,
    noise: MotionNoise,
    max_missed_frames: Option<usize>,
}

impl IdentityRegistry {
    pub fn new(noise: MotionNoise, max_missed_frames: Option<usize>) -> Self {
        Self {
            identities: Vec::new(),
            index: HashMap::new(),
            noise,
            max_missed_frames,
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(config.motion, config.max_missed_frames)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn contains(&self, face_id: &FaceId) -> bool {
        self.index.contains_key(face_id)
    }

    pub fn get(&self, face_id: &FaceId) -> Option<&TrackedIdentity> {
        self.index.get(face_id).map(|&i| &self.identities[i])
    }

    /// Advances every estimator one frame and returns the predicted boxes
    /// in creation order. Starts a new frame for [`correct_with`](Self::correct_with).
    pub fn predict_all(&mut self) -> Vec<Prediction> {
        self.identities
            .iter_mut()
            .map(|identity| {
                identity.corrected_this_frame = false;
                Prediction {
                    face_id: identity.face_id,
                    bbox: identity.estimator.predict(),
                }
            })
            .collect()
    }

    /// Corrects `face_id`'s estimator with `measurement`, keeping the result
    /// only if `commit` accepts the corrected box.
    ///
    /// Every correction follows its own prediction: an identity already
    /// corrected in this frame is predicted once more before the next
    /// correction.
    ///
    /// Returns `Ok(None)` when the identity is not live.
    pub fn correct_with<T, E>(
        &mut self,
        face_id: &FaceId,
        measurement: &BoundingBox,
        commit: impl FnOnce(&BoundingBox) -> Result<T, E>,
    ) -> Result<Option<(BoundingBox, T)>, E> {
        let Some(&i) = self.index.get(face_id) else {
            return Ok(None);
        };

        let mut staged = self.identities[i].estimator.clone();
        if self.identities[i].corrected_this_frame {
            staged.predict();
        }
        let corrected = staged.correct(measurement);
        let committed = commit(&corrected)?;

        let identity = &mut self.identities[i];
        identity.estimator = staged;
        identity.frames_since_match = 0;
        identity.corrected_this_frame = true;
        Ok(Some((corrected, committed)))
    }

    /// Allocates a fresh identity seeded at `bbox`. The identity becomes
    /// live only if `commit` succeeds for the new id.
    pub fn create_with<T, E>(
        &mut self,
        bbox: &BoundingBox,
        commit: impl FnOnce(FaceId) -> Result<T, E>,
    ) -> Result<(FaceId, T), E> {
        let mut face_id = FaceId::generate();
        while self.index.contains_key(&face_id) {
            face_id = FaceId::generate();
        }

        let committed = commit(face_id)?;

        self.index.insert(face_id, self.identities.len());
        self.identities.push(TrackedIdentity {
            face_id,
            estimator: MotionEstimator::new(bbox, self.noise),
            frames_since_match: 0,
            corrected_this_frame: false,
        });
        Ok((face_id, committed))
    }

    /// Closes a frame: identities in `observed` reset their missed count,
    /// the rest age by one. With an expiry threshold configured, identities
    /// missed for longer than it are dropped and returned.
    pub fn end_frame(&mut self, observed: &HashSet<FaceId>) -> Vec<FaceId> {
        for identity in &mut self.identities {
            if observed.contains(&identity.face_id) {
                identity.frames_since_match = 0;
            } else {
                identity.frames_since_match += 1;
            }
        }

        let Some(max_missed) = self.max_missed_frames else {
            return Vec::new();
        };

        let mut evicted = Vec::new();
        self.identities.retain(|identity| {
            let keep = identity.frames_since_match <= max_missed;
            if !keep {
                evicted.push(identity.face_id);
            }
            keep
        });
        if !evicted.is_empty() {
            self.reindex();
        }
        evicted
    }

    fn reindex(&mut self) {
        self.index = self
            .identities
            .iter()
            .enumerate()
            .map(|(i, identity)| (identity.face_id, i))
            .collect();
    }
}
