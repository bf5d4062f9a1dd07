use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::detection::domain::detection::Detection;
use crate::persistence::domain::face_repository::FaceRepository;
use crate::persistence::domain::records::Observation;
use crate::pipeline::tracking_error::TrackingError;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::face_id::FaceId;
use crate::shared::face_image::FaceImage;
use crate::shared::frame::Frame;
use crate::tracking::domain::association::{Associator, MatchResult};
use crate::tracking::domain::identity_registry::IdentityRegistry;
use crate::tracking::domain::tracker_config::TrackerConfig;

/// Where one detection ended up.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackedFace {
    /// Position of the detection in the detector's output.
    pub detection_index: usize,
    pub face_id: FaceId,
    pub is_new: bool,
    /// Corrected box for a matched identity, the detection box for a new one.
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub best_replaced: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedDetection {
    pub detection_index: usize,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame_index: usize,
    pub timestamp: DateTime<Utc>,
    pub faces: Vec<TrackedFace>,
    pub skipped: Vec<SkippedDetection>,
    pub evicted: Vec<FaceId>,
}

impl FrameReport {
    pub fn new_identities(&self) -> usize {
        self.faces.iter().filter(|f| f.is_new).count()
    }
}

/// One frame of tracking: predict, associate, then update or create each
/// identity together with its persisted record.
///
/// The registry and the store are owned by the caller. A detection's
/// registry change is kept only if its store write succeeded, so on
/// `StorageFailure` the failing detection leaves no trace in either.
/// Detections before it in the same frame stay committed.
pub struct FrameProcessor {
    associator: Associator,
}

impl FrameProcessor {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            associator: Associator::new(config.iou_threshold, config.match_policy),
        }
    }

    pub fn process(
        &self,
        registry: &mut IdentityRegistry,
        repository: &mut dyn FaceRepository,
        frame: &Frame,
        detections: &[Detection],
        timestamp: DateTime<Utc>,
    ) -> Result<FrameReport, TrackingError> {
        let mut skipped = Vec::new();
        let mut valid = Vec::with_capacity(detections.len());
        for (i, det) in detections.iter().enumerate() {
            match det.validate() {
                Ok(()) => valid.push((i, *det)),
                Err(e) => {
                    let err = TrackingError::from(e);
                    log::warn!("Skipping detection {i} on frame {}: {err}", frame.index());
                    skipped.push(SkippedDetection {
                        detection_index: i,
                        reason: err.to_string(),
                    });
                }
            }
        }

        let predictions = registry.predict_all();
        let boxes: Vec<BoundingBox> = valid.iter().map(|(_, d)| d.bbox).collect();
        let matches = self.associator.associate(&boxes, &predictions);

        let mut faces = Vec::with_capacity(valid.len());
        let mut observed = HashSet::new();
        for ((detection_index, det), result) in valid.into_iter().zip(matches) {
            let crop = FaceImage::crop(frame, &det.bbox);
            let tracked = match result {
                MatchResult::Matched(face_id) => {
                    let committed = registry.correct_with(&face_id, &det.bbox, |corrected| {
                        repository.update_identity(&Observation {
                            face_id,
                            timestamp,
                            image: &crop,
                            confidence: det.confidence,
                            bbox: *corrected,
                        })
                    })?;
                    let (bbox, outcome) =
                        committed.ok_or(TrackingError::UnknownIdentity(face_id))?;
                    log::debug!(
                        "Frame {}: detection {detection_index} continues {face_id}",
                        frame.index()
                    );
                    TrackedFace {
                        detection_index,
                        face_id,
                        is_new: false,
                        bbox,
                        confidence: det.confidence,
                        best_replaced: outcome.best_replaced,
                    }
                }
                MatchResult::Unmatched => {
                    let (face_id, ()) = registry.create_with(&det.bbox, |face_id| {
                        repository.create_identity(&Observation {
                            face_id,
                            timestamp,
                            image: &crop,
                            confidence: det.confidence,
                            bbox: det.bbox,
                        })
                    })?;
                    log::info!("Frame {}: new face {face_id}", frame.index());
                    TrackedFace {
                        detection_index,
                        face_id,
                        is_new: true,
                        bbox: det.bbox,
                        confidence: det.confidence,
                        best_replaced: true,
                    }
                }
            };
            observed.insert(tracked.face_id);
            faces.push(tracked);
        }

        let evicted = registry.end_frame(&observed);
        for face_id in &evicted {
            log::debug!("Frame {}: evicted {face_id}", frame.index());
        }

        Ok(FrameReport {
            frame_index: frame.index(),
            timestamp,
            faces,
            skipped,
            evicted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::domain::face_repository::StoreError;
    use crate::persistence::domain::records::{DetectionRecord, FaceRecord, UpdateOutcome};
    use crate::persistence::infrastructure::sqlite_face_repository::SqliteFaceRepository;
    use crate::tracking::domain::tracker_config::MatchPolicy;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn at(frame: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::milliseconds(frame * 40)
    }

    fn frame(index: usize) -> Frame {
        Frame::new(vec![0u8; 300 * 300 * 3], 300, 300, 3, index)
    }

    fn det(x: f64, y: f64, w: f64, h: f64, confidence: f64) -> Detection {
        Detection::new(BoundingBox::new(x, y, w, h), confidence)
    }

    struct Harness {
        processor: FrameProcessor,
        registry: IdentityRegistry,
        repo: SqliteFaceRepository,
        next_frame: usize,
    }

    impl Harness {
        fn new(config: TrackerConfig) -> Self {
            Self {
                processor: FrameProcessor::new(&config),
                registry: IdentityRegistry::from_config(&config),
                repo: SqliteFaceRepository::in_memory().unwrap(),
                next_frame: 0,
            }
        }

        fn step(&mut self, detections: &[Detection]) -> FrameReport {
            let i = self.next_frame;
            self.next_frame += 1;
            self.processor
                .process(
                    &mut self.registry,
                    &mut self.repo,
                    &frame(i),
                    detections,
                    at(i as i64),
                )
                .unwrap()
        }
    }

    #[test]
    fn test_reference_scenario() {
        let mut h = Harness::new(TrackerConfig::default());

        let first = h.step(&[det(10.0, 10.0, 50.0, 50.0, 0.8)]);
        assert_eq!(first.faces.len(), 1);
        assert!(first.faces[0].is_new);
        let a = first.faces[0].face_id;
        let face = h.repo.face(&a).unwrap().unwrap();
        assert_relative_eq!(face.best_confidence, 0.8);
        assert_eq!((face.best_image.width(), face.best_image.height()), (50, 50));

        let second = h.step(&[det(12.0, 11.0, 50.0, 50.0, 0.6)]);
        assert_eq!(second.faces[0].face_id, a);
        assert!(!second.faces[0].is_new);
        assert!(!second.faces[0].best_replaced);
        let face = h.repo.face(&a).unwrap().unwrap();
        assert_relative_eq!(face.best_confidence, 0.8);
        assert_eq!(face.last_seen, at(1));
        assert_eq!(h.repo.detections(&a).unwrap().len(), 2);

        let third = h.step(&[det(200.0, 200.0, 30.0, 30.0, 0.95)]);
        let b = third.faces[0].face_id;
        assert!(third.faces[0].is_new);
        assert_ne!(a, b);
        assert_eq!(h.registry.len(), 2);
        assert_eq!(h.repo.faces().unwrap().len(), 2);
        assert_relative_eq!(h.repo.face(&b).unwrap().unwrap().best_confidence, 0.95);
    }

    #[test]
    fn test_matched_identity_persists_corrected_box() {
        let mut h = Harness::new(TrackerConfig::default());
        let a = h.step(&[det(10.0, 10.0, 50.0, 50.0, 0.8)]).faces[0].face_id;
        let report = h.step(&[det(14.0, 12.0, 50.0, 50.0, 0.9)]);

        let corrected = report.faces[0].bbox;
        assert!(corrected.x > 10.0 && corrected.x < 14.0);
        assert!(report.faces[0].best_replaced);

        let stored = h.repo.detections(&a).unwrap();
        assert_eq!(stored[1].bbox, corrected);
        // the crop comes from the raw detection box, not the corrected one
        assert_eq!(stored[1].image.width(), 50);
    }

    #[test]
    fn test_frame_without_detections_changes_nothing_persisted() {
        let mut h = Harness::new(TrackerConfig::default());
        let a = h.step(&[det(10.0, 10.0, 50.0, 50.0, 0.8)]).faces[0].face_id;
        let report = h.step(&[]);
        assert!(report.faces.is_empty());
        assert_eq!(h.registry.len(), 1);
        assert_eq!(h.repo.detections(&a).unwrap().len(), 1);
        assert_eq!(h.registry.get(&a).unwrap().frames_since_match(), 1);
    }

    #[test]
    fn test_unmatched_detection_creates_exactly_one_of_everything() {
        let mut h = Harness::new(TrackerConfig::default());
        let report = h.step(&[det(40.0, 40.0, 20.0, 20.0, 0.5)]);
        let id = report.faces[0].face_id;
        assert_eq!(h.registry.len(), 1);
        assert_eq!(h.repo.faces().unwrap().len(), 1);
        assert_eq!(h.repo.detections(&id).unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_detections_are_skipped_and_reported() {
        let mut h = Harness::new(TrackerConfig::default());
        let report = h.step(&[
            det(f64::NAN, 0.0, 10.0, 10.0, 0.5),
            det(10.0, 10.0, 50.0, 50.0, 0.8),
            det(100.0, 100.0, 20.0, 20.0, 1.7),
        ]);
        let skipped: Vec<usize> = report.skipped.iter().map(|s| s.detection_index).collect();
        assert_eq!(skipped, vec![0, 2]);
        assert_eq!(report.faces.len(), 1);
        assert_eq!(report.faces[0].detection_index, 1);
        assert_eq!(h.registry.len(), 1);
    }

    #[test]
    fn test_per_detection_policy_double_claims() {
        let mut h = Harness::new(TrackerConfig::default());
        let a = h.step(&[det(10.0, 10.0, 50.0, 50.0, 0.8)]).faces[0].face_id;
        let report = h.step(&[
            det(11.0, 10.0, 50.0, 50.0, 0.7),
            det(12.0, 10.0, 50.0, 50.0, 0.6),
        ]);
        assert!(report.faces.iter().all(|f| f.face_id == a));
        assert_eq!(h.registry.len(), 1);
        assert_eq!(h.repo.detections(&a).unwrap().len(), 3);
    }

    #[test]
    fn test_double_claim_predicts_before_each_correction() {
        use crate::tracking::domain::motion_estimator::MotionEstimator;

        let config = TrackerConfig::default();
        let mut h = Harness::new(config.clone());
        let seed = BoundingBox::new(10.0, 10.0, 50.0, 50.0);
        let a = h.step(&[det(10.0, 10.0, 50.0, 50.0, 0.8)]).faces[0].face_id;
        let report = h.step(&[
            det(11.0, 10.0, 50.0, 50.0, 0.7),
            det(12.0, 10.0, 50.0, 50.0, 0.6),
        ]);

        let mut expected = MotionEstimator::new(&seed, config.motion);
        expected.predict();
        let first = expected.correct(&BoundingBox::new(11.0, 10.0, 50.0, 50.0));
        expected.predict();
        let second = expected.correct(&BoundingBox::new(12.0, 10.0, 50.0, 50.0));

        assert_eq!(h.registry.get(&a).unwrap().estimator(), &expected);
        assert_eq!(report.faces[0].bbox, first);
        assert_eq!(report.faces[1].bbox, second);
    }

    #[test]
    fn test_exclusive_policy_splits_claimants() {
        let mut h = Harness::new(TrackerConfig {
            match_policy: MatchPolicy::Exclusive,
            ..Default::default()
        });
        let a = h.step(&[det(10.0, 10.0, 50.0, 50.0, 0.8)]).faces[0].face_id;
        let report = h.step(&[
            det(11.0, 10.0, 50.0, 50.0, 0.7),
            det(12.0, 10.0, 50.0, 50.0, 0.6),
        ]);
        assert_eq!(report.faces[0].face_id, a);
        assert!(report.faces[1].is_new);
        assert_eq!(h.registry.len(), 2);
    }

    #[test]
    fn test_steady_motion_stays_one_identity() {
        let mut h = Harness::new(TrackerConfig::default());
        let a = h.step(&[det(0.0, 100.0, 60.0, 60.0, 0.9)]).faces[0].face_id;
        for step in 1..30 {
            let report = h.step(&[det(step as f64 * 6.0, 100.0, 60.0, 60.0, 0.9)]);
            assert_eq!(report.faces[0].face_id, a, "lost track at step {step}");
        }
        assert_eq!(h.registry.len(), 1);
    }

    #[test]
    fn test_expiry_reports_evicted_identities() {
        let mut h = Harness::new(TrackerConfig {
            max_missed_frames: Some(1),
            ..Default::default()
        });
        let a = h.step(&[det(10.0, 10.0, 50.0, 50.0, 0.8)]).faces[0].face_id;
        assert!(h.step(&[]).evicted.is_empty());
        assert_eq!(h.step(&[]).evicted, vec![a]);
        assert!(h.registry.is_empty());
        // the persisted face outlives its in-memory identity
        assert!(h.repo.face(&a).unwrap().is_some());
    }

    struct FailingRepository;

    impl FaceRepository for FailingRepository {
        fn create_identity(&mut self, _: &Observation<'_>) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk full".into()))
        }

        fn update_identity(&mut self, _: &Observation<'_>) -> Result<UpdateOutcome, StoreError> {
            Err(StoreError::Backend("disk full".into()))
        }

        fn face(&self, _: &FaceId) -> Result<Option<FaceRecord>, StoreError> {
            Ok(None)
        }

        fn faces(&self) -> Result<Vec<FaceRecord>, StoreError> {
            Ok(Vec::new())
        }

        fn detections(&self, _: &FaceId) -> Result<Vec<DetectionRecord>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_failed_create_leaves_registry_empty() {
        let config = TrackerConfig::default();
        let processor = FrameProcessor::new(&config);
        let mut registry = IdentityRegistry::from_config(&config);
        let result = processor.process(
            &mut registry,
            &mut FailingRepository,
            &frame(0),
            &[det(10.0, 10.0, 50.0, 50.0, 0.8)],
            at(0),
        );
        assert!(matches!(result, Err(TrackingError::StorageFailure(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_failed_update_keeps_previous_estimate() {
        let mut h = Harness::new(TrackerConfig::default());
        let a = h.step(&[det(10.0, 10.0, 50.0, 50.0, 0.8)]).faces[0].face_id;
        let before = h.registry.get(&a).unwrap().estimator().current_box();

        let result = h.processor.process(
            &mut h.registry,
            &mut FailingRepository,
            &frame(1),
            &[det(14.0, 12.0, 50.0, 50.0, 0.9)],
            at(1),
        );

        assert!(matches!(result, Err(TrackingError::StorageFailure(_))));
        assert_eq!(h.registry.get(&a).unwrap().estimator().current_box(), before);
        assert_eq!(h.repo.detections(&a).unwrap().len(), 1);
    }
}
