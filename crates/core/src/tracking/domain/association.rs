use std::collections::HashSet;

use crate::shared::bounding_box::BoundingBox;
use crate::shared::face_id::FaceId;
use crate::tracking::domain::tracker_config::MatchPolicy;

/// Where a live identity is expected to be in the current frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prediction {
    pub face_id: FaceId,
    pub bbox: BoundingBox,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchResult {
    Matched(FaceId),
    Unmatched,
}

/// Greedy IoU association of one frame's detections against predictions.
///
/// Each detection takes the prediction with the highest IoU strictly above
/// the threshold; on equal IoU the earlier prediction wins. This is not a
/// global assignment: under [`MatchPolicy::PerDetection`] two detections
/// may resolve to the same identity.
pub struct Associator {
    threshold: f64,
    policy: MatchPolicy,
}

impl Associator {
    pub fn new(threshold: f64, policy: MatchPolicy) -> Self {
        Self { threshold, policy }
    }

    /// One result per detection, in detection order.
    pub fn associate(
        &self,
        detections: &[BoundingBox],
        predictions: &[Prediction],
    ) -> Vec<MatchResult> {
        let mut claimed: HashSet<FaceId> = HashSet::new();

        detections
            .iter()
            .map(|det| {
                let best = self.best_match(det, predictions, &claimed);
                match best {
                    Some(face_id) => {
                        if self.policy == MatchPolicy::Exclusive {
                            claimed.insert(face_id);
                        }
                        MatchResult::Matched(face_id)
                    }
                    None => MatchResult::Unmatched,
                }
            })
            .collect()
    }

    fn best_match(
        &self,
        det: &BoundingBox,
        predictions: &[Prediction],
        claimed: &HashSet<FaceId>,
    ) -> Option<FaceId> {
        let mut best_iou = self.threshold;
        let mut best = None;
        for p in predictions {
            if claimed.contains(&p.face_id) {
                continue;
            }
            let iou = det.iou(&p.bbox);
            if iou > best_iou {
                best_iou = iou;
                best = Some(p.face_id);
            }
        }
        best
    }
}
