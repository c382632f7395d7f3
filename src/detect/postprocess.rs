//! Raw-output post-processing: class selection, domain filtering, box conversion and
//! non-maximum suppression.

use super::backend::RawCandidate;
use super::result::BoundingBox;

/// A candidate that passed the class and confidence filters.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Keep candidates whose best class is a target class scoring above
/// `confidence_threshold`, with boxes mapped onto the original frame.
pub fn select_candidates(
    raw: &[RawCandidate],
    target_classes: &[usize],
    confidence_threshold: f32,
    frame_width: u32,
    frame_height: u32,
) -> Vec<Candidate> {
    raw.iter()
        .filter_map(|candidate| {
            let (class_id, confidence) = candidate.best_class()?;
            if confidence <= confidence_threshold || !target_classes.contains(&class_id) {
                return None;
            }
            Some(Candidate {
                class_id,
                confidence,
                bbox: BoundingBox::from_normalized_center(
                    candidate.center_x,
                    candidate.center_y,
                    candidate.width,
                    candidate.height,
                    frame_width,
                    frame_height,
                ),
            })
        })
        .collect()
}

/// Greedy class-agnostic NMS.
///
/// Candidates at or below `score_threshold` are dropped. The rest are visited in
/// descending confidence; a candidate survives only if its IoU with every survivor
/// so far is at most `iou_threshold`. No two survivors overlap above the threshold.
pub fn non_max_suppression(
    mut candidates: Vec<Candidate>,
    score_threshold: f32,
    iou_threshold: f32,
) -> Vec<Candidate> {
    candidates.retain(|c| c.confidence > score_threshold);
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept = 0;
    for index in 0..candidates.len() {
        let suppressed = candidates[..kept]
            .iter()
            .any(|survivor| survivor.bbox.iou(&candidates[index].bbox) > iou_threshold);
        if !suppressed {
            candidates.swap(kept, index);
            kept += 1;
        }
    }
    candidates.truncate(kept);
    candidates
}
