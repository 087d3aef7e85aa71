//! Greedy IoU track-id assignment.
//!
//! Stands in for the tracker that ships with the object detector: boxes in the
//! current frame inherit the id of the best-overlapping box of the previous
//! frame with the same label, everything else gets a fresh id. A box that
//! disappears for a single frame comes back under a new id, which is the churn
//! the identity resolver has to cope with.

use crate::detection::{Detection, TrackId};
use crate::geometry::BoundingBox;

#[derive(Debug, Clone)]
pub struct IouTrackAssigner {
    min_iou: f32,
    next_id: TrackId,
    previous: Vec<(TrackId, String, BoundingBox)>,
}

impl IouTrackAssigner {
    pub fn new(min_iou: f32) -> Self {
        Self {
            min_iou,
            next_id: 1,
            previous: Vec::new(),
        }
    }

    /// Assigns track ids to one frame of detections, in frame order
    pub fn assign(&mut self, detections: &mut [Detection]) {
        let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
        for (det_idx, det) in detections.iter().enumerate() {
            for (prev_idx, (_, prev_label, prev_bbox)) in self.previous.iter().enumerate() {
                if *prev_label != det.label {
                    continue;
                }
                let iou = det.bbox.iou(prev_bbox);
                if iou >= self.min_iou {
                    pairs.push((iou, det_idx, prev_idx));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut det_taken = vec![false; detections.len()];
        let mut prev_taken = vec![false; self.previous.len()];
        for (_, det_idx, prev_idx) in pairs {
            if det_taken[det_idx] || prev_taken[prev_idx] {
                continue;
            }
            det_taken[det_idx] = true;
            prev_taken[prev_idx] = true;
            detections[det_idx].track_id = Some(self.previous[prev_idx].0);
        }

        for (det_idx, det) in detections.iter_mut().enumerate() {
            if !det_taken[det_idx] {
                det.track_id = Some(self.next_id);
                self.next_id += 1;
            }
        }

        self.previous = detections
            .iter()
            .filter_map(|d| d.track_id.map(|id| (id, d.label.clone(), d.bbox)))
            .collect();
    }
}

impl Default for IouTrackAssigner {
    fn default() -> Self {
        Self::new(0.3)
    }
}
