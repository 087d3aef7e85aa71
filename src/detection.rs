use crate::config::{BallFilterConfig, PlayerFilterConfig};
use crate::geometry::BoundingBox;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Detector-assigned track identifier; unstable across frames
pub type TrackId = u32;

/// A single candidate box returned by an object detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub label: String,
    pub confidence: f32,
    pub track_id: Option<TrackId>,
}

impl Detection {
    pub fn new(bbox: BoundingBox, label: &str, confidence: f32, track_id: Option<TrackId>) -> Self {
        Self {
            bbox,
            label: label.to_string(),
            confidence,
            track_id,
        }
    }
}

/// Dimensions of the frame a detection was made on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameContext {
    pub width: f32,
    pub height: f32,
}

impl FrameContext {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

impl Default for FrameContext {
    fn default() -> Self {
        Self::new(1920.0, 1080.0)
    }
}

/// Black-box object detector invoked once per decoded frame
pub trait Detector<F> {
    fn detect_frame(&mut self, frame: &F) -> Result<Vec<Detection>>;

    /// Runs the detector over every frame in order; the first failure aborts the run
    fn detect_frames(&mut self, frames: &[F]) -> Result<Vec<Vec<Detection>>> {
        frames.iter().map(|frame| self.detect_frame(frame)).collect()
    }
}

fn matches_label(labels: &[String], label: &str) -> bool {
    labels.is_empty() || labels.iter().any(|l| l == label)
}

/// Applies the per-class acceptance filters before any identity logic runs
#[derive(Debug, Clone)]
pub struct DetectionAdapter {
    player: PlayerFilterConfig,
    ball: BallFilterConfig,
}

impl DetectionAdapter {
    pub fn new(player: PlayerFilterConfig, ball: BallFilterConfig) -> Self {
        Self { player, ball }
    }

    /// Checks a player-class detection against every acceptance range
    pub fn accept_player(&self, detection: &Detection, frame: &FrameContext) -> bool {
        let f = &self.player;
        let bbox = &detection.bbox;
        let area = bbox.area();
        let aspect_ratio = bbox.aspect_ratio();

        matches_label(&f.labels, &detection.label)
            && detection.confidence >= f.min_confidence
            && area >= f.min_area
            && area <= f.max_area
            && bbox.height() >= f.min_height
            && bbox.width() <= f.max_width
            && aspect_ratio >= f.min_aspect_ratio
            && aspect_ratio <= f.max_aspect_ratio
            && bbox.center().y >= frame.height * f.min_center_y_ratio
    }

    /// Drops every player detection failing any acceptance criterion
    pub fn filter_players(&self, detections: &[Detection], frame: &FrameContext) -> Vec<Detection> {
        detections
            .iter()
            .filter(|d| self.accept_player(d, frame))
            .cloned()
            .collect()
    }

    /// Reduces the ball candidates of one frame to the single highest-confidence detection
    pub fn select_ball(&self, detections: &[Detection]) -> Option<Detection> {
        detections
            .iter()
            .filter(|d| {
                d.confidence >= self.ball.min_confidence && matches_label(&self.ball.labels, &d.label)
            })
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> DetectionAdapter {
        DetectionAdapter::new(PlayerFilterConfig::default(), BallFilterConfig::default())
    }

    fn person(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Detection {
        Detection::new(BoundingBox::new(x1, y1, x2, y2), "person", confidence, Some(1))
    }

    #[test]
    fn test_accepts_typical_player() {
        // 80 x 200 box low in the frame
        let det = person(900.0, 600.0, 980.0, 800.0, 0.8);
        assert!(adapter().accept_player(&det, &FrameContext::default()));
    }

    #[test]
    fn test_rejects_each_criterion() {
        let frame = FrameContext::default();
        let adapter = adapter();

        // low confidence
        assert!(!adapter.accept_player(&person(900.0, 600.0, 980.0, 800.0, 0.4), &frame));
        // too small: 40 x 100 = 4000
        assert!(!adapter.accept_player(&person(900.0, 600.0, 940.0, 700.0, 0.9), &frame));
        // too short
        assert!(!adapter.accept_player(&person(900.0, 600.0, 1000.0, 655.0, 0.9), &frame));
        // too wide and lying flat
        assert!(!adapter.accept_player(&person(600.0, 600.0, 900.0, 700.0, 0.9), &frame));
        // aspect ratio above 5: 30 x 200 = 6000 area, ratio 6.67
        assert!(!adapter.accept_player(&person(900.0, 600.0, 930.0, 800.0, 0.9), &frame));
        // in the stands: center y = 150 < 216
        assert!(!adapter.accept_player(&person(900.0, 50.0, 980.0, 250.0, 0.9), &frame));
        // wrong class
        let mut chair = person(900.0, 600.0, 980.0, 800.0, 0.9);
        chair.label = "chair".to_string();
        assert!(!adapter.accept_player(&chair, &frame));
    }

    #[test]
    fn test_filter_players_keeps_order() {
        let frame = FrameContext::default();
        let detections = vec![
            person(900.0, 600.0, 980.0, 800.0, 0.9),
            person(900.0, 600.0, 980.0, 800.0, 0.1),
            person(300.0, 500.0, 380.0, 700.0, 0.7),
        ];
        let kept = adapter().filter_players(&detections, &frame);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.7);
    }

    #[test]
    fn test_select_ball_highest_confidence() {
        let ball = |confidence: f32| {
            Detection::new(BoundingBox::new(10.0, 10.0, 20.0, 20.0), "tennis ball", confidence, None)
        };
        let adapter = adapter();
        assert_eq!(adapter.select_ball(&[]), None);
        assert_eq!(adapter.select_ball(&[ball(0.1)]), None);
        let selected = adapter.select_ball(&[ball(0.3), ball(0.9), ball(0.5)]).unwrap();
        assert_eq!(selected.confidence, 0.9);
    }

    /// Detector over frame numbers that fails on one frame
    struct ScriptedDetector {
        calls: usize,
        fail_on: usize,
    }

    impl Detector<usize> for ScriptedDetector {
        fn detect_frame(&mut self, frame: &usize) -> Result<Vec<Detection>> {
            self.calls += 1;
            if *frame == self.fail_on {
                anyhow::bail!("model failure on frame {}", frame);
            }
            Ok(vec![person(900.0, 600.0, 980.0, 800.0, 0.9)])
        }
    }

    #[test]
    fn test_detect_frames_fails_fast() {
        let mut detector = ScriptedDetector { calls: 0, fail_on: 2 };
        assert!(detector.detect_frames(&[0, 1, 2, 3, 4]).is_err());
        assert_eq!(detector.calls, 3);

        let mut detector = ScriptedDetector { calls: 0, fail_on: 99 };
        let all = detector.detect_frames(&[0, 1, 2]).unwrap();
        assert_eq!(all.len(), 3);
    }
}
