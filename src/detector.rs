use crate::config::COURT_KEYPOINT_COUNT;
use crate::detection::{Detection, Detector};
use crate::geometry::{BoundingBox, Point};
use crate::tracking::IouTrackAssigner;
use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use usls::{Config, Image, Y, models::YOLO};

/// Converts the horizontal boxes of one model output into detections
pub fn detections_from_y(y: &Y) -> Vec<Detection> {
    let Some(hbbs) = y.hbbs() else {
        return Vec::new();
    };
    hbbs.iter()
        .map(|hbb| {
            Detection::new(
                BoundingBox::new(hbb.xmin(), hbb.ymin(), hbb.xmax(), hbb.ymax()),
                hbb.name().unwrap_or_default(),
                hbb.confidence().unwrap_or(0.0),
                None,
            )
        })
        .collect()
}

/// A YOLO model run one frame at a time
pub struct YoloDetector {
    model: YOLO,
    tracker: Option<IouTrackAssigner>,
}

impl YoloDetector {
    /// Player detector; boxes get track ids from frame-to-frame IoU matching
    pub fn players(config: Config) -> Result<Self> {
        let model = YOLO::new(config.commit()?)?;
        Ok(Self {
            model,
            tracker: Some(IouTrackAssigner::default()),
        })
    }

    /// Ball detector; the ball is never tracked by id
    pub fn ball(config: Config) -> Result<Self> {
        let model = YOLO::new(config.commit()?)?;
        Ok(Self { model, tracker: None })
    }
}

impl Detector<Image> for YoloDetector {
    fn detect_frame(&mut self, frame: &Image) -> Result<Vec<Detection>> {
        let ys = self.model.forward(std::slice::from_ref(frame))?;
        let mut detections = ys.first().map(detections_from_y).unwrap_or_default();
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.assign(&mut detections);
        }
        debug!("{} detections", detections.len());
        Ok(detections)
    }
}

/// Locates the ordered court keypoints on a single frame
pub trait KeypointLocator<F> {
    fn locate_keypoints(&mut self, frame: &F) -> Result<Vec<Point>>;
}

/// Court keypoints read from a JSON array of `[x, y]` pairs
#[derive(Debug, Clone, PartialEq)]
pub struct FileKeypointLocator {
    keypoints: Vec<Point>,
}

impl FileKeypointLocator {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read court keypoints from {}", path.display()))?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let pairs: Vec<[f32; 2]> = serde_json::from_str(json).context("Court keypoints must be [x, y] pairs")?;
        if pairs.len() != COURT_KEYPOINT_COUNT {
            bail!(
                "expected {} court keypoints, found {}",
                COURT_KEYPOINT_COUNT,
                pairs.len()
            );
        }
        Ok(Self {
            keypoints: pairs.into_iter().map(|[x, y]| Point::new(x, y)).collect(),
        })
    }
}

impl<F> KeypointLocator<F> for FileKeypointLocator {
    fn locate_keypoints(&mut self, _frame: &F) -> Result<Vec<Point>> {
        Ok(self.keypoints.clone())
    }
}

/// Court keypoints from a YOLO pose model trained on the 14 court points
pub struct YoloKeypointLocator {
    model: YOLO,
}

impl YoloKeypointLocator {
    pub fn new(config: Config) -> Result<Self> {
        let model = YOLO::new(config.commit()?)?;
        Ok(Self { model })
    }
}

impl KeypointLocator<Image> for YoloKeypointLocator {
    fn locate_keypoints(&mut self, frame: &Image) -> Result<Vec<Point>> {
        let ys = self.model.forward(std::slice::from_ref(frame))?;
        let keypoints: Vec<Point> = ys
            .first()
            .and_then(|y| y.keypointss())
            .and_then(|instances| instances.first())
            .map(|kpts| kpts.iter().map(|kp| Point::new(kp.x(), kp.y())).collect())
            .unwrap_or_default();
        if keypoints.len() != COURT_KEYPOINT_COUNT {
            bail!(
                "court keypoint model returned {} points, expected {}",
                keypoints.len(),
                COURT_KEYPOINT_COUNT
            );
        }
        info!("Located {} court keypoints", keypoints.len());
        Ok(keypoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypoints_json(n: usize) -> String {
        let pairs: Vec<[f32; 2]> = (0..n).map(|i| [i as f32 * 10.0, i as f32 * 5.0]).collect();
        serde_json::to_string(&pairs).unwrap()
    }

    #[test]
    fn test_file_keypoints_from_json() {
        let mut locator = FileKeypointLocator::from_json(&keypoints_json(14)).unwrap();
        let keypoints = KeypointLocator::<()>::locate_keypoints(&mut locator, &()).unwrap();
        assert_eq!(keypoints.len(), 14);
        assert_eq!(keypoints[3], Point::new(30.0, 15.0));
    }

    #[test]
    fn test_file_keypoints_wrong_count() {
        assert!(FileKeypointLocator::from_json(&keypoints_json(12)).is_err());
        assert!(FileKeypointLocator::from_json("{\"x\": 1}").is_err());
    }

    #[test]
    fn test_file_keypoints_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("court.json");
        fs::write(&path, keypoints_json(14)).unwrap();
        assert!(FileKeypointLocator::load(&path).is_ok());
        assert!(FileKeypointLocator::load(&dir.path().join("missing.json")).is_err());
    }
}
