use crate::cli::Args;
use crate::error::AnalysisError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use usls::{Config, NAMES_COCO_80};

/// Number of keypoints produced by the court keypoint model
pub const COURT_KEYPOINT_COUNT: usize = 14;

/// Acceptance ranges for player-class detections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerFilterConfig {
    pub min_confidence: f32,
    pub min_area: f32,
    pub max_area: f32,
    pub min_height: f32,
    pub max_width: f32,
    /// Height over width
    pub min_aspect_ratio: f32,
    pub max_aspect_ratio: f32,
    /// Box centers above this fraction of the frame height are dropped
    pub min_center_y_ratio: f32,
    /// Detector labels treated as players
    pub labels: Vec<String>,
}

impl Default for PlayerFilterConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            min_area: 5_000.0,
            max_area: 150_000.0,
            min_height: 60.0,
            max_width: 250.0,
            min_aspect_ratio: 1.0,
            max_aspect_ratio: 5.0,
            min_center_y_ratio: 0.2,
            labels: vec!["person".to_string()],
        }
    }
}

/// Acceptance ranges for ball-class detections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BallFilterConfig {
    pub min_confidence: f32,
    /// Empty accepts every label the ball model emits
    pub labels: Vec<String>,
}

impl Default for BallFilterConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.15,
            labels: Vec::new(),
        }
    }
}

/// Player identity resolution thresholds and scoring weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Frames observed before the two players are chosen (K)
    pub init_window: usize,
    /// Largest center displacement accepted when re-binding a player
    pub max_displacement: f32,
    pub central_band_min: f32,
    pub central_band_max: f32,
    pub centrality_bonus: f32,
    /// Fraction of the frame height occupied by the stands
    pub stands_ratio: f32,
    pub verticality_bonus: f32,
    pub substantial_area: f32,
    pub size_bonus: f32,
    pub movement_bonus_cap: f32,
    pub movement_variance_divisor: f32,
    /// When set, only the best `n` candidates of each frame count towards the window
    pub frame_shortlist: Option<usize>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            init_window: 10,
            max_displacement: 300.0,
            central_band_min: 0.2,
            central_band_max: 0.8,
            centrality_bonus: 3.0,
            stands_ratio: 0.2,
            verticality_bonus: 2.0,
            substantial_area: 15_000.0,
            size_bonus: 2.0,
            movement_bonus_cap: 5.0,
            movement_variance_divisor: 1_000.0,
            frame_shortlist: None,
        }
    }
}

/// Shot detection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShotConfig {
    pub rolling_window: usize,
    pub lookback: usize,
    pub lookahead: usize,
    /// Minimum frames between two shots, about one second of play
    pub min_spacing: usize,
}

impl Default for ShotConfig {
    fn default() -> Self {
        Self {
            rolling_window: 5,
            lookback: 1,
            lookahead: 1,
            min_spacing: 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    /// Frame rate used to turn frame gaps into seconds, independent of the source video
    pub assumed_fps: f32,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self { assumed_fps: 24.0 }
    }
}

/// Rendered mini-court footprint, anchored to the top-right corner of the frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiniCourtConfig {
    pub rect_width: f32,
    pub rect_height: f32,
    pub buffer: f32,
    pub padding: f32,
}

impl Default for MiniCourtConfig {
    fn default() -> Self {
        Self {
            rect_width: 250.0,
            rect_height: 500.0,
            buffer: 50.0,
            padding: 20.0,
        }
    }
}

/// Every tunable threshold of the analysis
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub player_filter: PlayerFilterConfig,
    pub ball_filter: BallFilterConfig,
    pub resolver: ResolverConfig,
    pub shots: ShotConfig,
    pub speed: SpeedConfig,
    pub mini_court: MiniCourtConfig,
}

impl AnalysisConfig {
    /// Loads a configuration from a JSON file; missing fields keep their defaults
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            AnalysisError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: AnalysisConfig = serde_json::from_str(&contents).map_err(|e| {
            AnalysisError::InvalidConfig(format!("cannot parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Builds the configuration from the optional config file and command line overrides
    pub fn from_args(args: &Args) -> Result<Self, AnalysisError> {
        let mut config = match &args.config {
            Some(path) => Self::load(Path::new(path))?,
            None => Self::default(),
        };
        if let Some(init_window) = args.init_window {
            config.resolver.init_window = init_window;
        }
        if let Some(max_displacement) = args.max_displacement {
            config.resolver.max_displacement = max_displacement;
        }
        if let Some(assumed_fps) = args.assumed_fps {
            config.speed.assumed_fps = assumed_fps;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        let invalid = |msg: &str| Err(AnalysisError::InvalidConfig(msg.to_string()));

        let pf = &self.player_filter;
        if pf.min_area > pf.max_area {
            return invalid("player_filter.min_area exceeds max_area");
        }
        if pf.min_aspect_ratio > pf.max_aspect_ratio {
            return invalid("player_filter.min_aspect_ratio exceeds max_aspect_ratio");
        }
        if self.resolver.init_window == 0 {
            return invalid("resolver.init_window must be at least 1");
        }
        if self.resolver.max_displacement <= 0.0 {
            return invalid("resolver.max_displacement must be positive");
        }
        if self.resolver.central_band_min >= self.resolver.central_band_max {
            return invalid("resolver central band is empty");
        }
        if self.shots.rolling_window == 0 {
            return invalid("shots.rolling_window must be at least 1");
        }
        if self.speed.assumed_fps <= 0.0 {
            return invalid("speed.assumed_fps must be positive");
        }
        if self.mini_court.rect_width <= 2.0 * self.mini_court.padding {
            return invalid("mini_court.rect_width must exceed twice the padding");
        }
        Ok(())
    }
}

fn base_config(model_file: &str, args: &Args) -> Result<Config> {
    let config = Config::yolo()
        .with_model_file(model_file)
        .with_version(args.ver.try_into()?)
        .with_model_dtype(args.dtype.parse()?)
        .with_model_device(args.device.parse()?)
        .with_model_num_dry_run(2);
    Ok(config)
}

/// Builds the YOLO configuration of the player (COCO person) detector
pub fn build_player_config(args: &Args, filter: &PlayerFilterConfig) -> Result<Config> {
    let config = base_config(&args.player_model, args)?
        .with_task("det".parse()?)
        .with_class_names(&NAMES_COCO_80)
        // The acceptance filter applies the real threshold; keep weaker boxes for the tracker
        .with_class_confs(&[filter.min_confidence.min(0.25)]);
    Ok(config)
}

/// Builds the YOLO configuration of the single-class ball detector
pub fn build_ball_config(args: &Args, filter: &BallFilterConfig) -> Result<Config> {
    let config = base_config(&args.ball_model, args)?
        .with_task("det".parse()?)
        .with_nc(1)
        .with_class_names(&["tennis ball"])
        .with_class_confs(&[filter.min_confidence]);
    Ok(config)
}

/// Builds the YOLO pose configuration of the court keypoint model
pub fn build_keypoint_config(model_file: &str, args: &Args) -> Result<Config> {
    let config = base_config(model_file, args)?
        .with_task("pose".parse()?)
        .with_nc(1)
        .with_nk(COURT_KEYPOINT_COUNT)
        .with_class_confs(&[0.25])
        .with_keypoint_confs(&[0.0]);
    Ok(config)
}
