use crate::ball::{self, BallFrameRecord};
use crate::config::AnalysisConfig;
use crate::court::CourtProjection;
use crate::detection::{Detection, DetectionAdapter, FrameContext, TrackId};
use crate::error::AnalysisError;
use crate::geometry::Point;
use crate::resolver::{CanonicalPlayerId, PlayerFrameRecord, PlayerIdentityResolver};
use crate::stats::{self, CourtFrame, PlayerStatRecord, SpeedCalibration};
use serde::Serialize;
use tracing::{info, warn};

/// Everything derived from one video's detections
#[derive(Debug, Clone)]
pub struct MatchAnalysis {
    /// Track ids chosen for each canonical player after the initialization window
    pub chosen_players: Vec<(CanonicalPlayerId, TrackId)>,
    pub players: Vec<PlayerFrameRecord>,
    /// Accepted ball boxes before interpolation
    pub raw_ball: Vec<BallFrameRecord>,
    pub ball: Vec<BallFrameRecord>,
    pub ball_detection_rate: f32,
    pub shot_frames: Vec<usize>,
    /// Absent when no court keypoints were available
    pub court: Option<CourtProjection>,
    pub court_frames: Vec<CourtFrame>,
    /// One record per frame
    pub stats: Vec<PlayerStatRecord>,
}

impl MatchAnalysis {
    pub fn frame_count(&self) -> usize {
        self.players.len()
    }

    pub fn summary(&self) -> MatchSummary {
        MatchSummary {
            frames: self.frame_count(),
            chosen_players: self
                .chosen_players
                .iter()
                .map(|(id, track_id)| ChosenPlayer {
                    player: id.to_string(),
                    track_id: *track_id,
                })
                .collect(),
            shot_frames: self.shot_frames.clone(),
            ball_detection_rate: self.ball_detection_rate,
            court_keypoints: self
                .court
                .as_ref()
                .map(|c| c.keypoints().iter().map(|p| [p.x, p.y]).collect())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChosenPlayer {
    pub player: String,
    pub track_id: TrackId,
}

/// Contents of `summary.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchSummary {
    pub frames: usize,
    pub chosen_players: Vec<ChosenPlayer>,
    pub shot_frames: Vec<usize>,
    pub ball_detection_rate: f32,
    pub court_keypoints: Vec<[f32; 2]>,
}

/// Runs the batch analysis over the raw detector output of a whole video.
///
/// Stages run strictly one after another, each over every frame: acceptance
/// filters, player identity resolution, ball trajectory and shots, court
/// projection, statistics.
pub fn analyze(
    player_detections: &[Vec<Detection>],
    ball_detections: &[Vec<Detection>],
    contexts: &[FrameContext],
    court_keypoints: Option<&[Point]>,
    config: &AnalysisConfig,
) -> Result<MatchAnalysis, AnalysisError> {
    if player_detections.len() != ball_detections.len() {
        return Err(AnalysisError::FrameCountMismatch {
            players: player_detections.len(),
            balls: ball_detections.len(),
        });
    }
    let frame_count = player_detections.len();
    let context = |i: usize| contexts.get(i).copied().unwrap_or_default();

    let adapter = DetectionAdapter::new(config.player_filter.clone(), config.ball_filter.clone());
    let players: Vec<Vec<Detection>> = player_detections
        .iter()
        .enumerate()
        .map(|(i, dets)| adapter.filter_players(dets, &context(i)))
        .collect();

    let mut resolver = PlayerIdentityResolver::initialize(&players, contexts, &config.resolver);
    let chosen_players = resolver.assignments();
    if chosen_players.len() < 2 {
        warn!("Only {} player(s) found in the first frames", chosen_players.len());
    }
    let player_records = resolver.track_all(&players);

    let raw_ball: Vec<BallFrameRecord> = ball_detections
        .iter()
        .map(|dets| adapter.select_ball(dets).map(|d| d.bbox))
        .collect();
    let ball_detection_rate = ball::detection_rate(&raw_ball);
    info!("Ball detection rate: {:.1}%", ball_detection_rate * 100.0);
    let ball_track = ball::interpolate_ball_positions(&raw_ball);
    let shot_frames = ball::detect_shot_frames(&ball_track, &config.shots);
    info!("Detected {} shots: {:?}", shot_frames.len(), shot_frames);

    let court = match court_keypoints {
        Some(keypoints) => Some(CourtProjection::new(
            keypoints.to_vec(),
            context(0).width,
            &config.mini_court,
        )?),
        None => {
            warn!("No court keypoints, skipping court projection and speed statistics");
            None
        }
    };

    let (court_frames, stats) = match &court {
        Some(projection) => {
            let court_frames: Vec<CourtFrame> = player_records
                .iter()
                .zip(&ball_track)
                .map(|(record, ball)| {
                    let mut frame = CourtFrame {
                        ball: ball.map(|b| projection.to_mini_court(b.center())),
                        ..Default::default()
                    };
                    for (id, bbox) in record.iter() {
                        frame.players[id.index()] = Some(projection.to_mini_court(bbox.foot_position()));
                    }
                    frame
                })
                .collect();
            let calibration = SpeedCalibration {
                mini_court_width: projection.mini_court().court_width(),
                assumed_fps: config.speed.assumed_fps,
            };
            let records = stats::compute_shot_records(&shot_frames, &court_frames, calibration);
            (court_frames, stats::per_frame_records(&records, frame_count))
        }
        None => (
            vec![CourtFrame::default(); frame_count],
            stats::per_frame_records(&[PlayerStatRecord::default()], frame_count),
        ),
    };

    Ok(MatchAnalysis {
        chosen_players,
        players: player_records,
        raw_ball,
        ball: ball_track,
        ball_detection_rate,
        shot_frames,
        court,
        court_frames,
        stats,
    })
}
