use crate::cache::{DetectionCache, VideoDetections};
use crate::cli::Args;
use crate::config::{self, AnalysisConfig};
use crate::detection::{Detector, FrameContext};
use crate::detector::{FileKeypointLocator, KeypointLocator, YoloDetector, YoloKeypointLocator};
use crate::error::AnalysisError;
use crate::geometry::Point;
use crate::pipeline::MatchAnalysis;
use crate::progress::VideoProgressTracker;
use crate::render::FrameRenderer;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;
use usls::{DataLoader, Image, Viewer};

/// Raw per-frame output of the decoding pass
#[derive(Debug, Clone)]
pub struct DetectionPass {
    pub players: VideoDetections,
    pub balls: VideoDetections,
    pub contexts: Vec<FrameContext>,
    pub court_keypoints: Option<Vec<Point>>,
}

/// Detections of one model, either replayed from its cache or produced live
enum Stage<D> {
    Cached { path: PathBuf, detections: VideoDetections },
    Live { detector: D, detections: VideoDetections },
}

impl<D: Detector<Image>> Stage<D> {
    fn open<F>(cache: Option<&DetectionCache>, use_cached: bool, build: F) -> Result<Self>
    where
        F: FnOnce() -> Result<D>,
    {
        if let Some(cache) = cache {
            if let Some(detections) = cache.lookup(use_cached)? {
                return Ok(Stage::Cached {
                    path: cache.path().to_path_buf(),
                    detections,
                });
            }
        }
        Ok(Stage::Live {
            detector: build()?,
            detections: Vec::new(),
        })
    }

    fn is_live(&self) -> bool {
        matches!(self, Stage::Live { .. })
    }

    /// A cached stage only checks that it still covers `frame_idx`
    fn observe(&mut self, frame_idx: usize, frame: &Image) -> Result<()> {
        match self {
            Stage::Cached { path, detections } => {
                if frame_idx >= detections.len() {
                    return Err(AnalysisError::StaleCache {
                        path: path.clone(),
                        cached: detections.len(),
                    }
                    .into());
                }
            }
            Stage::Live { detector, detections } => {
                detections.push(detector.detect_frame(frame)?);
            }
        }
        Ok(())
    }

    /// Live detections are written to the cache so the next run can skip the model.
    /// A cache written from a longer run is cut to `frame_count`.
    fn finish(self, cache: Option<&DetectionCache>, frame_count: usize) -> Result<VideoDetections> {
        match self {
            Stage::Cached { mut detections, .. } => {
                detections.truncate(frame_count);
                Ok(detections)
            }
            Stage::Live { detections, .. } => {
                if let Some(cache) = cache {
                    cache.write(&detections)?;
                    info!("Saved {} frames of detections to {}", detections.len(), cache.path().display());
                }
                Ok(detections)
            }
        }
    }
}

fn open_data_loader(source: &str) -> Result<DataLoader> {
    let data_loader = DataLoader::new(source)
        .with_context(|| format!("Failed to open video {}", source))?
        .with_batch(1)
        .build()?;
    Ok(data_loader)
}

fn keypoint_locator(args: &Args) -> Result<Option<Box<dyn KeypointLocator<Image>>>> {
    if let Some(path) = &args.court_keypoints {
        return Ok(Some(Box::new(FileKeypointLocator::load(Path::new(path))?)));
    }
    if let Some(model_file) = &args.court_model {
        let config = config::build_keypoint_config(model_file, args)?;
        return Ok(Some(Box::new(YoloKeypointLocator::new(config)?)));
    }
    Ok(None)
}

/// Decodes the video once, running only the detectors whose cache missed.
/// Court keypoints are located on the first frame and frozen.
pub fn run_detection_pass(args: &Args, analysis_config: &AnalysisConfig) -> Result<DetectionPass> {
    let player_cache = args.player_cache.as_deref().map(DetectionCache::new);
    let ball_cache = args.ball_cache.as_deref().map(DetectionCache::new);

    let mut players = Stage::open(player_cache.as_ref(), args.read_cache, || {
        YoloDetector::players(config::build_player_config(args, &analysis_config.player_filter)?)
    })?;
    let mut balls = Stage::open(ball_cache.as_ref(), args.read_cache, || {
        YoloDetector::ball(config::build_ball_config(args, &analysis_config.ball_filter)?)
    })?;
    let mut locator = keypoint_locator(args)?;
    let mut court_keypoints: Option<Vec<Point>> = None;
    let mut contexts = Vec::new();

    info!(
        "Detection pass: players {}, ball {}",
        if players.is_live() { "live" } else { "cached" },
        if balls.is_live() { "live" } else { "cached" }
    );

    let data_loader = open_data_loader(&args.source)?;
    let mut progress = VideoProgressTracker::new(args.max_frames.map(|n| n as u64), "Detecting");
    'frames: for xs in &data_loader {
        for x in xs.iter() {
            if args.max_frames.is_some_and(|max| contexts.len() >= max) {
                break 'frames;
            }
            if contexts.is_empty() {
                if let Some(locator) = locator.as_mut() {
                    court_keypoints = Some(locator.locate_keypoints(x)?);
                }
            }
            let frame_idx = contexts.len();
            players.observe(frame_idx, x)?;
            balls.observe(frame_idx, x)?;
            contexts.push(FrameContext::new(x.width() as f32, x.height() as f32));
            progress.update_frame();
        }
    }
    progress.finish();
    info!("Decoded {} frames from {}", contexts.len(), args.source);

    let players = players.finish(player_cache.as_ref(), contexts.len())?;
    let balls = balls.finish(ball_cache.as_ref(), contexts.len())?;

    Ok(DetectionPass {
        players,
        balls,
        contexts,
        court_keypoints,
    })
}

/// Decodes the video a second time, drawing the analysis onto every analysed frame
pub fn run_render_pass(args: &Args, analysis: &MatchAnalysis, renderer: &FrameRenderer) -> Result<()> {
    let data_loader = open_data_loader(&args.source)?;
    let mut viewer = Viewer::default();
    let mut progress = VideoProgressTracker::new(Some(analysis.frame_count() as u64), "Rendering");
    let mut frame_idx = 0;

    'frames: for xs in &data_loader {
        if viewer.is_window_exist() && !viewer.is_window_open() {
            break;
        }
        if let Some(key) = viewer.wait_key(1) {
            if key == usls::Key::Escape {
                break;
            }
        }

        for x in xs.iter() {
            if frame_idx >= analysis.frame_count() {
                break 'frames;
            }
            let mut rgb = x.to_rgb8();
            renderer.render(&mut rgb, frame_idx, analysis);
            let img = Image::from(rgb);
            if !args.headless {
                viewer.imshow(&img)?;
            }
            viewer.write_video_frame(&img)?;
            progress.update_frame();
            frame_idx += 1;
        }
    }
    progress.finish();
    Ok(())
}
