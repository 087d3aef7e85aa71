use anyhow::{Context, Result};
use chrono::Local;
use courtside::cli::Args;
use courtside::config::AnalysisConfig;
use courtside::pipeline;
use courtside::render::FrameRenderer;
use courtside::{stats, video};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Creates a timestamped output directory and returns its path
fn create_output_dir() -> Result<PathBuf> {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let output_dir = PathBuf::from(format!("./runs/{}", timestamp));
    fs::create_dir_all(&output_dir)?;
    Ok(output_dir)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Args = argh::from_env();
    let config = AnalysisConfig::from_args(&args)?;

    let output_dir = create_output_dir()?;
    info!("Created output directory: {}", output_dir.display());

    let detections = video::run_detection_pass(&args, &config)?;
    let analysis = pipeline::analyze(
        &detections.players,
        &detections.balls,
        &detections.contexts,
        detections.court_keypoints.as_deref(),
        &config,
    )?;

    let stats_path = output_dir.join("player_stats.csv");
    stats::write_csv(&stats_path, &analysis.stats)
        .with_context(|| format!("Failed to write {}", stats_path.display()))?;
    info!("Player statistics saved to: {}", stats_path.display());

    let summary_path = output_dir.join("summary.json");
    let writer = BufWriter::new(File::create(&summary_path)?);
    serde_json::to_writer_pretty(writer, &analysis.summary())?;
    info!("Summary saved to: {}", summary_path.display());

    let renderer = FrameRenderer::new(args.font.as_deref().map(Path::new))?;
    video::run_render_pass(&args, &analysis, &renderer)?;
    info!("Annotated video written by the viewer");

    Ok(())
}
