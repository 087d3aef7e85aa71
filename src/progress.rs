use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;

/// Progress reporting for one pass over the video frames
pub struct VideoProgressTracker {
    progress_bar: ProgressBar,
    start_time: Instant,
    total_frames: Option<u64>,
    processed_frames: u64,
}

impl VideoProgressTracker {
    /// Bar with a known length when the frame count is known, a spinner otherwise
    pub fn new(total_frames: Option<u64>, pass_name: &str) -> Self {
        let progress_bar = match total_frames {
            Some(total) => {
                let bar = ProgressBar::new(total);
                let style = ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({percent}%) | {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-");
                bar.set_style(style);
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                let style = ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {pos} frames | {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner());
                bar.set_style(style);
                bar
            }
        };
        progress_bar.set_message(pass_name.to_string());

        Self {
            progress_bar,
            start_time: Instant::now(),
            total_frames,
            processed_frames: 0,
        }
    }

    pub fn update_frame(&mut self) {
        self.processed_frames += 1;
        self.progress_bar.inc(1);
        let msg = self.progress_message();
        self.progress_bar.set_message(msg);
    }

    fn fps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.processed_frames as f64 / elapsed
        } else {
            0.0
        }
    }

    fn progress_message(&self) -> String {
        let fps = self.fps();
        match self.total_frames {
            Some(total) => format!(
                "Speed: {:.1} fps | ETA: {}",
                fps,
                eta(total.saturating_sub(self.processed_frames), fps)
            ),
            None => format!("Speed: {:.1} fps", fps),
        }
    }

    pub fn finish(&self) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        self.progress_bar.finish_with_message(format!(
            "Completed {} frames in {} | Avg FPS: {:.1}",
            self.processed_frames,
            format_duration(elapsed),
            self.fps()
        ));
    }

    pub fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }

    pub fn processed_frames(&self) -> u64 {
        self.processed_frames
    }
}

fn eta(remaining_frames: u64, fps: f64) -> String {
    if fps > 0.0 {
        format_duration(remaining_frames as f64 / fps)
    } else {
        "Calculating...".to_string()
    }
}

/// Formats a duration in seconds as h:mm:ss, or m:ss under an hour
fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}
