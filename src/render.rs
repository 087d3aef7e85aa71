use crate::court::{COURT_LINES, MiniCourt};
use crate::geometry::{BoundingBox, Point};
use crate::pipeline::MatchAnalysis;
use crate::stats::PlayerStatRecord;
use crate::resolver::CanonicalPlayerId;
use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::fs;
use std::path::Path;

const PLAYER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BALL_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const KEYPOINT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const LINE_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const NET_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const MINI_PLAYER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Blends a solid color over a rectangle, clipped to the image
pub fn blend_rect(image: &mut RgbImage, x1: f32, y1: f32, x2: f32, y2: f32, color: Rgb<u8>, alpha: f32) {
    let x_start = x1.max(0.0) as u32;
    let y_start = y1.max(0.0) as u32;
    let x_end = (x2.max(0.0) as u32).min(image.width());
    let y_end = (y2.max(0.0) as u32).min(image.height());
    for y in y_start..y_end {
        for x in x_start..x_end {
            let pixel = image.get_pixel_mut(x, y);
            for c in 0..3 {
                pixel.0[c] = (pixel.0[c] as f32 * (1.0 - alpha) + color.0[c] as f32 * alpha).round() as u8;
            }
        }
    }
}

fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    let x = bbox.x1.max(0.0) as i32;
    let y = bbox.y1.max(0.0) as i32;
    let width = bbox.width().min(image.width() as f32 - x as f32) as u32;
    let height = bbox.height().min(image.height() as f32 - y as f32) as u32;
    if width > 0 && height > 0 {
        draw_hollow_rect_mut(image, Rect::at(x, y).of_size(width, height), color);
        if width > 2 && height > 2 {
            draw_hollow_rect_mut(image, Rect::at(x + 1, y + 1).of_size(width - 2, height - 2), color);
        }
    }
}

fn draw_dot(image: &mut RgbImage, point: Point, radius: i32, color: Rgb<u8>) {
    draw_filled_circle_mut(image, (point.x as i32, point.y as i32), radius, color);
}

/// Draws the analysis results onto the frames of the output video
pub struct FrameRenderer {
    font: Option<FontArc>,
    scale: PxScale,
}

impl FrameRenderer {
    /// Text is only drawn when a font is given
    pub fn new(font_path: Option<&Path>) -> Result<Self> {
        let font = match font_path {
            Some(path) => {
                let data = fs::read(path).with_context(|| format!("Failed to read font {}", path.display()))?;
                Some(FontArc::try_from_vec(data).with_context(|| format!("Invalid font {}", path.display()))?)
            }
            None => None,
        };
        Ok(Self {
            font,
            scale: PxScale::from(24.0),
        })
    }

    fn text(&self, image: &mut RgbImage, color: Rgb<u8>, x: f32, y: f32, text: &str) {
        if let Some(font) = &self.font {
            draw_text_mut(image, color, x as i32, y as i32, self.scale, font, text);
        }
    }

    /// Annotates one frame in place
    pub fn render(&self, image: &mut RgbImage, frame_idx: usize, analysis: &MatchAnalysis) {
        if let Some(record) = analysis.players.get(frame_idx) {
            for (id, bbox) in record.iter() {
                draw_box(image, bbox, PLAYER_COLOR);
                self.text(image, PLAYER_COLOR, bbox.x1, (bbox.y1 - 28.0).max(0.0), &id.to_string());
            }
        }
        if let Some(Some(ball)) = analysis.ball.get(frame_idx) {
            draw_box(image, ball, BALL_COLOR);
            self.text(image, BALL_COLOR, ball.x1, (ball.y1 - 28.0).max(0.0), "Ball");
        }

        if let Some(court) = &analysis.court {
            for (i, keypoint) in court.keypoints().iter().enumerate() {
                draw_dot(image, *keypoint, 5, KEYPOINT_COLOR);
                self.text(image, KEYPOINT_COLOR, keypoint.x, keypoint.y - 30.0, &i.to_string());
            }
            self.draw_mini_court(image, court.mini_court());
            if let Some(frame) = analysis.court_frames.get(frame_idx) {
                for position in frame.players.iter().flatten() {
                    draw_dot(image, *position, 5, MINI_PLAYER_COLOR);
                }
                if let Some(ball) = frame.ball {
                    draw_dot(image, ball, 5, BALL_COLOR);
                }
            }
        }

        if let Some(stats) = analysis.stats.get(frame_idx) {
            self.draw_stats_panel(image, stats);
        }
        self.text(image, WHITE, 10.0, 30.0, &format!("Frame: {}", frame_idx));
    }

    fn draw_mini_court(&self, image: &mut RgbImage, mini: &MiniCourt) {
        blend_rect(image, mini.start_x, mini.start_y, mini.end_x, mini.end_y, WHITE, 0.5);

        let keypoints = mini.keypoints();
        for &(a, b) in COURT_LINES.iter() {
            let (p, q) = (keypoints[a], keypoints[b]);
            draw_line_segment_mut(image, (p.x, p.y), (q.x, q.y), LINE_COLOR);
        }
        let (left, right) = mini.net();
        draw_line_segment_mut(image, (left.x, left.y), (right.x, right.y), NET_COLOR);
        for keypoint in keypoints {
            draw_dot(image, keypoint, 3, KEYPOINT_COLOR);
        }
    }

    fn draw_stats_panel(&self, image: &mut RgbImage, record: &PlayerStatRecord) {
        if self.font.is_none() {
            return;
        }
        let (width, height) = (350.0, 230.0);
        let x = image.width() as f32 - 400.0;
        let y = image.height() as f32 - 500.0;
        blend_rect(image, x, y, x + width, y + height, BLACK, 0.5);

        self.text(image, WHITE, x + 120.0, y + 10.0, "Player 1     Player 2");
        let [p1, p2] = CanonicalPlayerId::ALL.map(|id| *record.player(id));
        let rows = [
            ("Shot Speed", p1.last_shot_speed, p2.last_shot_speed),
            ("Player Speed", p1.last_movement_speed, p2.last_movement_speed),
            ("avg. S. Speed", p1.average_shot_speed(), p2.average_shot_speed()),
            ("avg. P. Speed", p1.average_movement_speed(), p2.average_movement_speed()),
        ];
        for (i, (label, a, b)) in rows.iter().enumerate() {
            let row_y = y + 60.0 + i as f32 * 40.0;
            self.text(image, WHITE, x + 10.0, row_y, label);
            self.text(image, WHITE, x + 150.0, row_y, &format!("{:.1} km/h    {:.1} km/h", a, b));
        }
        self.text(
            image,
            WHITE,
            x + 10.0,
            y + height - 20.0,
            &format!("Shots: {} - {}", p1.shots, p2.shots),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::court::canonical_keypoints;
    use crate::detection::{Detection, FrameContext};
    use crate::pipeline::analyze;

    fn analysis() -> MatchAnalysis {
        let players: Vec<Vec<Detection>> = (0..3)
            .map(|_| {
                vec![
                    Detection::new(BoundingBox::new(500.0, 600.0, 600.0, 800.0), "person", 0.9, Some(1)),
                    Detection::new(BoundingBox::new(900.0, 200.0, 1000.0, 400.0), "person", 0.9, Some(2)),
                ]
            })
            .collect();
        let balls: Vec<Vec<Detection>> = (0..3)
            .map(|_| vec![Detection::new(BoundingBox::new(700.0, 500.0, 712.0, 512.0), "tennis ball", 0.5, None)])
            .collect();
        let keypoints: Vec<Point> = canonical_keypoints()
            .iter()
            .map(|c| Point::new(400.0 + c.x * 100.0, 100.0 + c.y * 35.0))
            .collect();
        analyze(
            &players,
            &balls,
            &[FrameContext::default(); 3],
            Some(&keypoints),
            &AnalysisConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_blend_rect_clips_to_image() {
        let mut image = RgbImage::new(10, 10);
        blend_rect(&mut image, -5.0, -5.0, 4.0, 20.0, WHITE, 0.5);
        assert_eq!(image.get_pixel(0, 0), &Rgb([128, 128, 128]));
        assert_eq!(image.get_pixel(3, 9), &Rgb([128, 128, 128]));
        assert_eq!(image.get_pixel(4, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_render_without_font() {
        let analysis = analysis();
        let renderer = FrameRenderer::new(None).unwrap();
        let mut image = RgbImage::new(1920, 1080);
        renderer.render(&mut image, 1, &analysis);

        // Player box outline
        assert_eq!(image.get_pixel(500, 700), &PLAYER_COLOR);
        // Ball box outline
        assert_eq!(image.get_pixel(700, 505), &BALL_COLOR);
        // Mini-court panel background, away from lines and dots
        let mini = analysis.court.as_ref().unwrap().mini_court();
        let inside = image.get_pixel(mini.start_x as u32 + 5, mini.start_y as u32 + 5);
        assert_eq!(inside, &Rgb([128, 128, 128]));
    }

    #[test]
    fn test_render_past_last_frame_is_noop_for_tracks() {
        let analysis = analysis();
        let renderer = FrameRenderer::new(None).unwrap();
        let mut image = RgbImage::new(1920, 1080);
        renderer.render(&mut image, 99, &analysis);
        assert_eq!(image.get_pixel(500, 700), &BLACK);
    }

    #[test]
    fn test_missing_font_is_an_error() {
        assert!(FrameRenderer::new(Some(Path::new("/nonexistent/font.ttf"))).is_err());
    }
}
