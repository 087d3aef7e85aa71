use crate::config::MiniCourtConfig;
use crate::error::AnalysisError;
use crate::geometry::Point;
use nalgebra::{DMatrix, Matrix3, SymmetricEigen, Vector3};
use serde::{Deserialize, Serialize};

// Official court dimensions in meters
pub const SINGLE_LINE_WIDTH: f32 = 8.23;
pub const DOUBLE_LINE_WIDTH: f32 = 10.97;
pub const HALF_COURT_LINE_HEIGHT: f32 = 11.88;
pub const SERVICE_LINE_WIDTH: f32 = 6.4;
pub const DOUBLE_ALLEY_DIFFERENCE: f32 = 1.37;
pub const NO_MANS_LAND_HEIGHT: f32 = 5.48;
pub const COURT_LENGTH: f32 = 2.0 * HALF_COURT_LINE_HEIGHT;

/// Fewest correspondences that determine a homography
pub const MIN_KEYPOINTS: usize = 4;

/// Pairs of keypoint indices joined by a painted court line
pub const COURT_LINES: [(usize, usize); 9] = [
    (0, 2),
    (4, 5),
    (6, 7),
    (1, 3),
    (0, 1),
    (8, 9),
    (10, 11),
    (2, 3),
    (12, 13),
];

/// A position on the canonical court, in meters from the far-left doubles corner
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CourtCoordinate {
    pub x: f32,
    pub y: f32,
}

impl CourtCoordinate {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Canonical positions of the 14 court keypoints, in keypoint model order:
/// doubles corners, singles corners, service line ends, center service marks.
pub fn canonical_keypoints() -> [CourtCoordinate; 14] {
    let w = DOUBLE_LINE_WIDTH;
    let l = COURT_LENGTH;
    let alley = DOUBLE_ALLEY_DIFFERENCE;
    let service = NO_MANS_LAND_HEIGHT;
    [
        CourtCoordinate::new(0.0, 0.0),
        CourtCoordinate::new(w, 0.0),
        CourtCoordinate::new(0.0, l),
        CourtCoordinate::new(w, l),
        CourtCoordinate::new(alley, 0.0),
        CourtCoordinate::new(alley, l),
        CourtCoordinate::new(w - alley, 0.0),
        CourtCoordinate::new(w - alley, l),
        CourtCoordinate::new(alley, service),
        CourtCoordinate::new(w - alley, service),
        CourtCoordinate::new(alley, l - service),
        CourtCoordinate::new(w - alley, l - service),
        CourtCoordinate::new(w / 2.0, service),
        CourtCoordinate::new(w / 2.0, l - service),
    ]
}

/// Scales a mini-court pixel distance to meters.
///
/// The reference is the doubles width drawn on the mini court, never the
/// width of the source video.
pub fn pixel_distance_to_meters(pixel_distance: f32, mini_court_pixel_width: f32) -> f32 {
    pixel_distance * DOUBLE_LINE_WIDTH / mini_court_pixel_width
}

pub fn meters_to_pixel_distance(meters: f32, mini_court_pixel_width: f32) -> f32 {
    meters * mini_court_pixel_width / DOUBLE_LINE_WIDTH
}

/// Speed in km/h of a displacement between two frames, at an assumed frame rate
pub fn speed_kmh(meters: f32, frame_gap: usize, assumed_fps: f32) -> f32 {
    let seconds = frame_gap as f32 / assumed_fps;
    if seconds <= 0.0 {
        return 0.0;
    }
    meters / seconds * 3.6
}

/// Similarity transform moving the centroid to the origin with mean distance sqrt(2)
fn normalization(points: &[(f64, f64)]) -> Option<Matrix3<f64>> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.1).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist <= f64::EPSILON {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    Some(Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0))
}

fn apply(m: &Matrix3<f64>, p: (f64, f64)) -> (f64, f64) {
    let v = m * Vector3::new(p.0, p.1, 1.0);
    (v.x / v.z, v.y / v.z)
}

/// Estimates the homography mapping `src` onto `dst` with the normalized DLT
pub fn estimate_homography(src: &[Point], dst: &[CourtCoordinate]) -> Result<Matrix3<f64>, AnalysisError> {
    let n = src.len().min(dst.len());
    if n < MIN_KEYPOINTS {
        return Err(AnalysisError::InsufficientKeypoints {
            expected: MIN_KEYPOINTS,
            actual: n,
        });
    }

    let src: Vec<(f64, f64)> = src[..n].iter().map(|p| (p.x as f64, p.y as f64)).collect();
    let dst: Vec<(f64, f64)> = dst[..n].iter().map(|p| (p.x as f64, p.y as f64)).collect();
    let t_src = normalization(&src).ok_or(AnalysisError::DegenerateHomography)?;
    let t_dst = normalization(&dst).ok_or(AnalysisError::DegenerateHomography)?;

    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for i in 0..n {
        let (x, y) = apply(&t_src, src[i]);
        let (u, v) = apply(&t_dst, dst[i]);
        let r = 2 * i;
        a.row_mut(r).copy_from_slice(&[-x, -y, -1.0, 0.0, 0.0, 0.0, u * x, u * y, u]);
        a.row_mut(r + 1).copy_from_slice(&[0.0, 0.0, 0.0, -x, -y, -1.0, v * x, v * y, v]);
    }

    // Null vector of A is the eigenvector of A^T A with the smallest eigenvalue
    let ata = a.transpose() * &a;
    let eigen = SymmetricEigen::new(ata);
    let (min_idx, _) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .ok_or(AnalysisError::DegenerateHomography)?;
    let h = eigen.eigenvectors.column(min_idx);
    let normalized = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);
    // Unit-norm solution, so a vanishing determinant means the points were collinear
    if normalized.determinant().abs() < 1e-9 {
        return Err(AnalysisError::DegenerateHomography);
    }

    let t_dst_inv = t_dst.try_inverse().ok_or(AnalysisError::DegenerateHomography)?;
    let mut homography = t_dst_inv * normalized * t_src;
    let scale = homography[(2, 2)];
    if scale.abs() < 1e-12 {
        return Err(AnalysisError::DegenerateHomography);
    }
    homography /= scale;
    Ok(homography)
}

/// Rendered mini-court footprint: an `rect_width x rect_height` panel in the
/// top-right corner with the court drawn inside its padding.
#[derive(Debug, Clone, PartialEq)]
pub struct MiniCourt {
    pub start_x: f32,
    pub start_y: f32,
    pub end_x: f32,
    pub end_y: f32,
    pub court_start_x: f32,
    pub court_start_y: f32,
    pub court_end_x: f32,
    pub court_end_y: f32,
}

impl MiniCourt {
    pub fn new(frame_width: f32, config: &MiniCourtConfig) -> Self {
        let end_x = frame_width - config.buffer;
        let end_y = config.buffer + config.rect_height;
        let start_x = end_x - config.rect_width;
        let start_y = end_y - config.rect_height;
        let court_start_x = start_x + config.padding;
        let court_start_y = start_y + config.padding;
        let court_end_x = end_x - config.padding;
        let scale = (court_end_x - court_start_x) / DOUBLE_LINE_WIDTH;
        Self {
            start_x,
            start_y,
            end_x,
            end_y,
            court_start_x,
            court_start_y,
            court_end_x,
            court_end_y: court_start_y + COURT_LENGTH * scale,
        }
    }

    /// Pixel width of the drawn doubles court
    pub fn court_width(&self) -> f32 {
        self.court_end_x - self.court_start_x
    }

    fn meters_to_pixels(&self) -> f32 {
        self.court_width() / DOUBLE_LINE_WIDTH
    }

    /// Position of a court coordinate on the rendered mini court
    pub fn to_pixels(&self, coordinate: CourtCoordinate) -> Point {
        let scale = self.meters_to_pixels();
        Point::new(
            self.court_start_x + coordinate.x * scale,
            self.court_start_y + coordinate.y * scale,
        )
    }

    /// Mini-court positions of the 14 keypoints, for drawing
    pub fn keypoints(&self) -> Vec<Point> {
        canonical_keypoints().into_iter().map(|c| self.to_pixels(c)).collect()
    }

    /// Both ends of the net line
    pub fn net(&self) -> (Point, Point) {
        let y = HALF_COURT_LINE_HEIGHT;
        (
            self.to_pixels(CourtCoordinate::new(0.0, y)),
            self.to_pixels(CourtCoordinate::new(DOUBLE_LINE_WIDTH, y)),
        )
    }
}

/// Frozen pixel-to-court reference for one video
#[derive(Debug, Clone)]
pub struct CourtProjection {
    keypoints: Vec<Point>,
    homography: Matrix3<f64>,
    mini_court: MiniCourt,
}

impl CourtProjection {
    /// Builds the reference mapping from the first frame's court keypoints
    pub fn new(keypoints: Vec<Point>, frame_width: f32, config: &MiniCourtConfig) -> Result<Self, AnalysisError> {
        let homography = estimate_homography(&keypoints, &canonical_keypoints())?;
        Ok(Self {
            keypoints,
            homography,
            mini_court: MiniCourt::new(frame_width, config),
        })
    }

    pub fn keypoints(&self) -> &[Point] {
        &self.keypoints
    }

    pub fn mini_court(&self) -> &MiniCourt {
        &self.mini_court
    }

    /// Maps a pixel position onto the canonical court
    pub fn project(&self, pixel: Point) -> CourtCoordinate {
        let v = self.homography * Vector3::new(pixel.x as f64, pixel.y as f64, 1.0);
        let w = if v.z.abs() < 1e-12 { 1e-12_f64.copysign(v.z) } else { v.z };
        CourtCoordinate::new((v.x / w) as f32, (v.y / w) as f32)
    }

    /// Maps a pixel position onto the rendered mini court
    pub fn to_mini_court(&self, pixel: Point) -> Point {
        self.mini_court.to_pixels(self.project(pixel))
    }

    /// Converts a distance measured on the mini court to meters
    pub fn mini_court_distance_to_meters(&self, pixel_distance: f32) -> f32 {
        pixel_distance_to_meters(pixel_distance, self.mini_court.court_width())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A broadcast-like perspective view of the canonical court
    fn perspective_view(c: CourtCoordinate) -> Point {
        let h = Matrix3::new(60.0, -8.0, 640.0, 0.0, 25.0, 250.0, 0.0, -0.012, 1.0);
        let v = h * Vector3::new(c.x as f64, c.y as f64, 1.0);
        Point::new((v.x / v.z) as f32, (v.y / v.z) as f32)
    }

    #[test]
    fn test_canonical_court_dimensions() {
        let k = canonical_keypoints();
        assert!((k[6].x - k[4].x - SINGLE_LINE_WIDTH).abs() < 1e-4);
        // Service line to net
        assert!((HALF_COURT_LINE_HEIGHT - k[8].y - SERVICE_LINE_WIDTH).abs() < 1e-4);
        assert!((k[13].y - HALF_COURT_LINE_HEIGHT - SERVICE_LINE_WIDTH).abs() < 1e-4);
        assert_eq!(k[12].x, DOUBLE_LINE_WIDTH / 2.0);
    }

    #[test]
    fn test_recovers_affine_mapping() {
        let pixels: Vec<Point> = canonical_keypoints()
            .iter()
            .map(|c| Point::new(400.0 + c.x * 50.0, 100.0 + c.y * 30.0))
            .collect();
        let projection = CourtProjection::new(pixels, 1920.0, &MiniCourtConfig::default()).unwrap();
        let court = projection.project(Point::new(400.0 + 5.0 * 50.0, 100.0 + 12.0 * 30.0));
        assert!((court.x - 5.0).abs() < 1e-3);
        assert!((court.y - 12.0).abs() < 1e-3);
    }

    #[test]
    fn test_recovers_perspective_mapping() {
        let pixels: Vec<Point> = canonical_keypoints().iter().map(|c| perspective_view(*c)).collect();
        let projection = CourtProjection::new(pixels, 1920.0, &MiniCourtConfig::default()).unwrap();
        for (pixel, expected) in projection.keypoints().iter().zip(canonical_keypoints()) {
            let court = projection.project(*pixel);
            assert!((court.x - expected.x).abs() < 1e-2, "{:?} vs {:?}", court, expected);
            assert!((court.y - expected.y).abs() < 1e-2, "{:?} vs {:?}", court, expected);
        }
        let inside = CourtCoordinate::new(3.0, 17.0);
        let court = projection.project(perspective_view(inside));
        assert!((court.x - inside.x).abs() < 1e-2);
        assert!((court.y - inside.y).abs() < 1e-2);
    }

    #[test]
    fn test_rejects_too_few_keypoints() {
        let pixels = vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 1.0)];
        assert!(matches!(
            CourtProjection::new(pixels, 1920.0, &MiniCourtConfig::default()),
            Err(AnalysisError::InsufficientKeypoints { expected: 4, actual: 3 })
        ));
    }

    #[test]
    fn test_rejects_collapsed_keypoints() {
        let pixels = vec![Point::new(10.0, 10.0); 14];
        assert!(CourtProjection::new(pixels, 1920.0, &MiniCourtConfig::default()).is_err());
    }

    #[test]
    fn test_pixel_distance_to_meters_is_linear() {
        let width = 210.0;
        let one = pixel_distance_to_meters(50.0, width);
        let two = pixel_distance_to_meters(100.0, width);
        assert!((two - 2.0 * one).abs() < 1e-5);
        // The full drawn width is the doubles width
        assert!((pixel_distance_to_meters(width, width) - DOUBLE_LINE_WIDTH).abs() < 1e-5);
        assert!((meters_to_pixel_distance(one, width) - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_speed_kmh() {
        // 10 m in 24 frames at 24 fps is 10 m/s
        assert!((speed_kmh(10.0, 24, 24.0) - 36.0).abs() < 1e-4);
        assert!((speed_kmh(10.0, 30, 30.0) - 36.0).abs() < 1e-4);
        assert_eq!(speed_kmh(10.0, 0, 24.0), 0.0);
    }

    #[test]
    fn test_mini_court_footprint() {
        let mini = MiniCourt::new(1920.0, &MiniCourtConfig::default());
        assert_eq!(mini.end_x, 1870.0);
        assert_eq!(mini.start_x, 1620.0);
        assert_eq!(mini.start_y, 50.0);
        assert_eq!(mini.court_width(), 210.0);
        let origin = mini.to_pixels(CourtCoordinate::new(0.0, 0.0));
        assert_eq!(origin, Point::new(1640.0, 70.0));
        let far = mini.to_pixels(CourtCoordinate::new(DOUBLE_LINE_WIDTH, 0.0));
        assert!((far.x - 1850.0).abs() < 1e-3);
        assert!(mini.court_end_y < mini.end_y);
    }

    #[test]
    fn test_mini_court_distance_uses_drawn_width() {
        let pixels: Vec<Point> = canonical_keypoints()
            .iter()
            .map(|c| Point::new(400.0 + c.x * 50.0, 100.0 + c.y * 50.0))
            .collect();
        let projection = CourtProjection::new(pixels, 1920.0, &MiniCourtConfig::default()).unwrap();
        let a = projection.to_mini_court(Point::new(400.0, 100.0));
        let b = projection.to_mini_court(Point::new(400.0 + 4.0 * 50.0, 100.0));
        let meters = projection.mini_court_distance_to_meters(a.distance(&b));
        assert!((meters - 4.0).abs() < 1e-2);
    }
}
