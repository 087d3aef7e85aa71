use crate::config::ShotConfig;
use crate::geometry::BoundingBox;
use ndarray::{Array2, ArrayViewMut1};

/// The ball box of one frame, if any
pub type BallFrameRecord = Option<BoundingBox>;

/// Lays the per-frame boxes out as an `n x 4` table, NaN marking missing rows
fn to_table(records: &[BallFrameRecord]) -> Array2<f32> {
    let mut table = Array2::from_elem((records.len(), 4), f32::NAN);
    for (frame_idx, record) in records.iter().enumerate() {
        if let Some(bbox) = record {
            for (col, value) in bbox.as_array().into_iter().enumerate() {
                table[[frame_idx, col]] = value;
            }
        }
    }
    table
}

fn from_table(table: &Array2<f32>) -> Vec<BallFrameRecord> {
    table
        .rows()
        .into_iter()
        .map(|row| {
            if row.iter().all(|v| v.is_finite()) {
                Some(BoundingBox::new(row[0], row[1], row[2], row[3]))
            } else {
                None
            }
        })
        .collect()
}

/// Linear interpolation between known values, then forward and backward fill of the ends
fn fill_column(mut column: ArrayViewMut1<f32>) {
    let known: Vec<usize> = (0..column.len()).filter(|&i| column[i].is_finite()).collect();
    let (Some(&first), Some(&last)) = (known.first(), known.last()) else {
        return;
    };

    for pair in known.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        let (from, to) = (column[start], column[end]);
        let span = (end - start) as f32;
        for i in start + 1..end {
            let t = (i - start) as f32 / span;
            column[i] = from + (to - from) * t;
        }
    }

    let last_value = column[last];
    for i in last + 1..column.len() {
        column[i] = last_value;
    }
    let first_value = column[first];
    for i in 0..first {
        column[i] = first_value;
    }
}

/// Fills missing ball boxes so the trajectory is continuous.
///
/// Each coordinate is interpolated independently across the whole frame range;
/// leading and trailing gaps take the nearest detected value. A sequence with no
/// detection at all is returned unchanged.
pub fn interpolate_ball_positions(records: &[BallFrameRecord]) -> Vec<BallFrameRecord> {
    let mut table = to_table(records);
    for column in table.columns_mut() {
        fill_column(column);
    }
    from_table(&table)
}

/// Share of frames with a detected ball, before interpolation
pub fn detection_rate(records: &[BallFrameRecord]) -> f32 {
    if records.is_empty() {
        return 0.0;
    }
    records.iter().filter(|r| r.is_some()).count() as f32 / records.len() as f32
}

/// Trailing rolling mean over at most `window` values, ignoring missing ones
pub fn rolling_mean(values: &[Option<f32>], window: usize) -> Vec<Option<f32>> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let present: Vec<f32> = values[start..=i].iter().flatten().copied().collect();
            if present.is_empty() {
                None
            } else {
                Some(present.iter().sum::<f32>() / present.len() as f32)
            }
        })
        .collect()
}

/// Frames whose value is strictly below every neighbour within the span.
/// Frames whose span leaves the sequence are never candidates.
pub fn local_minima(values: &[Option<f32>], lookback: usize, lookahead: usize) -> Vec<usize> {
    let lookback = lookback.max(1);
    let lookahead = lookahead.max(1);
    (lookback..values.len().saturating_sub(lookahead))
        .filter(|&i| {
            let Some(current) = values[i] else {
                return false;
            };
            (i - lookback..=i + lookahead)
                .filter(|&j| j != i)
                .all(|j| values[j].is_some_and(|v| current < v))
        })
        .collect()
}

/// Keeps the first candidate of every run whose consecutive gaps are below `min_spacing`
pub fn suppress_clusters(candidates: &[usize], min_spacing: usize) -> Vec<usize> {
    let mut kept = Vec::new();
    let mut previous: Option<usize> = None;
    for &frame in candidates {
        match previous {
            Some(p) if frame - p < min_spacing => {}
            _ => kept.push(frame),
        }
        previous = Some(frame);
    }
    kept
}

/// Detects shot events as sharp reversals of the ball's vertical motion
pub fn detect_shot_frames(trajectory: &[BallFrameRecord], config: &ShotConfig) -> Vec<usize> {
    let mid_y: Vec<Option<f32>> = trajectory
        .iter()
        .map(|record| record.map(|bbox| bbox.center().y))
        .collect();
    shot_frames_from_vertical(&mid_y, config)
}

/// Shot detection over a raw vertical-center series
pub fn shot_frames_from_vertical(mid_y: &[Option<f32>], config: &ShotConfig) -> Vec<usize> {
    let smoothed = rolling_mean(mid_y, config.rolling_window);
    let candidates = local_minima(&smoothed, config.lookback, config.lookahead);
    suppress_clusters(&candidates, config.min_spacing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ball_at(cx: f32, cy: f32) -> BallFrameRecord {
        Some(BoundingBox::from_cxcywh(cx, cy, 10.0, 10.0))
    }

    #[test]
    fn test_interpolates_midpoint() {
        let mut records: Vec<BallFrameRecord> = vec![None; 11];
        records[0] = ball_at(100.0, 100.0);
        records[10] = ball_at(200.0, 200.0);

        let filled = interpolate_ball_positions(&records);
        let center = filled[5].unwrap().center();
        assert!((center.x - 150.0).abs() < 1e-4);
        assert!((center.y - 150.0).abs() < 1e-4);
        assert!(filled.iter().all(|r| r.is_some()));
    }

    #[test]
    fn test_fills_leading_and_trailing_gaps() {
        let records = vec![None, None, ball_at(50.0, 60.0), None, ball_at(70.0, 80.0), None];
        let filled = interpolate_ball_positions(&records);
        assert_eq!(filled[0], records[2]);
        assert_eq!(filled[1], records[2]);
        assert_eq!(filled[5], records[4]);
        let mid = filled[3].unwrap().center();
        assert!((mid.x - 60.0).abs() < 1e-4);
        assert!((mid.y - 70.0).abs() < 1e-4);
    }

    #[test]
    fn test_no_detections_stays_empty() {
        let records: Vec<BallFrameRecord> = vec![None; 4];
        assert_eq!(interpolate_ball_positions(&records), records);
        assert!(interpolate_ball_positions(&[]).is_empty());
    }

    #[test]
    fn test_interpolation_is_idempotent_and_gap_free() {
        // Several gap patterns, each bracketed by detections at both ends
        for stride in 1..7usize {
            let records: Vec<BallFrameRecord> = (0..40usize)
                .map(|i| {
                    if i == 0 || i == 39 || i % stride == 0 {
                        ball_at(i as f32 * 3.0, 500.0 - (i * i) as f32 * 0.2)
                    } else {
                        None
                    }
                })
                .collect();
            let once = interpolate_ball_positions(&records);
            assert!(once.iter().all(|r| r.is_some()));
            let twice = interpolate_ball_positions(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_detection_rate() {
        let records = vec![ball_at(1.0, 1.0), None, None, ball_at(2.0, 2.0)];
        assert_eq!(detection_rate(&records), 0.5);
        assert_eq!(detection_rate(&[]), 0.0);
    }

    #[test]
    fn test_rolling_mean_trailing() {
        let values = vec![Some(1.0), Some(3.0), None, Some(5.0)];
        let smoothed = rolling_mean(&values, 2);
        assert_eq!(smoothed, vec![Some(1.0), Some(2.0), Some(3.0), Some(5.0)]);
    }

    #[test]
    fn test_single_shot_in_reference_trajectory() {
        let mid_y: Vec<Option<f32>> = [50.0, 48.0, 45.0, 50.0, 55.0, 60.0, 55.0, 50.0, 45.0]
            .into_iter()
            .map(Some)
            .collect();
        let shots = shot_frames_from_vertical(&mid_y, &ShotConfig::default());
        assert_eq!(shots, vec![2]);
    }

    #[test]
    fn test_cluster_keeps_first() {
        assert_eq!(suppress_clusters(&[10, 20, 30, 80, 90, 200], 25), vec![10, 80, 200]);
        assert_eq!(suppress_clusters(&[], 25), Vec::<usize>::new());
        assert_eq!(suppress_clusters(&[5, 30], 25), vec![5, 30]);
    }

    #[test]
    fn test_local_minima_ignores_edges_and_plateaus() {
        let values: Vec<Option<f32>> = [1.0, 5.0, 3.0, 3.0, 6.0, 2.0, 7.0, 0.0]
            .into_iter()
            .map(Some)
            .collect();
        // 0 and 7 are at the edges, 2 and 3 form a plateau
        assert_eq!(local_minima(&values, 1, 1), vec![5]);
    }

    #[test]
    fn test_shots_strictly_increasing_and_spaced() {
        let config = ShotConfig::default();
        // Bouncing rally with detector jitter and dropped frames
        let trajectory: Vec<BallFrameRecord> = (0..600usize)
            .map(|i| {
                if i % 7 == 3 {
                    return None;
                }
                let t = i as f32 / 18.0;
                let jitter = ((i * 37) % 11) as f32 - 5.0;
                ball_at(960.0, 500.0 + 300.0 * t.sin() + jitter)
            })
            .collect();
        let filled = interpolate_ball_positions(&trajectory);
        let shots = detect_shot_frames(&filled, &config);

        assert!(!shots.is_empty());
        for pair in shots.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[1] - pair[0] >= config.min_spacing);
        }
    }
}
