use crate::court::{pixel_distance_to_meters, speed_kmh};
use crate::geometry::{Point, measure_distance};
use crate::resolver::CanonicalPlayerId;
use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Running totals of one player up to a shot
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerStats {
    pub shots: u32,
    pub total_shot_speed: f32,
    pub last_shot_speed: f32,
    pub total_movement_speed: f32,
    pub last_movement_speed: f32,
    pub movement_samples: u32,
}

impl PlayerStats {
    /// Zero when the player never hit a shot
    pub fn average_shot_speed(&self) -> f32 {
        self.total_shot_speed / self.shots.max(1) as f32
    }

    pub fn average_movement_speed(&self) -> f32 {
        self.total_movement_speed / self.movement_samples.max(1) as f32
    }
}

/// Cumulative statistics of both players, valid from `frame` on
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerStatRecord {
    pub frame: usize,
    pub players: [PlayerStats; 2],
}

impl PlayerStatRecord {
    pub fn player(&self, id: CanonicalPlayerId) -> &PlayerStats {
        &self.players[id.index()]
    }

    fn player_mut(&mut self, id: CanonicalPlayerId) -> &mut PlayerStats {
        &mut self.players[id.index()]
    }
}

/// Mini-court positions of everything measured in one frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CourtFrame {
    pub players: [Option<Point>; 2],
    pub ball: Option<Point>,
}

impl CourtFrame {
    pub fn player(&self, id: CanonicalPlayerId) -> Option<Point> {
        self.players[id.index()]
    }
}

/// Calibration needed to turn mini-court displacements into speeds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedCalibration {
    pub mini_court_width: f32,
    pub assumed_fps: f32,
}

/// Folds the shot intervals into cumulative per-player records.
///
/// The first record is an all-zero record at frame 0; every counted interval
/// adds one record at its start frame carrying the previous totals forward.
pub fn compute_shot_records(
    shot_frames: &[usize],
    frames: &[CourtFrame],
    calibration: SpeedCalibration,
) -> Vec<PlayerStatRecord> {
    let mut records = vec![PlayerStatRecord::default()];

    for pair in shot_frames.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        if end >= frames.len() {
            debug!("shot interval {}-{} ends outside the video, skipped", start, end);
            continue;
        }
        let (Some(ball_start), Some(ball_end)) = (frames[start].ball, frames[end].ball) else {
            debug!("shot interval {}-{} has no ball position, skipped", start, end);
            continue;
        };

        let present: Vec<(CanonicalPlayerId, Point)> = CanonicalPlayerId::ALL
            .into_iter()
            .filter_map(|id| frames[start].player(id).map(|p| (id, p)))
            .collect();
        if present.len() < 2 {
            debug!("shot interval {}-{} lacks both players, skipped", start, end);
            continue;
        }

        let Some(shooter) = present
            .iter()
            .min_by(|a, b| {
                measure_distance(a.1, ball_start)
                    .partial_cmp(&measure_distance(b.1, ball_start))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(id, _)| *id)
        else {
            continue;
        };
        let opponent = shooter.opponent();
        let (Some(opponent_start), Some(opponent_end)) =
            (frames[start].player(opponent), frames[end].player(opponent))
        else {
            debug!("shot interval {}-{}: {} missing at the end, skipped", start, end, opponent);
            continue;
        };

        let frame_gap = end - start;
        let ball_meters = pixel_distance_to_meters(
            measure_distance(ball_start, ball_end),
            calibration.mini_court_width,
        );
        let shot_speed = speed_kmh(ball_meters, frame_gap, calibration.assumed_fps);
        let opponent_meters = pixel_distance_to_meters(
            measure_distance(opponent_start, opponent_end),
            calibration.mini_court_width,
        );
        let movement_speed = speed_kmh(opponent_meters, frame_gap, calibration.assumed_fps);

        let mut record = records.last().copied().unwrap_or_default();
        record.frame = start;

        let s = record.player_mut(shooter);
        s.shots += 1;
        s.total_shot_speed += shot_speed;
        s.last_shot_speed = shot_speed;

        let o = record.player_mut(opponent);
        o.total_movement_speed += movement_speed;
        o.last_movement_speed = movement_speed;
        o.movement_samples += 1;

        debug!(
            "shot {}-{}: {} hit at {:.1} km/h, {} moved at {:.1} km/h",
            start, end, shooter, shot_speed, opponent, movement_speed
        );
        records.push(record);
    }

    records
}

/// Expands the shot records to one record per frame, carrying the latest one forward
pub fn per_frame_records(records: &[PlayerStatRecord], frame_count: usize) -> Vec<PlayerStatRecord> {
    let mut current = PlayerStatRecord::default();
    let mut next = records.iter().peekable();
    (0..frame_count)
        .map(|frame| {
            while let Some(record) = next.next_if(|r| r.frame <= frame) {
                current = *record;
            }
            PlayerStatRecord { frame, ..current }
        })
        .collect()
}

/// One row of `player_stats.csv`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerStatsRow {
    pub frame_num: usize,
    pub player_1_number_of_shots: u32,
    pub player_1_total_shot_speed: f32,
    pub player_1_last_shot_speed: f32,
    pub player_1_average_shot_speed: f32,
    pub player_1_total_player_speed: f32,
    pub player_1_last_player_speed: f32,
    pub player_1_average_player_speed: f32,
    pub player_2_number_of_shots: u32,
    pub player_2_total_shot_speed: f32,
    pub player_2_last_shot_speed: f32,
    pub player_2_average_shot_speed: f32,
    pub player_2_total_player_speed: f32,
    pub player_2_last_player_speed: f32,
    pub player_2_average_player_speed: f32,
}

impl From<&PlayerStatRecord> for PlayerStatsRow {
    fn from(record: &PlayerStatRecord) -> Self {
        let [p1, p2] = &record.players;
        Self {
            frame_num: record.frame,
            player_1_number_of_shots: p1.shots,
            player_1_total_shot_speed: p1.total_shot_speed,
            player_1_last_shot_speed: p1.last_shot_speed,
            player_1_average_shot_speed: p1.average_shot_speed(),
            player_1_total_player_speed: p1.total_movement_speed,
            player_1_last_player_speed: p1.last_movement_speed,
            player_1_average_player_speed: p1.average_movement_speed(),
            player_2_number_of_shots: p2.shots,
            player_2_total_shot_speed: p2.total_shot_speed,
            player_2_last_shot_speed: p2.last_shot_speed,
            player_2_average_shot_speed: p2.average_shot_speed(),
            player_2_total_player_speed: p2.total_movement_speed,
            player_2_last_player_speed: p2.last_movement_speed,
            player_2_average_player_speed: p2.average_movement_speed(),
        }
    }
}

/// Writes one CSV row per frame
pub fn write_csv(path: &Path, records: &[PlayerStatRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for record in records {
        wtr.serialize(PlayerStatsRow::from(record))?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::court::DOUBLE_LINE_WIDTH;

    // One mini-court pixel per meter keeps the expected speeds readable
    fn calibration() -> SpeedCalibration {
        SpeedCalibration {
            mini_court_width: DOUBLE_LINE_WIDTH,
            assumed_fps: 24.0,
        }
    }

    fn frame(p1: Option<(f32, f32)>, p2: Option<(f32, f32)>, ball: Option<(f32, f32)>) -> CourtFrame {
        CourtFrame {
            players: [p1.map(Point::from), p2.map(Point::from)],
            ball: ball.map(Point::from),
        }
    }

    /// 49 frames: P1 near the ball at frame 0, P2 near it at frame 24
    fn rally() -> Vec<CourtFrame> {
        let mut frames = vec![frame(Some((0.0, 0.0)), Some((0.0, 20.0)), None); 49];
        frames[0] = frame(Some((0.0, 0.0)), Some((0.0, 20.0)), Some((0.0, 1.0)));
        frames[24] = frame(Some((0.0, 0.0)), Some((6.0, 20.0)), Some((0.0, 19.0)));
        frames[48] = frame(Some((0.0, 3.0)), Some((6.0, 20.0)), Some((0.0, 1.0)));
        frames
    }

    #[test]
    fn test_shooter_and_opponent_speeds() {
        let records = compute_shot_records(&[0, 24, 48], &rally(), calibration());
        // Initial zero record plus one per interval
        assert_eq!(records.len(), 3);

        let first = &records[1];
        assert_eq!(first.frame, 0);
        let p1 = first.player(CanonicalPlayerId::P1);
        let p2 = first.player(CanonicalPlayerId::P2);
        assert_eq!(p1.shots, 1);
        // Ball covers 18 m in one second
        assert!((p1.last_shot_speed - 64.8).abs() < 1e-3);
        assert_eq!(p2.shots, 0);
        // P2 moves 6 m in one second
        assert!((p2.last_movement_speed - 21.6).abs() < 1e-3);
        assert_eq!(p2.movement_samples, 1);

        let second = &records[2];
        assert_eq!(second.frame, 24);
        assert_eq!(second.player(CanonicalPlayerId::P1).shots, 1);
        assert_eq!(second.player(CanonicalPlayerId::P2).shots, 1);
        // Totals carried forward from the previous record
        assert!((second.player(CanonicalPlayerId::P2).total_movement_speed - 21.6).abs() < 1e-3);
        assert!((second.player(CanonicalPlayerId::P1).last_movement_speed - 10.8).abs() < 1e-3);
    }

    #[test]
    fn test_zero_shots_average_is_zero() {
        let stats = PlayerStats::default();
        assert_eq!(stats.average_shot_speed(), 0.0);
        assert_eq!(stats.average_movement_speed(), 0.0);

        let stats = PlayerStats {
            shots: 2,
            total_shot_speed: 100.0,
            ..Default::default()
        };
        assert_eq!(stats.average_shot_speed(), 50.0);
    }

    #[test]
    fn test_skips_interval_outside_video() {
        let records = compute_shot_records(&[0, 24, 400], &rally(), calibration());
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_skips_interval_with_single_player() {
        let mut frames = rally();
        frames[0].players[1] = None;
        let records = compute_shot_records(&[0, 24], &frames, calibration());
        assert_eq!(records, vec![PlayerStatRecord::default()]);
    }

    #[test]
    fn test_skips_interval_without_ball() {
        let mut frames = rally();
        frames[24].ball = None;
        let records = compute_shot_records(&[0, 24], &frames, calibration());
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_skips_interval_when_opponent_leaves() {
        let mut frames = rally();
        frames[24].players[1] = None;
        let records = compute_shot_records(&[0, 24], &frames, calibration());
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_fewer_than_two_shots_yields_zero_record() {
        assert_eq!(compute_shot_records(&[], &rally(), calibration()).len(), 1);
        assert_eq!(compute_shot_records(&[10], &rally(), calibration()).len(), 1);
    }

    #[test]
    fn test_per_frame_forward_fill() {
        let records = compute_shot_records(&[0, 24, 48], &rally(), calibration());
        let per_frame = per_frame_records(&records, 49);
        assert_eq!(per_frame.len(), 49);
        assert_eq!(per_frame[10].frame, 10);
        assert_eq!(per_frame[10].players, records[1].players);
        assert_eq!(per_frame[23].players, records[1].players);
        assert_eq!(per_frame[24].players, records[2].players);
        assert_eq!(per_frame[48].players, records[2].players);
    }

    #[test]
    fn test_write_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player_stats.csv");
        let records = per_frame_records(&[PlayerStatRecord::default()], 3);
        write_csv(&path, &records).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("frame_num,player_1_number_of_shots"));
        assert!(header.ends_with("player_2_average_player_speed"));
        assert_eq!(lines.count(), 3);
    }
}
