//! Player identity resolution.
//!
//! The detector keeps re-issuing track ids: a player who is missed for one
//! frame comes back under a new id, and spectators, line judges and ball kids
//! get ids of their own. The resolver picks the two real players from an
//! initial observation window and then keeps two canonical identities stable
//! for the whole video, re-attaching an identity to a new track id by nearest
//! position when its current id vanishes.

use crate::config::ResolverConfig;
use crate::detection::{Detection, FrameContext, TrackId};
use crate::geometry::{BoundingBox, Point};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

/// One of the two stable player identities of a video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CanonicalPlayerId {
    P1,
    P2,
}

impl CanonicalPlayerId {
    pub const ALL: [CanonicalPlayerId; 2] = [CanonicalPlayerId::P1, CanonicalPlayerId::P2];

    pub fn index(self) -> usize {
        match self {
            CanonicalPlayerId::P1 => 0,
            CanonicalPlayerId::P2 => 1,
        }
    }

    /// The other player
    pub fn opponent(self) -> Self {
        match self {
            CanonicalPlayerId::P1 => CanonicalPlayerId::P2,
            CanonicalPlayerId::P2 => CanonicalPlayerId::P1,
        }
    }

    /// 1-based player number used in labels and exports
    pub fn number(self) -> usize {
        self.index() + 1
    }
}

impl fmt::Display for CanonicalPlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Player {}", self.number())
    }
}

/// Boxes of the canonical players bound in one frame; zero, one or two entries
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerFrameRecord {
    slots: [Option<BoundingBox>; 2],
}

impl PlayerFrameRecord {
    pub fn get(&self, id: CanonicalPlayerId) -> Option<&BoundingBox> {
        self.slots[id.index()].as_ref()
    }

    pub fn insert(&mut self, id: CanonicalPlayerId, bbox: BoundingBox) {
        self.slots[id.index()] = Some(bbox);
    }

    pub fn contains(&self, id: CanonicalPlayerId) -> bool {
        self.slots[id.index()].is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (CanonicalPlayerId, &BoundingBox)> {
        CanonicalPlayerId::ALL
            .into_iter()
            .filter_map(move |id| self.get(id).map(|bbox| (id, bbox)))
    }
}

/// Plausibility sub-terms. Each returns its bonus or zero so that thresholds
/// can be tuned and tested in isolation.
pub mod scoring {
    use super::*;

    /// Bonus for a center inside the central band of the frame width
    pub fn centrality(bbox: &BoundingBox, frame: &FrameContext, config: &ResolverConfig) -> f32 {
        let cx = bbox.center().x;
        if cx > frame.width * config.central_band_min && cx < frame.width * config.central_band_max {
            config.centrality_bonus
        } else {
            0.0
        }
    }

    /// Bonus for a center below the stands
    pub fn verticality(bbox: &BoundingBox, frame: &FrameContext, config: &ResolverConfig) -> f32 {
        if bbox.center().y > frame.height * config.stands_ratio {
            config.verticality_bonus
        } else {
            0.0
        }
    }

    /// Bonus for a box large enough to be a player rather than a distant spectator
    pub fn size(bbox: &BoundingBox, config: &ResolverConfig) -> f32 {
        if bbox.area() > config.substantial_area {
            config.size_bonus
        } else {
            0.0
        }
    }

    /// Bonus for moving like an athlete: capped sum of the x and y center variances
    pub fn movement_variance(centers: &[Point], config: &ResolverConfig) -> f32 {
        if centers.len() < 2 {
            return 0.0;
        }
        let n = centers.len() as f32;
        let mean_x = centers.iter().map(|p| p.x).sum::<f32>() / n;
        let mean_y = centers.iter().map(|p| p.y).sum::<f32>() / n;
        let var_x = centers.iter().map(|p| (p.x - mean_x).powi(2)).sum::<f32>() / n;
        let var_y = centers.iter().map(|p| (p.y - mean_y).powi(2)).sum::<f32>() / n;
        ((var_x + var_y) / config.movement_variance_divisor).min(config.movement_bonus_cap)
    }

    /// Per-frame plausibility of one candidate
    pub fn score(bbox: &BoundingBox, frame: &FrameContext, config: &ResolverConfig) -> f32 {
        centrality(bbox, frame, config) + verticality(bbox, frame, config) + size(bbox, config)
    }

    const EDGE_MARGIN: f32 = 50.0;

    /// Bonus for a box that does not touch the left or right frame edge
    pub fn not_at_edge(bbox: &BoundingBox, frame: &FrameContext) -> f32 {
        if bbox.x1 > EDGE_MARGIN && bbox.x2 < frame.width - EDGE_MARGIN { 1.0 } else { 0.0 }
    }

    /// Bonus for human standing proportions
    pub fn human_proportions(bbox: &BoundingBox) -> f32 {
        let ratio = bbox.aspect_ratio();
        if ratio > 1.0 && ratio < 4.0 { 1.0 } else { 0.0 }
    }

    /// Approximate center of the playing surface in the broadcast view
    pub fn court_center(frame: &FrameContext) -> Point {
        Point::new(frame.width * 0.5, frame.height * 0.6)
    }

    /// Up to 3 points, decaying with distance from the court center
    pub fn court_proximity(bbox: &BoundingBox, frame: &FrameContext) -> f32 {
        let distance = bbox.center().distance(&court_center(frame));
        (3.0 - distance / 200.0).max(0.0)
    }

    /// Richer score used to shortlist the best candidates of a crowded frame
    pub fn shortlist_score(bbox: &BoundingBox, frame: &FrameContext, config: &ResolverConfig) -> f32 {
        score(bbox, frame, config)
            + not_at_edge(bbox, frame)
            + human_proportions(bbox)
            + court_proximity(bbox, frame)
    }
}

/// Window statistics of one detector track id
#[derive(Debug, Clone, Default)]
struct CandidateStats {
    appearances: usize,
    total_score: f32,
    centers: Vec<Point>,
    first_seen: usize,
}

/// Final ranking entry of a detector track id
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRanking {
    pub track_id: TrackId,
    pub score: f32,
    pub appearances: usize,
}

/// Keeps only the best `limit` candidates of a frame by shortlist score
fn shortlist<'a>(
    detections: &'a [Detection],
    frame: &FrameContext,
    config: &ResolverConfig,
    limit: usize,
) -> Vec<&'a Detection> {
    if detections.len() <= limit {
        return detections.iter().collect();
    }
    let center = scoring::court_center(frame);
    let mut ranked: Vec<(&Detection, f32, f32)> = detections
        .iter()
        .map(|d| {
            (
                d,
                scoring::shortlist_score(&d.bbox, frame, config),
                d.bbox.center().distance(&center),
            )
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal))
    });
    ranked.into_iter().take(limit).map(|(d, _, _)| d).collect()
}

/// Ranks every track id seen in the first `init_window` frames, best first
pub fn rank_candidates(
    frames: &[Vec<Detection>],
    contexts: &[FrameContext],
    config: &ResolverConfig,
) -> Vec<CandidateRanking> {
    let window = config.init_window;
    let mut stats: HashMap<TrackId, CandidateStats> = HashMap::new();

    for (frame_idx, detections) in frames.iter().take(window).enumerate() {
        let frame = contexts.get(frame_idx).copied().unwrap_or_default();
        let candidates: Vec<&Detection> = match config.frame_shortlist {
            Some(limit) => shortlist(detections, &frame, config, limit),
            None => detections.iter().collect(),
        };
        for detection in candidates {
            let Some(track_id) = detection.track_id else {
                debug!("frame {}: ignoring candidate without a track id", frame_idx);
                continue;
            };
            let entry = stats.entry(track_id).or_insert_with(|| CandidateStats {
                first_seen: frame_idx,
                ..Default::default()
            });
            entry.appearances += 1;
            entry.total_score += scoring::score(&detection.bbox, &frame, config);
            entry.centers.push(detection.bbox.center());
        }
    }

    let mut rankings: Vec<(CandidateRanking, usize)> = stats
        .into_iter()
        .map(|(track_id, s)| {
            let total = s.total_score + scoring::movement_variance(&s.centers, config);
            let average = total / s.appearances.max(1) as f32;
            let score = average * (s.appearances as f32 / window as f32);
            (
                CandidateRanking {
                    track_id,
                    score,
                    appearances: s.appearances,
                },
                s.first_seen,
            )
        })
        .collect();

    // Ties go to the earliest, then lowest, track id so the choice is deterministic
    rankings.sort_by(|(a, a_first), (b, b_first)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a_first.cmp(b_first))
            .then(a.track_id.cmp(&b.track_id))
    });
    rankings.into_iter().map(|(r, _)| r).collect()
}

/// Binding state of one canonical player
#[derive(Debug, Clone)]
struct IdentitySlot {
    id: CanonicalPlayerId,
    track_id: TrackId,
    last_known_position: Option<Point>,
}

/// Two-phase player identity state machine for one video
#[derive(Debug, Clone)]
pub struct PlayerIdentityResolver {
    config: ResolverConfig,
    slots: Vec<IdentitySlot>,
}

impl PlayerIdentityResolver {
    /// Runs the initialization window and fixes the canonical identities.
    /// Fewer than two identities are created when fewer tracks were ever seen.
    pub fn initialize(
        frames: &[Vec<Detection>],
        contexts: &[FrameContext],
        config: &ResolverConfig,
    ) -> Self {
        let rankings = rank_candidates(frames, contexts, config);

        info!("Player selection analysis:");
        for r in rankings.iter().take(5) {
            info!(
                "  track {}: score={:.2}, appearances={}/{}",
                r.track_id, r.score, r.appearances, config.init_window
            );
        }

        let slots: Vec<IdentitySlot> = rankings
            .iter()
            .zip(CanonicalPlayerId::ALL)
            .map(|(r, id)| IdentitySlot {
                id,
                track_id: r.track_id,
                last_known_position: None,
            })
            .collect();

        info!(
            "  chosen players: {:?}",
            slots.iter().map(|s| (s.id, s.track_id)).collect::<Vec<_>>()
        );

        Self {
            config: config.clone(),
            slots,
        }
    }

    /// Canonical identities with the detector track id each is currently bound to
    pub fn assignments(&self) -> Vec<(CanonicalPlayerId, TrackId)> {
        self.slots.iter().map(|s| (s.id, s.track_id)).collect()
    }

    pub fn last_known_position(&self, id: CanonicalPlayerId) -> Option<Point> {
        self.slots
            .iter()
            .find(|s| s.id == id)
            .and_then(|s| s.last_known_position)
    }

    /// Binds the canonical identities to this frame's detections.
    /// Must be called in increasing frame order.
    pub fn track_frame(&mut self, frame_idx: usize, detections: &[Detection]) -> PlayerFrameRecord {
        let mut record = PlayerFrameRecord::default();
        let mut taken = vec![false; detections.len()];
        let mut missing: Vec<usize> = Vec::new();

        // Direct binding by the current track id
        for (slot_idx, slot) in self.slots.iter_mut().enumerate() {
            let found = detections
                .iter()
                .enumerate()
                .find(|(i, d)| !taken[*i] && d.track_id == Some(slot.track_id));
            match found {
                Some((det_idx, detection)) => {
                    taken[det_idx] = true;
                    record.insert(slot.id, detection.bbox);
                    slot.last_known_position = Some(detection.bbox.center());
                }
                None => missing.push(slot_idx),
            }
        }

        // Re-binding by nearest position among the detections left over
        for slot_idx in missing {
            let slot = &mut self.slots[slot_idx];
            let Some(last) = slot.last_known_position else {
                continue;
            };
            let nearest = detections
                .iter()
                .enumerate()
                .filter(|(i, _)| !taken[*i])
                .map(|(i, d)| (i, d, d.bbox.center().distance(&last)))
                .min_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));

            match nearest {
                Some((det_idx, detection, distance)) if distance < self.config.max_displacement => {
                    taken[det_idx] = true;
                    record.insert(slot.id, detection.bbox);
                    slot.last_known_position = Some(detection.bbox.center());
                    if let Some(track_id) = detection.track_id {
                        debug!(
                            "frame {}: {} re-bound from track {} to track {} ({:.1}px)",
                            frame_idx, slot.id, slot.track_id, track_id, distance
                        );
                        slot.track_id = track_id;
                    }
                }
                Some((_, _, distance)) => {
                    debug!(
                        "frame {}: {} unassigned, nearest candidate {:.1}px away",
                        frame_idx, slot.id, distance
                    );
                }
                None => {
                    debug!("frame {}: {} unassigned, no free candidates", frame_idx, slot.id);
                }
            }
        }

        record
    }

    /// Runs the tracking phase over every frame of the video
    pub fn track_all(&mut self, frames: &[Vec<Detection>]) -> Vec<PlayerFrameRecord> {
        frames
            .iter()
            .enumerate()
            .map(|(frame_idx, detections)| self.track_frame(frame_idx, detections))
            .collect()
    }
}

/// Selects the two players and produces one record per frame
pub fn resolve_players(
    frames: &[Vec<Detection>],
    contexts: &[FrameContext],
    config: &ResolverConfig,
) -> (PlayerIdentityResolver, Vec<PlayerFrameRecord>) {
    let mut resolver = PlayerIdentityResolver::initialize(frames, contexts, config);
    let records = resolver.track_all(frames);
    (resolver, records)
}
