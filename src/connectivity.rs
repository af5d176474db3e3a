//! Edge candidates and incremental edge formation
//!
//! Candidates ("potential connections") are computed once per assembly from
//! target positions. During the connecting phase a fixed share of them is
//! materialized every tick, skipping pairs that have drifted apart.

use std::collections::HashSet;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::geometry::ease_out_cubic;

/// Parameters for candidate selection and edge formation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityParams {
    /// Maximum target distance for a candidate pair (exclusive)
    pub threshold: f32,
    /// Candidates formed per tick = ceil(total / formation_ticks)
    pub formation_ticks: usize,
    /// A candidate is skipped when its current distance exceeds threshold * recheck_factor
    pub recheck_factor: f32,
    /// Seconds for a new edge to reach full scale and opacity
    pub growth_seconds: f32,
    /// Radius of the local clustering force while connecting
    pub cluster_radius: f32,
}

impl Default for ConnectivityParams {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            formation_ticks: 60,
            recheck_factor: 1.2,
            growth_seconds: 1.0,
            cluster_radius: 5.0,
        }
    }
}

/// A potential connection between two entities
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Candidate {
    pub a: usize,
    pub b: usize,
    pub distance: f32,
}

/// A materialized edge
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Edge {
    pub a: usize,
    pub b: usize,
    /// Endpoint distance when the edge formed
    pub distance: f32,
    /// Current endpoint distance, kept in sync every tick
    pub length: f32,
    /// Assembly clock time of formation
    pub formed_at: f32,
    /// Growth animation progress, eased, in [0, 1]
    pub growth: f32,
    /// Emphasis applied once the structure is observed, in [0, 1]
    pub intensity: f32,
    pub opacity: f32,
}

/// All unordered pairs of entities whose targets are closer than `threshold`
///
/// Entities without a target are ignored. O(N²).
pub fn compute_candidates(entities: &[Entity], threshold: f32) -> Vec<Candidate> {
    let points: Vec<(usize, Vec3)> = entities
        .iter()
        .filter_map(|e| e.target.map(|t| (e.id, t)))
        .collect();
    candidates_between(&points, threshold)
}

/// Candidate pairs among `(id, position)` points
pub fn candidates_between(points: &[(usize, Vec3)], threshold: f32) -> Vec<Candidate> {
    let mut out = Vec::new();
    for (i, &(a, pa)) in points.iter().enumerate() {
        for &(b, pb) in &points[i + 1..] {
            if a == b {
                continue;
            }
            let distance = pa.distance(pb);
            if distance < threshold {
                out.push(Candidate {
                    a: a.min(b),
                    b: a.max(b),
                    distance,
                });
            }
        }
    }
    out
}

/// Candidate list plus the edges formed from it so far
#[derive(Debug, Clone, Default)]
pub struct EdgeSet {
    candidates: Vec<Candidate>,
    cursor: usize,
    edges: Vec<Edge>,
    pairs: HashSet<(usize, usize)>,
}

impl EdgeSet {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            ..Self::default()
        }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Formed edges
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// True once every candidate has been considered
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.candidates.len()
    }

    /// Materialize the edge between `a` and `b`
    ///
    /// Returns `false` for self-loops and pairs that already have an edge.
    pub fn form_edge(&mut self, a: usize, b: usize, distance: f32, now: f32) -> bool {
        if a == b || !self.pairs.insert((a.min(b), a.max(b))) {
            return false;
        }
        self.edges.push(Edge {
            a: a.min(b),
            b: a.max(b),
            distance,
            length: distance,
            formed_at: now,
            growth: 0.0,
            intensity: 0.0,
            opacity: 0.0,
        });
        true
    }

    /// Consider the next batch of candidates, forming those still close enough
    ///
    /// The batch is `ceil(total * step / formation_ticks)`, so a 60 Hz frame
    /// (`step == 1`) considers `1 / formation_ticks` of the list. Returns the
    /// number of edges formed this tick.
    pub fn advance_formation(
        &mut self,
        entities: &[Entity],
        now: f32,
        step: f32,
        params: &ConnectivityParams,
    ) -> usize {
        let total = self.candidates.len();
        let share = total as f32 * step.max(0.0) / params.formation_ticks.max(1) as f32;
        let per_tick = (share.ceil() as usize).max(1);
        let end = (self.cursor + per_tick).min(total);
        self.form_until(end, entities, now, params)
    }

    /// Consider every remaining candidate at once
    pub fn finish_formation(
        &mut self,
        entities: &[Entity],
        now: f32,
        params: &ConnectivityParams,
    ) -> usize {
        let total = self.candidates.len();
        self.form_until(total, entities, now, params)
    }

    fn form_until(
        &mut self,
        end: usize,
        entities: &[Entity],
        now: f32,
        params: &ConnectivityParams,
    ) -> usize {
        let limit = params.threshold * params.recheck_factor;
        let mut formed = 0;
        for index in self.cursor..end {
            let Candidate { a, b, .. } = self.candidates[index];
            let (Some(ea), Some(eb)) = (entities.get(a), entities.get(b)) else {
                continue;
            };
            let distance = ea.position.distance(eb.position);
            if distance < limit && self.form_edge(a, b, distance, now) {
                formed += 1;
            }
        }
        self.cursor = self.cursor.max(end);
        formed
    }

    /// Update growth animation and current lengths
    pub fn sync(&mut self, entities: &[Entity], now: f32, growth_seconds: f32) {
        for edge in &mut self.edges {
            if let (Some(ea), Some(eb)) = (entities.get(edge.a), entities.get(edge.b)) {
                edge.length = ea.position.distance(eb.position);
            }
            let t = if growth_seconds > 0.0 {
                (now - edge.formed_at) / growth_seconds
            } else {
                1.0
            };
            edge.growth = ease_out_cubic(t);
            edge.opacity = edge.growth;
        }
    }

    /// Ramp emphasis on every edge
    pub fn intensify(&mut self, intensity: f32) {
        for edge in &mut self.edges {
            edge.intensity = intensity.clamp(0.0, 1.0);
        }
    }

    /// Scale every edge's opacity, used while decaying
    pub fn fade(&mut self, opacity: f32) {
        for edge in &mut self.edges {
            edge.opacity = opacity.clamp(0.0, 1.0) * edge.growth;
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity_at(id: usize, p: Vec3) -> Entity {
        let mut e = Entity::new(id, p);
        e.target = Some(p);
        e
    }

    #[test]
    fn close_pairs_only() {
        // AB = 1, BC = 2.5, AC = 3.5
        let entities = vec![
            entity_at(0, Vec3::ZERO),
            entity_at(1, Vec3::new(1.0, 0.0, 0.0)),
            entity_at(2, Vec3::new(3.5, 0.0, 0.0)),
        ];
        let candidates = compute_candidates(&entities, 3.0);

        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().any(|c| (c.a, c.b) == (0, 1)));
        assert!(candidates.iter().any(|c| (c.a, c.b) == (1, 2)));
        assert!(!candidates.iter().any(|c| (c.a, c.b) == (0, 2)));
    }

    #[test]
    fn candidates_are_unique_and_below_threshold() {
        let entities: Vec<Entity> = (0..40)
            .map(|i| {
                let f = i as f32;
                entity_at(i, Vec3::new((f * 0.7).sin() * 4.0, (f * 1.3).cos() * 4.0, f * 0.1))
            })
            .collect();
        let candidates = compute_candidates(&entities, 3.0);

        let mut seen = HashSet::new();
        for c in &candidates {
            assert_ne!(c.a, c.b);
            assert!(c.distance < 3.0);
            assert!(seen.insert((c.a, c.b)), "duplicate pair {:?}", (c.a, c.b));
        }
    }

    #[test]
    fn entities_without_target_are_skipped() {
        let mut entities = vec![entity_at(0, Vec3::ZERO), entity_at(1, Vec3::X)];
        entities[1].target = None;
        assert!(compute_candidates(&entities, 3.0).is_empty());
    }

    #[test]
    fn form_edge_rejects_duplicates_and_loops() {
        let mut set = EdgeSet::default();
        assert!(set.form_edge(1, 2, 1.0, 0.0));
        assert!(!set.form_edge(2, 1, 1.0, 0.0));
        assert!(!set.form_edge(3, 3, 0.0, 0.0));
        assert_eq!(set.edges().len(), 1);
    }

    #[test]
    fn formation_rate_and_drift_recheck() {
        let mut entities: Vec<Entity> = (0..4).map(|i| entity_at(i, Vec3::ZERO)).collect();
        let candidates = vec![
            Candidate { a: 0, b: 1, distance: 1.0 },
            Candidate { a: 0, b: 2, distance: 1.0 },
            Candidate { a: 0, b: 3, distance: 1.0 },
        ];
        // Entity 3 has drifted well beyond 1.2 * threshold
        entities[3].position = Vec3::new(10.0, 0.0, 0.0);

        let params = ConnectivityParams {
            formation_ticks: 2,
            ..ConnectivityParams::default()
        };
        let mut set = EdgeSet::new(candidates);

        // ceil(3 / 2) = 2 per tick
        assert_eq!(set.advance_formation(&entities, 0.0, 1.0, &params), 2);
        assert!(!set.is_exhausted());
        assert_eq!(set.advance_formation(&entities, 0.1, 1.0, &params), 0);
        assert!(set.is_exhausted());
        assert_eq!(set.edges().len(), 2);
    }

    fn chain(n: usize) -> (Vec<Entity>, Vec<Candidate>) {
        let entities: Vec<Entity> = (0..n)
            .map(|i| entity_at(i, Vec3::new(i as f32, 0.0, 0.0)))
            .collect();
        let candidates = (1..n)
            .map(|i| Candidate {
                a: i - 1,
                b: i,
                distance: 1.0,
            })
            .collect();
        (entities, candidates)
    }

    #[test]
    fn formation_batch_scales_with_frame_step() {
        let (entities, candidates) = chain(13);
        let params = ConnectivityParams {
            formation_ticks: 12,
            ..ConnectivityParams::default()
        };

        // 12 candidates over 12 ticks at 60 Hz, 4 ticks when each frame is 3x longer
        let mut slow = EdgeSet::new(candidates);
        for _ in 0..4 {
            assert_eq!(slow.advance_formation(&entities, 0.0, 3.0, &params), 3);
        }
        assert!(slow.is_exhausted());

        // A sub-60 Hz step still makes progress
        let (_, candidates) = chain(13);
        let mut fast = EdgeSet::new(candidates);
        assert_eq!(fast.advance_formation(&entities, 0.0, 0.25, &params), 1);
    }

    #[test]
    fn finish_formation_drains_the_rest() {
        let (entities, candidates) = chain(6);
        let params = ConnectivityParams {
            formation_ticks: 60,
            ..ConnectivityParams::default()
        };
        let mut set = EdgeSet::new(candidates);

        assert_eq!(set.advance_formation(&entities, 0.0, 1.0, &params), 1);
        assert_eq!(set.finish_formation(&entities, 0.1, &params), 4);
        assert!(set.is_exhausted());
        assert_eq!(set.edges().len(), 5);
        assert_eq!(set.finish_formation(&entities, 0.2, &params), 0);
    }

    #[test]
    fn growth_follows_ease_out() {
        let entities: Vec<Entity> = (0..2).map(|i| entity_at(i, Vec3::ZERO)).collect();
        let mut set = EdgeSet::default();
        set.form_edge(0, 1, 0.0, 1.0);

        set.sync(&entities, 1.0, 1.0);
        assert_eq!(set.edges()[0].growth, 0.0);
        set.sync(&entities, 1.5, 1.0);
        assert!((set.edges()[0].growth - 0.875).abs() < 1e-6);
        set.sync(&entities, 3.0, 1.0);
        assert_eq!(set.edges()[0].growth, 1.0);

        set.fade(0.5);
        assert_eq!(set.edges()[0].opacity, 0.5);
    }

    #[test]
    fn clear_discards_everything() {
        let mut set = EdgeSet::new(vec![Candidate { a: 0, b: 1, distance: 1.0 }]);
        set.form_edge(0, 1, 1.0, 0.0);
        set.clear();
        assert!(set.edges().is_empty());
        assert!(set.candidates().is_empty());
        assert!(set.is_exhausted());
    }
}
