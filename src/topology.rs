//! Graph summary statistics for an assembled structure

use glam::Vec3;
use serde::Serialize;

use crate::connectivity::Edge;
use crate::entity::Entity;
use crate::geometry::centroid;

/// Summary of the entity/edge graph
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TopologySummary {
    pub node_count: usize,
    pub edge_count: usize,
    /// `edges / (n * (n - 1) / 2)`, zero for fewer than two nodes
    pub density: f32,
    /// `2 * edges / n`, zero for an empty graph
    pub avg_degree: f32,
    pub centroid: Vec3,
    /// Largest distance from any entity to the centroid
    pub bounding_radius: f32,
}

/// Compute the summary for the given entities and edges
///
/// Reads only; calling it twice on unchanged input gives identical results.
pub fn analyze(entities: &[Entity], edges: &[Edge]) -> TopologySummary {
    let node_count = entities.len();
    let edge_count = edges.len();

    let possible = node_count * node_count.saturating_sub(1) / 2;
    let density = if possible > 0 {
        edge_count as f32 / possible as f32
    } else {
        0.0
    };
    let avg_degree = if node_count > 0 {
        2.0 * edge_count as f32 / node_count as f32
    } else {
        0.0
    };

    let center = centroid(entities.iter().map(|e| &e.position));
    let bounding_radius = entities
        .iter()
        .map(|e| e.position.distance(center))
        .fold(0.0_f32, f32::max);

    TopologySummary {
        node_count,
        edge_count,
        density,
        avg_degree,
        centroid: center,
        bounding_radius,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::EdgeSet;

    fn square() -> Vec<Entity> {
        [
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, p)| Entity::new(i, p))
        .collect()
    }

    #[test]
    fn summary_of_square_ring() {
        let entities = square();
        let mut set = EdgeSet::default();
        for (a, b) in [(0, 1), (1, 2), (2, 3), (3, 0)] {
            set.form_edge(a, b, 2.0, 0.0);
        }

        let summary = analyze(&entities, set.edges());
        assert_eq!(summary.node_count, 4);
        assert_eq!(summary.edge_count, 4);
        assert!((summary.density - 4.0 / 6.0).abs() < 1e-6);
        assert_eq!(summary.avg_degree, 2.0);
        assert_eq!(summary.centroid, Vec3::ZERO);
        assert!((summary.bounding_radius - 2.0_f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn analyze_is_idempotent() {
        let entities = square();
        let mut set = EdgeSet::default();
        set.form_edge(0, 2, 2.8, 0.0);

        let first = analyze(&entities, set.edges());
        let second = analyze(&entities, set.edges());
        assert_eq!(first, second);
    }

    #[test]
    fn degenerate_graphs() {
        let empty = analyze(&[], &[]);
        assert_eq!(empty.node_count, 0);
        assert_eq!(empty.density, 0.0);
        assert_eq!(empty.avg_degree, 0.0);
        assert_eq!(empty.bounding_radius, 0.0);

        let single = analyze(&[Entity::new(0, Vec3::ONE)], &[]);
        assert_eq!(single.density, 0.0);
        assert_eq!(single.centroid, Vec3::ONE);
    }
}
