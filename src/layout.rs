//! Stress-relaxation layout
//!
//! Places N entities in 3D so that Euclidean distances approximate the target
//! distances in a [`DistanceMatrix`]. This is a spring relaxation rather than
//! exact MDS: every unordered pair acts as a spring whose rest length is the
//! scaled target distance.
//!
//! The iteration count is fixed and there is no convergence check. Both the
//! count and the spring constant are exposed in [`LayoutParams`].

use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::random_in_cube;
use crate::matrix::DistanceMatrix;

/// Distances below this are treated as coincident points
const COINCIDENT: f32 = 1e-6;

/// Tunable parameters for [`layout`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutParams {
    /// Number of relaxation sweeps
    pub iterations: usize,
    /// Spring constant `k`
    pub spring_constant: f32,
    /// Multiplier applied to the accumulated displacement of each sweep
    pub learning_rate: f32,
    /// Target distance = matrix distance * scale_factor
    pub scale_factor: f32,
    /// Side length of the cube used for random initial positions
    pub init_extent: f32,
    /// Stand-in distance for coincident points
    pub epsilon: f32,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            iterations: 100,
            spring_constant: 0.1,
            learning_rate: 0.5,
            scale_factor: 10.0,
            init_extent: 20.0,
            epsilon: 0.1,
        }
    }
}

/// Compute 3D positions for every entity in `matrix`
///
/// Always returns exactly `matrix.len()` finite points.
pub fn layout<R: Rng + ?Sized>(
    matrix: &DistanceMatrix,
    params: &LayoutParams,
    rng: &mut R,
) -> Vec<Vec3> {
    let n = matrix.len();
    let mut positions: Vec<Vec3> = (0..n)
        .map(|_| random_in_cube(rng, params.init_extent))
        .collect();

    if n < 2 {
        return positions;
    }

    // Normalizing by the number of partners keeps the step stable for large N
    let step = params.learning_rate / (n - 1) as f32;
    let mut forces = vec![Vec3::ZERO; n];

    for _ in 0..params.iterations {
        forces.fill(Vec3::ZERO);

        for i in 0..n {
            for j in (i + 1)..n {
                let delta = positions[j] - positions[i];
                let mut d = delta.length();
                if d < COINCIDENT {
                    d = params.epsilon;
                }

                let target = matrix.get(i, j) * params.scale_factor;

                // Hooke's law along the pair axis: |F| = k * (d - target)
                let f = params.spring_constant * (d - target) / d;
                let push = delta * f;

                forces[i] += push;
                forces[j] -= push;
            }
        }

        // Synchronous update, every pair saw the same snapshot
        for (position, force) in positions.iter_mut().zip(&forces) {
            *position += *force * step;
        }
    }

    debug!(
        entities = n,
        iterations = params.iterations,
        stress = stress(matrix, &positions, params.scale_factor),
        "layout complete"
    );

    positions
}

/// Sum of squared residuals between placed and target distances
pub fn stress(matrix: &DistanceMatrix, positions: &[Vec3], scale_factor: f32) -> f32 {
    let n = matrix.len().min(positions.len());
    let mut total = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            let d = positions[i].distance(positions[j]);
            let residual = d - matrix.get(i, j) * scale_factor;
            total += residual * residual;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn returns_one_position_per_entity() {
        let matrix = DistanceMatrix::uniform(7, 0.4);
        let positions = layout(&matrix, &LayoutParams::default(), &mut rng());
        assert_eq!(positions.len(), 7);
        assert!(positions.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn empty_and_single_matrices() {
        let params = LayoutParams::default();
        assert!(layout(&DistanceMatrix::uniform(0, 1.0), &params, &mut rng()).is_empty());

        let single = layout(&DistanceMatrix::uniform(1, 1.0), &params, &mut rng());
        assert_eq!(single.len(), 1);
        assert!(single[0].is_finite());
    }

    #[test]
    fn two_points_converge_to_scaled_distance() {
        let matrix = DistanceMatrix::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
        let params = LayoutParams::default();
        let positions = layout(&matrix, &params, &mut rng());

        let d = positions[0].distance(positions[1]);
        let expected = params.scale_factor;
        assert!(
            (d - expected).abs() <= expected * 0.15,
            "distance {d} should be within 15% of {expected}"
        );
    }

    #[test]
    fn all_zero_matrix_stays_finite() {
        let matrix = DistanceMatrix::uniform(12, 0.0);
        let positions = layout(&matrix, &LayoutParams::default(), &mut rng());
        assert_eq!(positions.len(), 12);
        assert!(positions.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn coincident_start_does_not_produce_nan() {
        let matrix = DistanceMatrix::uniform(4, 1.0);
        let params = LayoutParams {
            init_extent: 0.0,
            ..LayoutParams::default()
        };
        let positions = layout(&matrix, &params, &mut rng());
        assert!(positions.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn relaxation_reduces_stress() {
        let rows = vec![
            vec![0.0, 0.2, 0.9, 0.8],
            vec![0.2, 0.0, 0.7, 0.9],
            vec![0.9, 0.7, 0.0, 0.1],
            vec![0.8, 0.9, 0.1, 0.0],
        ];
        let matrix = DistanceMatrix::from_rows(&rows).unwrap();

        let untouched = layout(
            &matrix,
            &LayoutParams {
                iterations: 0,
                ..LayoutParams::default()
            },
            &mut rng(),
        );
        let relaxed = layout(&matrix, &LayoutParams::default(), &mut rng());

        let scale = LayoutParams::default().scale_factor;
        assert!(stress(&matrix, &relaxed, scale) < stress(&matrix, &untouched, scale));
    }

    #[test]
    fn same_seed_same_layout() {
        let matrix = DistanceMatrix::uniform(5, 0.6);
        let a = layout(&matrix, &LayoutParams::default(), &mut rng());
        let b = layout(&matrix, &LayoutParams::default(), &mut rng());
        assert_eq!(a, b);
    }
}
