//! Golden-angle satellite expansion
//!
//! Given the laid-out core entities, generates auxiliary points around them.
//! Placement and parent assignment are pure functions of the satellite index
//! and the core set: no random source is involved, so the same input always
//! yields the same satellites.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::geometry::{GOLDEN_ANGLE, centroid, spherical};

/// Pisano period of the Fibonacci sequence modulo 5
const FIB_MOD5_PERIOD: u64 = 20;

/// Polar angle cycle length
const PHI_CYCLE: usize = 89;

/// Parameters for [`expand`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionParams {
    /// Radius multiplier: `radius = sqrt(i + 1) * radius_scale * modulation`
    pub radius_scale: f32,
    /// Distance constant for weight inheritance
    pub weight_decay: f32,
    /// Distance constant for visual size inheritance
    pub size_decay: f32,
}

impl Default for ExpansionParams {
    fn default() -> Self {
        Self {
            radius_scale: 0.35,
            weight_decay: 5.0,
            size_decay: 3.0,
        }
    }
}

/// A laid-out core entity as seen by the expansion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoreSeed {
    pub position: Vec3,
    pub weight: f32,
}

/// A generated satellite
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Satellite {
    pub position: Vec3,
    pub weight: f32,
    /// Relative size, 1.0 at the parent
    pub size: f32,
    /// Distance to the centroid of the core positions
    pub centrality: f32,
    /// Index into the core slice
    pub parent: usize,
    pub distance_from_parent: f32,
}

/// Generate `count` satellites around `cores`
///
/// Returns an empty list when there are no cores to attach to.
pub fn expand(cores: &[CoreSeed], count: usize, params: &ExpansionParams) -> Vec<Satellite> {
    if cores.is_empty() {
        return Vec::new();
    }

    let cumulative = cumulative_weights(cores);
    let core_centroid = centroid(cores.iter().map(|c| &c.position));

    (0..count)
        .map(|i| {
            let theta = i as f32 * GOLDEN_ANGLE;
            let modulation = 1.0 + 0.05 * fib_mod5((i / 10) as u64 + 1) as f32;
            let radius = ((i + 1) as f32).sqrt() * params.radius_scale * modulation;
            let phi = (1.0 - 2.0 * (i % PHI_CYCLE) as f32 / PHI_CYCLE as f32).acos();

            let pick = (i % 100) as f32 / 100.0;
            let parent = pick_parent(&cumulative, pick);
            let seed = &cores[parent];

            let position = seed.position + spherical(radius, theta, phi);
            let distance_from_parent = position.distance(seed.position);

            Satellite {
                position,
                weight: seed.weight.max(0.0) * (-distance_from_parent / params.weight_decay).exp(),
                size: (-distance_from_parent / params.size_decay).exp(),
                centrality: position.distance(core_centroid),
                parent,
                distance_from_parent,
            }
        })
        .collect()
}

/// Normalized cumulative distribution over core weights
///
/// Falls back to a uniform distribution when no core has positive weight.
fn cumulative_weights(cores: &[CoreSeed]) -> Vec<f32> {
    let total: f32 = cores.iter().map(|c| c.weight.max(0.0)).sum();
    let mut acc = 0.0;
    cores
        .iter()
        .map(|c| {
            acc += if total > 0.0 {
                c.weight.max(0.0) / total
            } else {
                1.0 / cores.len() as f32
            };
            acc
        })
        .collect()
}

/// First index whose cumulative probability exceeds `value`
fn pick_parent(cumulative: &[f32], value: f32) -> usize {
    cumulative
        .iter()
        .position(|&c| value < c)
        .unwrap_or(cumulative.len().saturating_sub(1))
}

/// `fib(n) % 5` with `fib(1) = fib(2) = 1`
fn fib_mod5(n: u64) -> u64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..(n % FIB_MOD5_PERIOD) {
        let next = (a + b) % 5;
        a = b;
        b = next;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeds() -> Vec<CoreSeed> {
        vec![
            CoreSeed {
                position: Vec3::new(-5.0, 0.0, 0.0),
                weight: 8.0,
            },
            CoreSeed {
                position: Vec3::new(4.0, 2.0, 1.0),
                weight: 2.0,
            },
            CoreSeed {
                position: Vec3::new(0.0, -3.0, 6.0),
                weight: 0.5,
            },
        ]
    }

    #[test]
    fn fibonacci_mod_five() {
        let naive = [0u64, 1, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144];
        for (n, f) in naive.iter().enumerate() {
            assert_eq!(fib_mod5(n as u64), f % 5, "fib({n})");
        }
        // Period 20
        assert_eq!(fib_mod5(27), fib_mod5(7));
    }

    #[test]
    fn single_core_single_satellite() {
        let cores = [CoreSeed {
            position: Vec3::ZERO,
            weight: 10.0,
        }];
        let out = expand(&cores, 1, &ExpansionParams::default());

        assert_eq!(out.len(), 1);
        let s = out[0];
        assert_eq!(s.parent, 0);
        assert!((s.distance_from_parent - s.position.distance(Vec3::ZERO)).abs() < 1e-6);
        assert!(s.distance_from_parent > 0.0);
    }

    #[test]
    fn expansion_is_deterministic() {
        let params = ExpansionParams::default();
        let a = expand(&seeds(), 150, &params);
        let b = expand(&seeds(), 150, &params);
        assert_eq!(a, b);
    }

    #[test]
    fn decay_never_amplifies() {
        let cores = seeds();
        for s in expand(&cores, 200, &ExpansionParams::default()) {
            assert!(s.distance_from_parent >= 0.0);
            assert!(s.weight <= cores[s.parent].weight);
            assert!(s.size <= 1.0);
            assert!(s.position.is_finite());
        }
    }

    #[test]
    fn heavier_cores_attract_more_satellites() {
        let cores = seeds();
        let out = expand(&cores, 100, &ExpansionParams::default());
        let count = |p: usize| out.iter().filter(|s| s.parent == p).count();

        assert_eq!(out.len(), 100);
        assert!(count(0) > count(1));
        assert!(count(1) > count(2));
    }

    #[test]
    fn zero_weights_spread_uniformly() {
        let cores = vec![
            CoreSeed {
                position: Vec3::ZERO,
                weight: 0.0,
            };
            4
        ];
        let out = expand(&cores, 100, &ExpansionParams::default());
        for p in 0..4 {
            assert_eq!(out.iter().filter(|s| s.parent == p).count(), 25);
        }
    }

    #[test]
    fn no_cores_no_satellites() {
        assert!(expand(&[], 10, &ExpansionParams::default()).is_empty());
    }

    #[test]
    fn centrality_is_distance_to_core_centroid() {
        let cores = seeds();
        let center = centroid(cores.iter().map(|c| &c.position));
        for s in expand(&cores, 20, &ExpansionParams::default()) {
            assert!((s.centrality - s.position.distance(center)).abs() < 1e-5);
        }
    }
}
