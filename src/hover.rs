//! Pointer hover lookup
//!
//! The renderer unprojects the pointer into a world-space ray; this module
//! finds the entity that ray passes closest to.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// A world-space pick ray
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit direction
    pub direction: Vec3,
}

impl Ray {
    /// Build a ray, normalizing `direction`; `None` for a zero or non-finite direction
    pub fn new(origin: Vec3, direction: Vec3) -> Option<Self> {
        let direction = direction.try_normalize()?;
        origin.is_finite().then_some(Self { origin, direction })
    }

    /// Perpendicular distance from `point` to the ray and the distance along it
    fn project(&self, point: Vec3) -> (f32, f32) {
        let along = (point - self.origin).dot(self.direction);
        let closest = self.origin + self.direction * along.max(0.0);
        (point.distance(closest), along)
    }
}

/// Index of the point nearest the ray origin among those within `pick_radius` of the ray
///
/// Points behind the origin are ignored.
pub fn pick(
    points: impl IntoIterator<Item = (usize, Vec3)>,
    ray: &Ray,
    pick_radius: f32,
) -> Option<usize> {
    points
        .into_iter()
        .filter_map(|(index, point)| {
            let (offset, along) = ray.project(point);
            (along >= 0.0 && offset <= pick_radius).then_some((index, along))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(index, _)| index)
}
