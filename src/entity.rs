//! The fixed particle pool
//!
//! Entities are allocated once and reused for every assembly. Only the
//! per-assembly attributes are overwritten when a new question arrives.

use glam::Vec3;
use serde::Serialize;

/// What an entity stands for in the current assembly
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Role {
    /// Directly projected from the word at `word` in the assembly space
    Core { word: usize },
    /// Generated around the core entity with pool index `parent`
    Satellite { parent: usize, distance_from_parent: f32 },
}

/// One visualizable unit
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: usize,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Laid-out position, set once per assembly
    pub target: Option<Vec3>,
    /// `None` while idle
    pub role: Option<Role>,
    /// Importance (a.k.a. curvature), 0-10 for core entities
    pub weight: f32,
    /// Distance from `target` to the centroid of all targets
    pub centrality: f32,
    /// Relative render size
    pub size: f32,
    /// 0 = invisible, 1 = fully visible
    pub opacity: f32,
    pub scale: f32,
    /// Resting position used while idle and as the decay destination
    pub rest: Vec3,
    /// Per-assembly attraction delay fraction in [0, 1)
    pub(crate) delay: f32,
    /// Per-assembly attraction strength multiplier
    pub(crate) strength: f32,
}

impl Entity {
    /// A fresh, invisible entity resting at `rest`
    pub fn new(id: usize, rest: Vec3) -> Self {
        Self {
            id,
            position: rest,
            velocity: Vec3::ZERO,
            target: None,
            role: None,
            weight: 0.0,
            centrality: 0.0,
            size: 1.0,
            opacity: 0.0,
            scale: 0.0,
            rest,
            delay: 0.0,
            strength: 1.0,
        }
    }

    pub fn is_core(&self) -> bool {
        matches!(self.role, Some(Role::Core { .. }))
    }

    /// Pool index of the parent core entity, for satellites only
    pub fn parent(&self) -> Option<usize> {
        match self.role {
            Some(Role::Satellite { parent, .. }) => Some(parent),
            _ => None,
        }
    }

    /// Index into the assembly's word list, for core entities only
    pub fn word_index(&self) -> Option<usize> {
        match self.role {
            Some(Role::Core { word }) => Some(word),
            _ => None,
        }
    }

    /// Clear every per-assembly attribute and go back to rest
    pub(crate) fn reset_to_rest(&mut self, rest: Vec3) {
        *self = Self::new(self.id, rest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entity_is_idle_and_invisible() {
        let e = Entity::new(3, Vec3::ONE);
        assert_eq!(e.id, 3);
        assert_eq!(e.position, Vec3::ONE);
        assert!(e.role.is_none());
        assert!(e.target.is_none());
        assert_eq!(e.opacity, 0.0);
        assert_eq!(e.scale, 0.0);
    }

    #[test]
    fn role_accessors() {
        let mut e = Entity::new(0, Vec3::ZERO);
        e.role = Some(Role::Core { word: 2 });
        assert!(e.is_core());
        assert_eq!(e.word_index(), Some(2));
        assert_eq!(e.parent(), None);

        e.role = Some(Role::Satellite {
            parent: 5,
            distance_from_parent: 1.5,
        });
        assert!(!e.is_core());
        assert_eq!(e.parent(), Some(5));
        assert_eq!(e.word_index(), None);
    }

    #[test]
    fn reset_keeps_identity() {
        let mut e = Entity::new(9, Vec3::ZERO);
        e.role = Some(Role::Core { word: 0 });
        e.target = Some(Vec3::X);
        e.weight = 4.0;
        e.reset_to_rest(Vec3::Y);

        assert_eq!(e.id, 9);
        assert_eq!(e.position, Vec3::Y);
        assert!(e.role.is_none());
        assert!(e.target.is_none());
        assert_eq!(e.weight, 0.0);
    }
}
