//! Per-frame view handed to the rendering collaborator

use glam::Vec3;
use serde::Serialize;

use crate::controller::Phase;
use crate::entity::Role;
use crate::hover::{Ray, pick};
use crate::topology::TopologySummary;

/// Entities fainter than this cannot be hovered
pub const HOVER_MIN_OPACITY: f32 = 0.05;

/// Render-relevant state of one entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityView {
    pub id: usize,
    pub position: Vec3,
    pub opacity: f32,
    pub scale: f32,
    pub size: f32,
    pub weight: f32,
    pub role: Option<Role>,
    /// Word for core entities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
}

/// Render-relevant state of one formed edge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeView {
    pub a: usize,
    pub b: usize,
    pub from: Vec3,
    pub to: Vec3,
    pub growth: f32,
    pub intensity: f32,
    pub opacity: f32,
}

/// Everything a renderer or status panel needs for one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameSnapshot {
    pub phase: Phase,
    /// Progress through the current phase in [0, 1]
    pub phase_progress: f32,
    pub status: String,
    pub paused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    pub entities: Vec<EntityView>,
    pub edges: Vec<EdgeView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<TopologySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl FrameSnapshot {
    /// Visible core entity under `ray`, with its word
    pub fn hover(&self, ray: &Ray, pick_radius: f32) -> Option<&EntityView> {
        let candidates = self
            .entities
            .iter()
            .filter(|e| e.word.is_some() && e.opacity > HOVER_MIN_OPACITY)
            .map(|e| (e.id, e.position));
        let id = pick(candidates, ray, pick_radius)?;
        self.entities.iter().find(|e| e.id == id)
    }
}
