//! Assembly state machine
//!
//! Sequences the entity pool from rest, through the staged assembly phases,
//! into the laid-out structure and back again:
//!
//! ```text
//! Idle -> Collapsing -> Attracting -> Connecting -> Settling -> Observed -> Decaying -> Idle
//! ```
//!
//! The controller is driven by [`AssemblyController::tick`] once per frame.
//! Phase completion is measured in elapsed seconds, not frames. A new question
//! preempts whatever is running and restarts at `Collapsing`.
//!
//! Per-tick constants are tuned for 60 Hz and scaled by the real frame time.

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::WordfieldConfig;
use crate::connectivity::{Edge, EdgeSet, compute_candidates};
use crate::entity::{Entity, Role};
use crate::error::{AssemblyError, AssemblyResult};
use crate::expansion::{CoreSeed, expand};
use crate::geometry::{centroid, jitter, random_in_ball, random_in_cube};
use crate::hover::{Ray, pick};
use crate::progress::{ProgressEvent, Stage};
use crate::provider::{CompletionProvider, ProviderError, ProviderResult};
use crate::snapshot::{EdgeView, EntityView, FrameSnapshot, HOVER_MIN_OPACITY};
use crate::space::{AssemblySpace, SpaceBuilder, explanation_prompt, fallback_explanation};
use crate::topology::{TopologySummary, analyze};

/// Velocity jitter while collapsing, per tick
const COLLAPSE_JITTER: f32 = 0.02;
const COLLAPSE_DAMPING: f32 = 0.95;

/// Spring rate toward the target while attracting
const ATTRACT_RATE: f32 = 0.02;
const ATTRACT_DAMPING_START: f32 = 0.98;
const ATTRACT_DAMPING_END: f32 = 0.93;
/// Largest per-entity attraction delay fraction
const ATTRACT_MAX_DELAY: f32 = 0.3;

const CONNECT_RATE: f32 = 0.05;
/// Pull toward neighbours within the cluster radius, scaled by phase progress
const CLUSTER_RATE: f32 = 0.002;
const CONNECT_DAMPING: f32 = 0.9;

const SETTLE_RATE: f32 = 0.08;
const SETTLE_DAMPING_START: f32 = 0.85;
const SETTLE_DAMPING_END: f32 = 0.75;

/// Fraction of the remaining distance kept per tick while observing
const OBSERVE_RETAIN: f32 = 0.9;

/// Interpolation rate toward the resting target while decaying
const DECAY_RATE: f32 = 0.05;

/// States of the assembly machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Resting, invisible potential
    Idle,
    Collapsing,
    Attracting,
    Connecting,
    Settling,
    /// End of the forward path; dwells until decay starts
    Observed,
    Decaying,
    /// Space generation failed; returns to `Idle` shortly
    Failed,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Collapsing => "collapsing",
            Phase::Attracting => "attracting",
            Phase::Connecting => "connecting",
            Phase::Settling => "settling",
            Phase::Observed => "observed",
            Phase::Decaying => "decaying",
            Phase::Failed => "failed",
        }
    }

    /// True for every phase between a question and the end of decay
    pub fn is_active(&self) -> bool {
        !matches!(self, Phase::Idle | Phase::Failed)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Phase durations in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseDurations {
    pub collapsing: f32,
    pub attracting: f32,
    pub connecting: f32,
    pub settling: f32,
    /// Final snap toward targets
    pub observed: f32,
    /// Time spent observed before decay starts
    pub dwell: f32,
    pub decaying: f32,
    /// Time the failure message stays up before returning to idle
    pub error_reset: f32,
    /// Longest wait for the word list before the assembly is abandoned
    pub generation_timeout: f32,
}

impl Default for PhaseDurations {
    fn default() -> Self {
        Self {
            collapsing: 1.0,
            attracting: 2.5,
            connecting: 3.0,
            settling: 2.0,
            observed: 1.0,
            dwell: 30.0,
            decaying: 5.0,
            error_reset: 2.0,
            generation_timeout: 120.0,
        }
    }
}

impl PhaseDurations {
    /// Seconds from the start of collapse until `Observed` is entered
    pub fn until_observed(&self) -> f32 {
        self.collapsing + self.attracting + self.connecting + self.settling
    }
}

/// Entity pool settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolParams {
    /// Number of entities, fixed for the controller's lifetime
    pub size: usize,
    /// Side of the cube holding the idle distribution
    pub idle_extent: f32,
    /// Radius of the ball entities decay toward
    pub rest_radius: f32,
    /// Hover pick radius around the pointer ray
    pub pick_radius: f32,
}

impl Default for PoolParams {
    fn default() -> Self {
        Self {
            size: 200,
            idle_extent: 30.0,
            rest_radius: 15.0,
            pick_radius: 0.6,
        }
    }
}

/// Identifies one assembly; stale tickets are ignored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyTicket {
    pub epoch: u64,
    pub question: String,
}

/// Commentary the host should request from the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplanationRequest {
    pub epoch: u64,
    pub prompt: String,
}

/// Result of a hover lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoverHit {
    pub entity: usize,
    pub word: String,
    pub weight: f32,
}

/// All mutable simulation state, owned by the controller
#[derive(Debug)]
pub struct SimulationContext {
    pub entities: Vec<Entity>,
    pub edges: EdgeSet,
    pub space: Option<AssemblySpace>,
    pub rng: StdRng,
    /// Seconds since the current assembly began
    pub clock: f32,
}

impl SimulationContext {
    fn new(pool: &PoolParams, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let entities = (0..pool.size)
            .map(|id| Entity::new(id, random_in_cube(&mut rng, pool.idle_extent)))
            .collect();

        Self {
            entities,
            edges: EdgeSet::default(),
            space: None,
            rng,
            clock: 0.0,
        }
    }

    /// Overwrite every entity's per-assembly attributes from `space`
    fn assign(&mut self, space: &AssemblySpace, config: &WordfieldConfig) {
        let pool = self.entities.len();
        let core_count = space.len().min(pool);
        if core_count < space.len() {
            warn!(
                words = space.len(),
                pool, "more words than entities, extra words are not placed"
            );
        }

        let seeds: Vec<CoreSeed> = (0..core_count)
            .map(|k| CoreSeed {
                position: space.positions[k],
                weight: space.weights[k],
            })
            .collect();
        let satellites = expand(&seeds, pool - core_count, &config.expansion);

        for (k, entity) in self.entities.iter_mut().enumerate() {
            entity.delay = 0.0;
            entity.strength = 1.0;
            if k < core_count {
                entity.role = Some(Role::Core { word: k });
                entity.target = Some(space.positions[k]);
                entity.weight = space.weights[k];
                entity.size = 1.0;
            } else if let Some(s) = satellites.get(k - core_count) {
                // Cores occupy the first pool slots, so the core index is the pool index
                entity.role = Some(Role::Satellite {
                    parent: s.parent,
                    distance_from_parent: s.distance_from_parent,
                });
                entity.target = Some(s.position);
                entity.weight = s.weight;
                entity.size = s.size;
            } else {
                entity.role = None;
                entity.target = None;
                entity.weight = 0.0;
                entity.size = 0.0;
            }
        }

        let center = centroid(self.entities.iter().filter_map(|e| e.target.as_ref()));
        for entity in &mut self.entities {
            entity.centrality = entity.target.map_or(0.0, |t| t.distance(center));
        }

        let candidates = compute_candidates(&self.entities, config.connectivity.threshold);
        debug!(
            cores = core_count,
            satellites = satellites.len(),
            candidates = candidates.len(),
            "assembly space assigned"
        );
        self.edges = EdgeSet::new(candidates);
    }

    /// Entities go invisible at a freshly randomized resting position
    fn rest(&mut self, pool: &PoolParams) {
        for entity in &mut self.entities {
            let rest = random_in_cube(&mut self.rng, pool.idle_extent);
            entity.reset_to_rest(rest);
        }
        self.edges.clear();
        self.space = None;
    }

    fn update_collapsing(&mut self, progress: f32, step: f32) {
        let n = self.entities.len().max(1) as f32;
        let damping = COLLAPSE_DAMPING.powf(step);
        let magnitude = COLLAPSE_JITTER * (1.0 - progress);

        for (k, entity) in self.entities.iter_mut().enumerate() {
            let start = k as f32 / n * 0.5;
            let appear = ((progress - start) / 0.5).clamp(0.0, 1.0);
            entity.opacity = appear;
            entity.scale = appear;

            entity.velocity += jitter(&mut self.rng, magnitude) * step;
            entity.velocity *= damping;
            entity.position += entity.velocity * step;
        }
    }

    fn prepare_attraction(&mut self) {
        for entity in &mut self.entities {
            entity.delay = self.rng.gen_range(0.0..ATTRACT_MAX_DELAY);
            entity.strength = self.rng.gen_range(0.6..=1.0);
        }
    }

    fn update_attracting(&mut self, progress: f32, step: f32) {
        let damping = (ATTRACT_DAMPING_START
            + (ATTRACT_DAMPING_END - ATTRACT_DAMPING_START) * progress)
            .powf(step);

        for entity in &mut self.entities {
            entity.opacity = 1.0;
            entity.scale = 1.0;
            if let Some(target) = entity.target {
                let ramp = ((progress - entity.delay) / (1.0 - entity.delay)).clamp(0.0, 1.0);
                let force = (target - entity.position) * ATTRACT_RATE * ramp * entity.strength;
                entity.velocity += force * step;
            }
            entity.velocity *= damping;
            entity.position += entity.velocity * step;
        }
    }

    fn update_connecting(&mut self, progress: f32, step: f32, config: &WordfieldConfig) {
        let radius_sq = config.connectivity.cluster_radius * config.connectivity.cluster_radius;
        let damping = CONNECT_DAMPING.powf(step);

        // Forces read last frame's committed positions
        let positions: Vec<Vec3> = self.entities.iter().map(|e| e.position).collect();
        for (i, entity) in self.entities.iter_mut().enumerate() {
            let mut force = Vec3::ZERO;
            if let Some(target) = entity.target {
                force += (target - positions[i]) * CONNECT_RATE;
            }

            let mut pull = Vec3::ZERO;
            for (j, other) in positions.iter().enumerate() {
                if i == j {
                    continue;
                }
                let delta = *other - positions[i];
                if delta.length_squared() < radius_sq {
                    pull += delta;
                }
            }
            force += pull * CLUSTER_RATE * progress;

            entity.velocity += force * step;
            entity.velocity *= damping;
            entity.position += entity.velocity * step;
        }

        self.edges
            .advance_formation(&self.entities, self.clock, step, &config.connectivity);
        self.edges.sync(
            &self.entities,
            self.clock,
            config.connectivity.growth_seconds,
        );
    }

    /// Consider every candidate the frame budget did not reach
    fn finish_connecting(&mut self, config: &WordfieldConfig) {
        let formed = self
            .edges
            .finish_formation(&self.entities, self.clock, &config.connectivity);
        if formed > 0 {
            debug!(formed, "formed remaining edges at end of connecting");
        }
        self.edges.sync(
            &self.entities,
            self.clock,
            config.connectivity.growth_seconds,
        );
    }

    fn update_settling(&mut self, progress: f32, step: f32, growth_seconds: f32) {
        let damping = (SETTLE_DAMPING_START
            + (SETTLE_DAMPING_END - SETTLE_DAMPING_START) * progress)
            .powf(step);

        for entity in &mut self.entities {
            if let Some(target) = entity.target {
                entity.velocity += (target - entity.position) * SETTLE_RATE * step;
            }
            entity.velocity *= damping;
            entity.position += entity.velocity * step;
        }
        self.edges.sync(&self.entities, self.clock, growth_seconds);
    }

    fn update_observed(&mut self, progress: f32, step: f32, growth_seconds: f32) {
        let blend = 1.0 - OBSERVE_RETAIN.powf(step);
        for entity in &mut self.entities {
            entity.velocity = Vec3::ZERO;
            if let Some(target) = entity.target {
                entity.position = if progress >= 1.0 {
                    target
                } else {
                    entity.position.lerp(target, blend)
                };
            }
        }
        self.edges.sync(&self.entities, self.clock, growth_seconds);
        self.edges.intensify(progress);
    }

    /// Pick a resting destination for every entity
    fn prepare_decay(&mut self, pool: &PoolParams) {
        for entity in &mut self.entities {
            entity.rest = random_in_ball(&mut self.rng, pool.rest_radius);
        }
    }

    fn update_decaying(&mut self, progress: f32, step: f32, growth_seconds: f32) {
        let rate = (progress * DECAY_RATE * step).min(1.0);
        for entity in &mut self.entities {
            entity.velocity = Vec3::ZERO;
            entity.position += (entity.rest - entity.position) * rate;
            entity.opacity = 1.0 - progress;
            entity.scale = 1.0 - progress;
        }
        self.edges.sync(&self.entities, self.clock, growth_seconds);
        self.edges.fade(1.0 - progress);
    }
}

/// The assembly state machine
///
/// Single writer of the entity pool, edge set and current space. Renderers
/// and analysis read through the accessors or [`AssemblyController::snapshot`].
#[derive(Debug)]
pub struct AssemblyController {
    config: WordfieldConfig,
    ctx: SimulationContext,
    phase: Phase,
    /// Seconds since the current phase began
    phase_elapsed: f32,
    /// Seconds spent observed, excluding paused time
    dwell_elapsed: f32,
    epoch: u64,
    question: Option<String>,
    awaiting_space: bool,
    /// True until the word list of the pending space is known
    awaiting_words: bool,
    paused: bool,
    decay_prepared: bool,
    summary: Option<TopologySummary>,
    explanation: Option<String>,
    pending_explanation: Option<ExplanationRequest>,
    status: String,
    events: Vec<ProgressEvent>,
}

impl AssemblyController {
    pub fn new(config: WordfieldConfig) -> Self {
        let ctx = SimulationContext::new(&config.pool, config.seed);
        Self {
            config,
            ctx,
            phase: Phase::Idle,
            phase_elapsed: 0.0,
            dwell_elapsed: 0.0,
            epoch: 0,
            question: None,
            awaiting_space: false,
            awaiting_words: false,
            paused: false,
            decay_prepared: false,
            summary: None,
            explanation: None,
            pending_explanation: None,
            status: idle_status().to_string(),
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &WordfieldConfig {
        &self.config
    }

    /// Space builder configured from this controller's settings
    pub fn space_builder(&self) -> SpaceBuilder {
        SpaceBuilder::new(self.config.space, self.config.layout)
    }

    /// Start a new assembly for `question`
    ///
    /// Cancels whatever is running: timers restart, edges are discarded and
    /// the pause flag is cleared. The returned ticket must accompany the space
    /// passed to [`install_space`](Self::install_space). An empty question is
    /// rejected without any state change.
    pub fn begin(&mut self, question: &str) -> AssemblyResult<AssemblyTicket> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AssemblyError::InvalidInput("question is empty".to_string()));
        }

        if self.phase != Phase::Idle {
            info!(from = %self.phase, "preempting current assembly");
        }
        self.cancel();
        self.epoch += 1;
        self.question = Some(question.to_string());
        self.awaiting_space = true;
        self.awaiting_words = true;
        self.ctx.clock = 0.0;
        self.enter(Phase::Collapsing);
        self.status = "Generating concepts".to_string();

        info!(epoch = self.epoch, question, "assembly started");
        Ok(AssemblyTicket {
            epoch: self.epoch,
            question: question.to_string(),
        })
    }

    /// Hand over the generated space for `ticket`
    ///
    /// Returns `false` when the ticket is stale (a newer question arrived or
    /// the controller was reset) and the result was ignored.
    pub fn install_space(
        &mut self,
        ticket: &AssemblyTicket,
        result: AssemblyResult<AssemblySpace>,
    ) -> bool {
        if ticket.epoch != self.epoch || !self.awaiting_space {
            debug!(
                ticket = ticket.epoch,
                current = self.epoch,
                "ignoring stale assembly space"
            );
            return false;
        }

        self.awaiting_space = false;
        self.awaiting_words = false;
        match result {
            Ok(space) => {
                self.ctx.assign(&space, &self.config);
                self.ctx.space = Some(space);
                self.phase_elapsed = 0.0;
                self.status = status_for(Phase::Collapsing).to_string();
                self.events.push(ProgressEvent::new(
                    Stage::Assembly(Phase::Collapsing),
                    0.0,
                    self.status.clone(),
                ));
            }
            Err(e) => self.fail(&e),
        }
        true
    }

    /// Note that the word list for `ticket` has arrived
    ///
    /// The generation timeout stops running; rating stages fall back to
    /// defaults on their own budget. Returns `false` for a stale ticket.
    pub fn words_ready(&mut self, ticket: &AssemblyTicket) -> bool {
        if ticket.epoch != self.epoch || !self.awaiting_space {
            return false;
        }
        if self.awaiting_words {
            debug!(epoch = ticket.epoch, "word list ready, generation timeout stopped");
        }
        self.awaiting_words = false;
        true
    }

    /// Generate the space synchronously with `provider` and start assembling
    ///
    /// Returns the abort reason when the word list could not be generated; the
    /// controller is then in `Failed` and returns to `Idle` on its own.
    pub fn submit_question(
        &mut self,
        question: &str,
        provider: &dyn CompletionProvider,
    ) -> AssemblyResult<()> {
        let ticket = self.begin(question)?;
        let builder = self.space_builder();
        let mut progress: Vec<ProgressEvent> = Vec::new();
        let result = builder.build(&ticket.question, provider, &mut progress, &mut self.ctx.rng);
        self.events.extend(progress);

        let outcome = match &result {
            Ok(_) => Ok(()),
            Err(e) => Err(e.clone()),
        };
        self.install_space(&ticket, result);
        outcome
    }

    /// Return to `Idle` immediately
    pub fn reset(&mut self) {
        info!(from = %self.phase, "reset requested");
        self.cancel();
        self.epoch += 1;
        self.go_idle();
    }

    /// Pause or resume decay
    ///
    /// Only the observed dwell and the decaying phase honour the flag; the
    /// forward assembly always runs to completion.
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            info!(paused, phase = %self.phase, "decay pause toggled");
        }
        self.paused = paused;
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.set_paused(!self.paused);
        self.paused
    }

    /// Advance the simulation by `dt` seconds of wall-clock time
    pub fn tick(&mut self, dt: f32) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }
        let step = (dt * 60.0).clamp(0.25, 3.0);
        self.ctx.clock += dt;
        let growth = self.config.connectivity.growth_seconds;
        let timing = self.config.timing;

        match self.phase {
            Phase::Idle => {}
            Phase::Collapsing if self.awaiting_space => {
                if self.awaiting_words {
                    self.phase_elapsed += dt;
                }
                if self.phase_elapsed >= timing.generation_timeout {
                    self.awaiting_space = false;
                    self.awaiting_words = false;
                    self.fail(&AssemblyError::ProviderFailure(ProviderError::Timeout));
                }
            }
            Phase::Collapsing => {
                let progress = self.advance(dt, timing.collapsing);
                self.ctx.update_collapsing(progress, step);
                if progress >= 1.0 {
                    self.ctx.prepare_attraction();
                    self.enter(Phase::Attracting);
                }
            }
            Phase::Attracting => {
                let progress = self.advance(dt, timing.attracting);
                self.ctx.update_attracting(progress, step);
                if progress >= 1.0 {
                    self.enter(Phase::Connecting);
                }
            }
            Phase::Connecting => {
                let progress = self.advance(dt, timing.connecting);
                self.ctx.update_connecting(progress, step, &self.config);
                if progress >= 1.0 {
                    self.ctx.finish_connecting(&self.config);
                    self.enter(Phase::Settling);
                }
            }
            Phase::Settling => {
                let progress = self.advance(dt, timing.settling);
                self.ctx.update_settling(progress, step, growth);
                if progress >= 1.0 {
                    self.enter(Phase::Observed);
                }
            }
            Phase::Observed => {
                let progress = self.advance(dt, timing.observed);
                self.ctx.update_observed(progress, step, growth);
                if !self.paused {
                    self.dwell_elapsed += dt;
                }
                if self.dwell_elapsed >= timing.dwell {
                    self.enter(Phase::Decaying);
                }
            }
            Phase::Decaying => {
                if !self.paused {
                    self.phase_elapsed += dt;
                }
                let progress = fraction(self.phase_elapsed, timing.decaying);
                self.ctx.update_decaying(progress, step, growth);
                if progress >= 1.0 {
                    self.go_idle();
                }
            }
            Phase::Failed => {
                if self.advance(dt, timing.error_reset) >= 1.0 {
                    self.go_idle();
                }
            }
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Progress through the current phase in [0, 1]
    pub fn phase_progress(&self) -> f32 {
        let timing = &self.config.timing;
        let duration = match self.phase {
            Phase::Idle => return 0.0,
            Phase::Collapsing if self.awaiting_space => return 0.0,
            Phase::Collapsing => timing.collapsing,
            Phase::Attracting => timing.attracting,
            Phase::Connecting => timing.connecting,
            Phase::Settling => timing.settling,
            Phase::Observed => timing.observed,
            Phase::Decaying => timing.decaying,
            Phase::Failed => timing.error_reset,
        };
        fraction(self.phase_elapsed, duration)
    }

    /// True while a question is waiting for its space
    pub fn is_awaiting_space(&self) -> bool {
        self.awaiting_space
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Human-readable status line
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn question(&self) -> Option<&str> {
        self.question.as_deref()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.ctx.entities
    }

    /// Formed edges
    pub fn edges(&self) -> &[Edge] {
        self.ctx.edges.edges()
    }

    pub fn edge_set(&self) -> &EdgeSet {
        &self.ctx.edges
    }

    /// Current assembly space, if an assembly is in flight
    pub fn space(&self) -> Option<&AssemblySpace> {
        self.ctx.space.as_ref()
    }

    /// Summary computed when the last assembly was observed
    pub fn summary(&self) -> Option<&TopologySummary> {
        self.summary.as_ref()
    }

    /// Summary of the current entity and edge state
    pub fn analyze_now(&self) -> TopologySummary {
        analyze(&self.ctx.entities, self.ctx.edges.edges())
    }

    /// Commentary on the last observed structure
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    /// Take the pending commentary request, if any
    pub fn take_explanation_request(&mut self) -> Option<ExplanationRequest> {
        self.pending_explanation.take()
    }

    /// Record the provider's answer to an explanation request
    ///
    /// Failures and empty answers are replaced by a deterministic fallback.
    /// Answers for a previous assembly are ignored.
    pub fn fulfil_explanation(&mut self, epoch: u64, result: ProviderResult<String>) -> bool {
        if epoch != self.epoch {
            return false;
        }
        let Some(summary) = self.summary else {
            return false;
        };

        let text = match result {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => fallback_explanation(&summary),
            Err(e) => {
                warn!(error = %e, "explanation failed, using fallback");
                fallback_explanation(&summary)
            }
        };
        self.explanation = Some(text);
        true
    }

    /// Resolve a pending explanation request synchronously
    pub fn explain_with(&mut self, provider: &dyn CompletionProvider) {
        if let Some(request) = self.take_explanation_request() {
            let result = provider.complete(&request.prompt);
            self.fulfil_explanation(request.epoch, result);
        }
    }

    /// Drain progress events emitted since the last call
    pub fn drain_events(&mut self) -> Vec<ProgressEvent> {
        std::mem::take(&mut self.events)
    }

    /// Visible core entity under the pointer ray
    pub fn hover(&self, ray: &Ray) -> Option<HoverHit> {
        let space = self.ctx.space.as_ref()?;
        let candidates = self
            .ctx
            .entities
            .iter()
            .filter(|e| e.is_core() && e.opacity > HOVER_MIN_OPACITY)
            .map(|e| (e.id, e.position));
        let id = pick(candidates, ray, self.config.pool.pick_radius)?;

        let entity = &self.ctx.entities[id];
        let word = space.words.get(entity.word_index()?)?.clone();
        Some(HoverHit {
            entity: id,
            word,
            weight: entity.weight,
        })
    }

    /// Render-ready copy of the current state
    pub fn snapshot(&self) -> FrameSnapshot {
        let words = self.ctx.space.as_ref().map(|s| &s.words);
        let entities = self
            .ctx
            .entities
            .iter()
            .map(|e| EntityView {
                id: e.id,
                position: e.position,
                opacity: e.opacity,
                scale: e.scale,
                size: e.size,
                weight: e.weight,
                role: e.role,
                word: e
                    .word_index()
                    .and_then(|k| words.and_then(|w| w.get(k)).cloned()),
            })
            .collect();

        let edges = self
            .ctx
            .edges
            .edges()
            .iter()
            .filter_map(|edge| {
                let from = self.ctx.entities.get(edge.a)?.position;
                let to = self.ctx.entities.get(edge.b)?.position;
                Some(EdgeView {
                    a: edge.a,
                    b: edge.b,
                    from,
                    to,
                    growth: edge.growth,
                    intensity: edge.intensity,
                    opacity: edge.opacity,
                })
            })
            .collect();

        FrameSnapshot {
            phase: self.phase,
            phase_progress: self.phase_progress(),
            status: self.status.clone(),
            paused: self.paused,
            question: self.question.clone(),
            entities,
            edges,
            summary: self.summary,
            explanation: self.explanation.clone(),
        }
    }

    /// Accumulate `dt` into the phase clock and return progress in [0, 1]
    fn advance(&mut self, dt: f32, duration: f32) -> f32 {
        self.phase_elapsed += dt;
        fraction(self.phase_elapsed, duration)
    }

    /// Drop everything tied to the current assembly
    fn cancel(&mut self) {
        self.ctx.edges.clear();
        self.ctx.space = None;
        self.awaiting_space = false;
        self.awaiting_words = false;
        self.paused = false;
        self.decay_prepared = false;
        self.dwell_elapsed = 0.0;
        self.pending_explanation = None;
        self.explanation = None;
    }

    fn enter(&mut self, phase: Phase) {
        if phase != self.phase {
            info!(from = %self.phase, to = %phase, "phase transition");
        }
        self.phase = phase;
        self.phase_elapsed = 0.0;

        match phase {
            Phase::Observed => self.on_observed(),
            Phase::Decaying => {
                if !self.decay_prepared {
                    self.ctx.prepare_decay(&self.config.pool);
                    self.decay_prepared = true;
                }
            }
            _ => {}
        }

        if phase != Phase::Observed {
            self.status = status_for(phase).to_string();
        }
        self.events.push(ProgressEvent::new(
            Stage::Assembly(phase),
            0.0,
            self.status.clone(),
        ));
    }

    fn on_observed(&mut self) {
        self.dwell_elapsed = 0.0;
        let summary = analyze(&self.ctx.entities, self.ctx.edges.edges());
        info!(
            nodes = summary.node_count,
            edges = summary.edge_count,
            density = summary.density,
            "structure observed"
        );

        self.pending_explanation = self.ctx.space.as_ref().map(|space| ExplanationRequest {
            epoch: self.epoch,
            prompt: explanation_prompt(space, &summary),
        });
        self.status = format!(
            "Observed: {} nodes, {} connections",
            summary.node_count, summary.edge_count
        );
        self.summary = Some(summary);
    }

    fn fail(&mut self, error: &AssemblyError) {
        warn!(%error, "assembly aborted");
        self.ctx.edges.clear();
        self.ctx.space = None;
        self.enter(Phase::Failed);
        self.status = format!("Assembly failed: {error}");
        if let Some(event) = self.events.last_mut() {
            event.message = self.status.clone();
        }
    }

    fn go_idle(&mut self) {
        self.ctx.rest(&self.config.pool);
        self.awaiting_space = false;
        self.awaiting_words = false;
        self.paused = false;
        self.decay_prepared = false;
        self.dwell_elapsed = 0.0;
        self.question = None;
        self.enter(Phase::Idle);
    }
}

fn fraction(elapsed: f32, duration: f32) -> f32 {
    if duration <= 0.0 {
        1.0
    } else {
        (elapsed / duration).clamp(0.0, 1.0)
    }
}

fn idle_status() -> &'static str {
    "Ask a question to assemble a field"
}

fn status_for(phase: Phase) -> &'static str {
    match phase {
        Phase::Idle => idle_status(),
        Phase::Collapsing => "Collapsing potential",
        Phase::Attracting => "Attracting toward meaning",
        Phase::Connecting => "Forming connections",
        Phase::Settling => "Settling structure",
        Phase::Observed => "Observed",
        Phase::Decaying => "Decaying back to potential",
        Phase::Failed => "Assembly failed",
    }
}
