use rand::SeedableRng;
use rand::rngs::StdRng;

use wordfield::controller::{PhaseDurations, PoolParams};
use wordfield::progress::{ProgressEvent, Stage};
use wordfield::provider::{OfflineProvider, ScriptedProvider};
use wordfield::space::QUESTION_MARKER;
use wordfield::{AssemblyController, AssemblyError, Phase, WordfieldConfig};

const DT: f32 = 1.0 / 60.0;

fn short_config(seed: u64) -> WordfieldConfig {
    WordfieldConfig {
        seed: Some(seed),
        pool: PoolParams {
            size: 40,
            ..PoolParams::default()
        },
        timing: PhaseDurations {
            collapsing: 0.5,
            attracting: 1.0,
            connecting: 1.0,
            settling: 0.5,
            observed: 0.5,
            dwell: 1.0,
            decaying: 1.0,
            ..PhaseDurations::default()
        },
        ..WordfieldConfig::default()
    }
}

fn scripted() -> ScriptedProvider {
    ScriptedProvider::new(|prompt| {
        if prompt.contains(QUESTION_MARKER) {
            Ok("river, delta, silt, flood, estuary, current".to_string())
        } else if prompt.starts_with("Rate the semantic similarity") {
            Ok("0.8\n0.3\n0.6\n0.1\n0.5".to_string())
        } else if prompt.starts_with("Rate how central") {
            Ok("9\n6\n4\n7\n5\n8".to_string())
        } else {
            Ok("Rivers carry their history downstream.".to_string())
        }
    })
}

fn assembly_phases(events: &[ProgressEvent]) -> Vec<Phase> {
    let mut phases: Vec<Phase> = Vec::new();
    for event in events {
        if let Stage::Assembly(phase) = event.stage {
            if phases.last() != Some(&phase) {
                phases.push(phase);
            }
        }
    }
    phases
}

fn tick_for(controller: &mut AssemblyController, seconds: f32, events: &mut Vec<ProgressEvent>) {
    let ticks = (seconds / DT).ceil() as usize;
    for _ in 0..ticks {
        controller.tick(DT);
        events.extend(controller.drain_events());
    }
}

#[test]
fn full_cycle_returns_to_idle() {
    let mut controller = AssemblyController::new(short_config(1));
    controller.submit_question("How do deltas form?", &scripted()).unwrap();

    let mut events = controller.drain_events();
    let timing = controller.config().timing;
    let total = timing.until_observed() + timing.dwell + timing.decaying + 0.5;
    tick_for(&mut controller, total, &mut events);

    assert_eq!(controller.phase(), Phase::Idle);
    assert_eq!(
        assembly_phases(&events),
        vec![
            Phase::Collapsing,
            Phase::Attracting,
            Phase::Connecting,
            Phase::Settling,
            Phase::Observed,
            Phase::Decaying,
            Phase::Idle,
        ]
    );
    assert!(events.iter().any(|e| e.stage == Stage::Words));
    assert!(events.iter().any(|e| e.stage == Stage::Layout));

    // Idle entities carry nothing from the finished assembly
    assert!(controller.edges().is_empty());
    for entity in controller.entities() {
        assert_eq!(entity.opacity, 0.0);
        assert!(entity.role.is_none());
        assert!(entity.target.is_none());
    }
}

#[test]
fn observed_structure_matches_targets() {
    let mut controller = AssemblyController::new(short_config(2));
    controller.submit_question("How do deltas form?", &scripted()).unwrap();

    let mut events = Vec::new();
    let timing = controller.config().timing;
    tick_for(
        &mut controller,
        timing.until_observed() + timing.observed + 0.2,
        &mut events,
    );
    assert_eq!(controller.phase(), Phase::Observed);

    for entity in controller.entities() {
        let target = entity.target.unwrap();
        assert!(entity.position.distance(target) < 1e-4);
    }

    let summary = controller.summary().copied().unwrap();
    assert_eq!(summary.node_count, 40);
    let live = controller.analyze_now();
    assert_eq!(live.edge_count, summary.edge_count);

    let threshold = controller.config().connectivity.threshold;
    for edge in controller.edges() {
        let a = controller.entities()[edge.a].target.unwrap();
        let b = controller.entities()[edge.b].target.unwrap();
        assert!(a.distance(b) < threshold);
    }
}

#[test]
fn preemption_restarts_at_collapsing() {
    let mut controller = AssemblyController::new(short_config(3));
    controller.submit_question("How do deltas form?", &scripted()).unwrap();

    let mut events = Vec::new();
    let timing = controller.config().timing;
    tick_for(
        &mut controller,
        timing.collapsing + timing.attracting + timing.connecting + 0.1,
        &mut events,
    );
    assert_eq!(controller.phase(), Phase::Settling);

    controller.submit_question("What is silt?", &scripted()).unwrap();
    assert_eq!(controller.phase(), Phase::Collapsing);
    assert_eq!(controller.phase_progress(), 0.0);
    assert!(controller.edges().is_empty());
    assert!(
        !assembly_phases(&controller.drain_events()).contains(&Phase::Idle),
        "preemption must not pass through idle"
    );
}

#[test]
fn generation_can_run_outside_the_controller() {
    let mut controller = AssemblyController::new(short_config(4));
    let ticket = controller.begin("Where does silt go?").unwrap();

    // Ticks before the space arrives do not advance the assembly
    for _ in 0..30 {
        controller.tick(DT);
    }
    assert_eq!(controller.phase(), Phase::Collapsing);
    assert!(controller.is_awaiting_space());

    let mut rng = StdRng::seed_from_u64(9);
    let result = controller
        .space_builder()
        .build(&ticket.question, &scripted(), &mut (), &mut rng);
    assert!(controller.install_space(&ticket, result));
    assert!(!controller.is_awaiting_space());
    assert_eq!(controller.space().unwrap().words.len(), 6);
}

#[test]
fn same_seed_gives_same_frames() {
    let run = || {
        let mut controller = AssemblyController::new(short_config(5));
        controller.submit_question("How do deltas form?", &scripted()).unwrap();
        let mut events = Vec::new();
        tick_for(&mut controller, 2.0, &mut events);
        controller.snapshot()
    };

    assert_eq!(run(), run());
}

#[test]
fn offline_provider_assembles_with_defaults() {
    let mut controller = AssemblyController::new(short_config(6));
    controller
        .submit_question("Why does the river meet the sea?", &OfflineProvider)
        .unwrap();

    let space = controller.space().unwrap();
    assert!(space.words.contains(&"river".to_string()));
    assert!(space.words.contains(&"sea".to_string()));
    let default_importance = controller.config().space.default_importance;
    assert!(space.weights.iter().all(|w| *w == default_importance));

    let mut events = Vec::new();
    let timing = controller.config().timing;
    tick_for(&mut controller, timing.until_observed() + 0.2, &mut events);
    assert_eq!(controller.phase(), Phase::Observed);

    controller.explain_with(&OfflineProvider);
    let explanation = controller.explanation().unwrap();
    assert!(explanation.starts_with("The field settled into 40 nodes"));
}

#[test]
fn empty_word_list_fails_and_recovers() {
    let mut controller = AssemblyController::new(short_config(7));
    let empty = ScriptedProvider::new(|_| Ok("  ,  ,".to_string()));

    let err = controller.submit_question("anything", &empty).unwrap_err();
    assert!(matches!(err, AssemblyError::MalformedResponse(_)));
    assert_eq!(controller.phase(), Phase::Failed);
    insta::assert_snapshot!(
        controller.status(),
        @"Assembly failed: malformed response: word list response contained no words"
    );

    let mut events = Vec::new();
    let error_reset = controller.config().timing.error_reset;
    tick_for(&mut controller, error_reset + 0.1, &mut events);
    assert_eq!(controller.phase(), Phase::Idle);

    // The controller accepts the next question normally
    controller.submit_question("How do deltas form?", &scripted()).unwrap();
    assert_eq!(controller.phase(), Phase::Collapsing);
}
