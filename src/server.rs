use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use glam::Vec3;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

use wordfield::controller::{AssemblyTicket, ExplanationRequest};
use wordfield::hover::Ray;
use wordfield::progress::{ProgressEvent, Stage};
use wordfield::provider::{CompletionProvider, ProviderResult};
use wordfield::snapshot::FrameSnapshot;
use wordfield::space::AssemblySpace;
use wordfield::{AssemblyController, AssemblyResult, WordfieldConfig};

/// Events kept for `GET /events`
const EVENT_LOG_CAPACITY: usize = 256;

pub struct ServeOptions {
    pub port: u16,
    pub static_dir: Option<PathBuf>,
    pub fps: u32,
}

/// Work for the frame loop, the only writer of the controller
enum Command {
    Question {
        question: String,
        reply: oneshot::Sender<Result<u64, String>>,
    },
    Reset,
    Pause {
        paused: Option<bool>,
        reply: oneshot::Sender<bool>,
    },
    WordsReady {
        ticket: AssemblyTicket,
    },
    SpaceReady {
        ticket: AssemblyTicket,
        result: AssemblyResult<AssemblySpace>,
    },
    Explained {
        epoch: u64,
        result: ProviderResult<String>,
    },
}

/// Bounded, sequence-numbered progress history
#[derive(Debug, Default)]
pub struct EventLog {
    next: u64,
    entries: VecDeque<(u64, ProgressEvent)>,
}

#[derive(Debug, Serialize)]
pub struct LoggedEvent {
    pub seq: u64,
    #[serde(flatten)]
    pub event: ProgressEvent,
}

impl EventLog {
    pub fn push(&mut self, event: ProgressEvent) {
        if self.entries.len() == EVENT_LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back((self.next, event));
        self.next += 1;
    }

    /// Events with a sequence number of at least `since`
    pub fn since(&self, since: u64) -> Vec<LoggedEvent> {
        self.entries
            .iter()
            .filter(|(seq, _)| *seq >= since)
            .map(|(seq, event)| LoggedEvent {
                seq: *seq,
                event: event.clone(),
            })
            .collect()
    }
}

type SharedLog = Arc<Mutex<EventLog>>;

fn log_event(log: &SharedLog, event: ProgressEvent) {
    if let Ok(mut log) = log.lock() {
        log.push(event);
    }
}

#[derive(Clone)]
struct AppState {
    commands: mpsc::Sender<Command>,
    frames: watch::Receiver<Arc<FrameSnapshot>>,
    events: SharedLog,
    pick_radius: f32,
}

#[derive(Deserialize)]
struct QuestionRequest {
    question: String,
}

#[derive(Deserialize)]
struct PauseQuery {
    paused: Option<bool>,
}

#[derive(Deserialize)]
struct EventsQuery {
    #[serde(default)]
    since: u64,
}

#[derive(Deserialize)]
struct HoverQuery {
    ox: f32,
    oy: f32,
    oz: f32,
    dx: f32,
    dy: f32,
    dz: f32,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

async fn send(state: &AppState, command: Command) -> Result<(), Response> {
    state.commands.send(command).await.map_err(|_| {
        error_response(StatusCode::SERVICE_UNAVAILABLE, "simulation loop stopped")
    })
}

async fn post_question(
    State(state): State<AppState>,
    Json(request): Json<QuestionRequest>,
) -> Response {
    let (reply, answer) = oneshot::channel();
    let command = Command::Question {
        question: request.question,
        reply,
    };
    if let Err(response) = send(&state, command).await {
        return response;
    }

    match answer.await {
        Ok(Ok(epoch)) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "epoch": epoch })),
        )
            .into_response(),
        Ok(Err(message)) => error_response(StatusCode::BAD_REQUEST, message),
        Err(_) => error_response(StatusCode::SERVICE_UNAVAILABLE, "simulation loop stopped"),
    }
}

async fn post_reset(State(state): State<AppState>) -> Response {
    match send(&state, Command::Reset).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(response) => response,
    }
}

async fn post_pause(State(state): State<AppState>, Query(query): Query<PauseQuery>) -> Response {
    let (reply, answer) = oneshot::channel();
    let command = Command::Pause {
        paused: query.paused,
        reply,
    };
    if let Err(response) = send(&state, command).await {
        return response;
    }

    match answer.await {
        Ok(paused) => Json(serde_json::json!({ "paused": paused })).into_response(),
        Err(_) => error_response(StatusCode::SERVICE_UNAVAILABLE, "simulation loop stopped"),
    }
}

async fn get_frame(State(state): State<AppState>) -> Json<FrameSnapshot> {
    let frame = state.frames.borrow().clone();
    Json(frame.as_ref().clone())
}

async fn get_topology(State(state): State<AppState>) -> Response {
    let frame = state.frames.borrow().clone();
    match frame.summary {
        Some(summary) => Json(summary).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "no structure observed yet"),
    }
}

async fn get_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Response {
    match state.events.lock() {
        Ok(log) => Json(log.since(query.since)).into_response(),
        Err(_) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "event log poisoned"),
    }
}

async fn get_hover(State(state): State<AppState>, Query(query): Query<HoverQuery>) -> Response {
    let origin = Vec3::new(query.ox, query.oy, query.oz);
    let direction = Vec3::new(query.dx, query.dy, query.dz);
    let Some(ray) = Ray::new(origin, direction) else {
        return error_response(StatusCode::BAD_REQUEST, "ray direction must be non-zero");
    };

    let frame = state.frames.borrow().clone();
    match frame.hover(&ray, state.pick_radius) {
        Some(entity) => Json(entity.clone()).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Build the space on a blocking worker and hand it back to the frame loop
fn spawn_generation(
    ticket: AssemblyTicket,
    controller: &AssemblyController,
    provider: Arc<dyn CompletionProvider>,
    commands: mpsc::Sender<Command>,
    events: SharedLog,
) {
    let builder = controller.space_builder();
    let seed = controller.config().seed.map(|s| s ^ ticket.epoch);

    tokio::task::spawn_blocking(move || {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let words_ticket = ticket.clone();
        let words_commands = commands.clone();
        let mut sink = |event: ProgressEvent| {
            let words_done = event.stage == Stage::Words && event.percent >= 100.0;
            log_event(&events, event);
            if words_done
                && words_commands
                    .blocking_send(Command::WordsReady {
                        ticket: words_ticket.clone(),
                    })
                    .is_err()
            {
                debug!("frame loop gone before the word list was ready");
            }
        };
        let result = builder.build(&ticket.question, provider.as_ref(), &mut sink, &mut rng);
        if commands
            .blocking_send(Command::SpaceReady { ticket, result })
            .is_err()
        {
            debug!("frame loop gone before the space was ready");
        }
    });
}

fn spawn_explanation(
    request: ExplanationRequest,
    provider: Arc<dyn CompletionProvider>,
    commands: mpsc::Sender<Command>,
) {
    tokio::task::spawn_blocking(move || {
        let result = provider.complete(&request.prompt);
        if commands
            .blocking_send(Command::Explained {
                epoch: request.epoch,
                result,
            })
            .is_err()
        {
            debug!("frame loop gone before the explanation was ready");
        }
    });
}

/// Drive the controller: apply commands between frames, tick, publish snapshots
async fn run_frames(
    mut controller: AssemblyController,
    provider: Arc<dyn CompletionProvider>,
    mut inbox: mpsc::Receiver<Command>,
    outbox: mpsc::Sender<Command>,
    frames: watch::Sender<Arc<FrameSnapshot>>,
    events: SharedLog,
    fps: u32,
) {
    let mut interval = tokio::time::interval(Duration::from_secs_f32(1.0 / fps.max(1) as f32));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last = Instant::now();

    loop {
        tokio::select! {
            command = inbox.recv() => {
                let Some(command) = command else { break };
                match command {
                    Command::Question { question, reply } => {
                        let outcome = match controller.begin(&question) {
                            Ok(ticket) => {
                                let epoch = ticket.epoch;
                                spawn_generation(
                                    ticket,
                                    &controller,
                                    provider.clone(),
                                    outbox.clone(),
                                    events.clone(),
                                );
                                Ok(epoch)
                            }
                            Err(e) => Err(e.to_string()),
                        };
                        let _ = reply.send(outcome);
                    }
                    Command::Reset => controller.reset(),
                    Command::Pause { paused, reply } => {
                        let paused = match paused {
                            Some(paused) => {
                                controller.set_paused(paused);
                                paused
                            }
                            None => controller.toggle_pause(),
                        };
                        let _ = reply.send(paused);
                    }
                    Command::WordsReady { ticket } => {
                        controller.words_ready(&ticket);
                    }
                    Command::SpaceReady { ticket, result } => {
                        controller.install_space(&ticket, result);
                    }
                    Command::Explained { epoch, result } => {
                        controller.fulfil_explanation(epoch, result);
                    }
                }
            }
            _ = interval.tick() => {
                let now = Instant::now();
                let dt = now.duration_since(last).as_secs_f32();
                last = now;
                controller.tick(dt);

                if let Some(request) = controller.take_explanation_request() {
                    spawn_explanation(request, provider.clone(), outbox.clone());
                }
                for event in controller.drain_events() {
                    log_event(&events, event);
                }
                frames.send_replace(Arc::new(controller.snapshot()));
            }
        }
    }
}

/// Start the control server
pub async fn serve(
    config: WordfieldConfig,
    provider: Arc<dyn CompletionProvider>,
    options: ServeOptions,
) -> anyhow::Result<()> {
    let pick_radius = config.pool.pick_radius;
    let controller = AssemblyController::new(config);

    let (commands, inbox) = mpsc::channel::<Command>(64);
    let (frames_tx, frames) = watch::channel(Arc::new(controller.snapshot()));
    let events: SharedLog = Arc::new(Mutex::new(EventLog::default()));

    tokio::spawn(run_frames(
        controller,
        provider,
        inbox,
        commands.clone(),
        frames_tx,
        events.clone(),
        options.fps,
    ));

    let state = AppState {
        commands,
        frames,
        events,
        pick_radius,
    };

    let mut app = Router::new()
        .route("/question", post(post_question))
        .route("/reset", post(post_reset))
        .route("/pause", post(post_pause))
        .route("/frame", get(get_frame))
        .route("/topology", get(get_topology))
        .route("/events", get(get_events))
        .route("/hover", get(get_hover));
    if let Some(dir) = &options.static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }
    let app = app.with_state(state);

    let addr = format!("0.0.0.0:{}", options.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(port = options.port, "control server listening");
    println!("Control server running at http://localhost:{}", options.port);
    if let Some(dir) = &options.static_dir {
        println!("Serving renderer assets from {}", dir.display());
    } else {
        warn!("no --static-dir given, only the JSON endpoints are served");
    }
    println!("Press Ctrl+C to stop");

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(message: &str) -> ProgressEvent {
        ProgressEvent::new(Stage::Words, 0.0, message)
    }

    #[test]
    fn event_log_filters_by_sequence() {
        let mut log = EventLog::default();
        log.push(event("a"));
        log.push(event("b"));
        log.push(event("c"));

        let recent: Vec<u64> = log.since(1).iter().map(|e| e.seq).collect();
        assert_eq!(recent, vec![1, 2]);
        assert_eq!(log.since(0).len(), 3);
    }

    #[test]
    fn event_log_drops_oldest_at_capacity() {
        let mut log = EventLog::default();
        for i in 0..EVENT_LOG_CAPACITY + 10 {
            log.push(event(&i.to_string()));
        }

        let all = log.since(0);
        assert_eq!(all.len(), EVENT_LOG_CAPACITY);
        assert_eq!(all[0].seq, 10);
        assert_eq!(all[0].event.message, "10");
    }

    #[test]
    fn logged_event_flattens_fields() {
        let mut log = EventLog::default();
        log.push(event("hello"));
        let json = serde_json::to_value(&log.since(0)).unwrap();
        assert_eq!(json[0]["seq"], 0);
        assert_eq!(json[0]["message"], "hello");
        assert_eq!(json[0]["stage"], "words");
    }
}
