use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::broadcast};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::{error, info, warn};

use crate::{
    engine::{Engine, EngineBuilder, EngineSettings, TurnSummary},
    scenario::Scenario,
    snapshot::RunReport,
    world::{TurnSnapshot, World},
};

fn default_interval_ms() -> u64 {
    250
}

pub struct ServerConfig {
    pub scenario: Scenario,
    pub settings: EngineSettings,
    pub host: String,
    pub port: u16,
}

/// One simulation driven by the control surface.
pub struct Session {
    scenario: Scenario,
    engine: Engine,
    world: World,
}

impl Session {
    pub fn new(scenario: Scenario, settings: EngineSettings) -> Result<Self> {
        let world = scenario
            .build_world()
            .with_context(|| format!("Failed to build scenario '{}'", scenario.name))?;
        let engine = EngineBuilder::new(settings).with_turn_pipeline().build();
        Ok(Self {
            scenario,
            engine,
            world,
        })
    }

    pub fn step(&mut self) -> Result<TurnSummary> {
        self.engine.advance_turn(&mut self.world)
    }

    pub fn reset(&mut self) -> Result<()> {
        self.engine.reset();
        self.world = self.scenario.build_world()?;
        Ok(())
    }

    pub fn snapshot(&self) -> TurnSnapshot {
        self.world.snapshot(&self.scenario.name)
    }

    pub fn report(&self) -> RunReport {
        RunReport::from_world(&self.world, &self.scenario.name, self.engine.settings().seed)
    }

    pub fn is_finished(&self) -> bool {
        self.world.is_finished()
    }
}

#[derive(Clone)]
struct AppState {
    session: Arc<Mutex<Session>>,
    broadcaster: broadcast::Sender<String>,
    playing: Arc<AtomicBool>,
    interval_ms: Arc<AtomicU64>,
    /// Bumped on every start and stop; an autoplay loop only steps while the
    /// generation it was started with is still current.
    generation: Arc<AtomicU64>,
}

impl AppState {
    fn new(session: Session) -> Self {
        let (tx, _) = broadcast::channel::<String>(512);
        Self {
            session: Arc::new(Mutex::new(session)),
            broadcaster: tx,
            playing: Arc::new(AtomicBool::new(false)),
            interval_ms: Arc::new(AtomicU64::new(default_interval_ms())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the new loop's generation, or `None` if a loop is already
    /// running.
    fn start_playing(&self) -> Option<u64> {
        if self.playing.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn stop_playing(&self) {
        self.playing.store(false, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.playing.load(Ordering::SeqCst)
            && self.generation.load(Ordering::SeqCst) == generation
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, summary: &TurnSummary) {
        if let Ok(payload) = serde_json::to_string(summary) {
            // No subscribers is fine.
            let _ = self.broadcaster.send(payload);
        }
    }

    fn step(&self) -> Result<TurnSummary> {
        let summary = self.session().step()?;
        self.publish(&summary);
        Ok(summary)
    }
}

#[derive(Serialize)]
struct StateEnvelope {
    playing: bool,
    interval_ms: u64,
    snapshot: TurnSnapshot,
}

#[derive(Debug, Deserialize)]
struct PlayRequest {
    #[serde(default = "default_interval_ms")]
    interval_ms: u64,
}

struct ApiError(anyhow::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("control request failed: {:#}", self.0);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", self.0)).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/state", get(latest_state))
        .route("/api/step", post(step))
        .route("/api/reset", post(reset))
        .route("/api/play", post(play))
        .route("/api/pause", post(pause))
        .route("/api/events", get(stream_events))
        .route("/api/report", get(report))
        .with_state(state)
}

pub async fn run(config: ServerConfig) -> Result<()> {
    let ServerConfig {
        scenario,
        settings,
        host,
        port,
    } = config;
    let scenario_name = scenario.name.clone();
    let state = AppState::new(Session::new(scenario, settings)?);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid listen address {host}:{port}"))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, scenario = %scenario_name, "control server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down control server");
}

fn envelope(state: &AppState) -> StateEnvelope {
    StateEnvelope {
        playing: state.playing.load(Ordering::SeqCst),
        interval_ms: state.interval_ms.load(Ordering::SeqCst),
        snapshot: state.session().snapshot(),
    }
}

async fn latest_state(State(state): State<AppState>) -> Json<StateEnvelope> {
    Json(envelope(&state))
}

async fn step(State(state): State<AppState>) -> Result<Json<TurnSummary>, ApiError> {
    Ok(Json(state.step()?))
}

async fn reset(State(state): State<AppState>) -> Result<Json<StateEnvelope>, ApiError> {
    state.stop_playing();
    state.session().reset()?;
    Ok(Json(envelope(&state)))
}

async fn play(
    State(state): State<AppState>,
    Json(request): Json<PlayRequest>,
) -> Json<StateEnvelope> {
    state
        .interval_ms
        .store(request.interval_ms.max(1), Ordering::SeqCst);
    if let Some(generation) = state.start_playing() {
        let player = state.clone();
        tokio::spawn(async move { play_loop(player, generation).await });
    }
    Json(envelope(&state))
}

async fn pause(State(state): State<AppState>) -> Json<StateEnvelope> {
    state.stop_playing();
    Json(envelope(&state))
}

async fn play_loop(state: AppState, generation: u64) {
    while state.is_current(generation) {
        let interval = Duration::from_millis(state.interval_ms.load(Ordering::SeqCst));
        tokio::time::sleep(interval).await;
        if !state.is_current(generation) {
            break;
        }
        match state.step() {
            Ok(summary) if summary.outcome.is_some() => state.stop_playing(),
            Ok(_) => {}
            Err(err) => {
                warn!("autoplay stopped: {err:#}");
                state.stop_playing();
            }
        }
    }
}

async fn report(State(state): State<AppState>) -> Json<RunReport> {
    Json(state.session().report())
}

async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.broadcaster.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(payload) => Some(Ok(Event::default().data(payload))),
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(2))
            .text("keep-alive"),
    )
}
