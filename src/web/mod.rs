//! HTTP boundary: one route per engine call plus a server-sent event feed of cycles

use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{net::TcpListener, sync::broadcast};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::{info, warn};

use crate::{
    engine::Engine,
    log::Message,
    scheduler::{CycleError, CycleResult},
    units::UnitPosition,
    world::{Allocation, Phase, TriggerError, WorldSnapshot},
};

const DEFAULT_CONSUMER: &str = "api";
const DEFAULT_RECENT: usize = 50;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Trigger(#[from] TriggerError),
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Trigger(_) => StatusCode::BAD_REQUEST,
            ApiError::Cycle(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub struct AppState {
    engine: Engine,
    broadcaster: broadcast::Sender<String>,
}

impl AppState {
    pub fn new(engine: Engine) -> Arc<Self> {
        let (broadcaster, _) = broadcast::channel::<String>(512);
        Arc::new(Self {
            engine,
            broadcaster,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.broadcaster.subscribe()
    }

    fn publish(&self, result: &CycleResult) {
        if let Ok(payload) = serde_json::to_string(result) {
            let _ = self.broadcaster.send(payload);
        }
    }

    async fn step(&self) -> Result<CycleResult, ApiError> {
        let engine = self.engine.clone();
        let result = tokio::task::spawn_blocking(move || engine.run_cycle())
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))??;
        self.publish(&result);
        Ok(result)
    }
}

pub struct WebServerConfig {
    pub engine: Engine,
    pub host: String,
    pub port: u16,
    pub autoplay: Option<Duration>,
}

pub async fn run(config: WebServerConfig) -> Result<()> {
    let WebServerConfig {
        engine,
        host,
        port,
        autoplay,
    } = config;

    let state = AppState::new(engine);
    if let Some(interval) = autoplay {
        tokio::spawn(autoplay_loop(state.clone(), interval));
    }

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid address {host}:{port}"))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, autoplay_ms = autoplay.map(|d| d.as_millis() as u64), "serving");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/disaster", post(trigger_disaster))
        .route("/api/cycle", post(run_cycle))
        .route("/api/snapshot", get(snapshot))
        .route("/api/stats", get(stats))
        .route("/api/reset", post(reset))
        .route("/api/pause", post(pause))
        .route("/api/resume", post(resume))
        .route("/api/messages", get(read_messages))
        .route("/api/messages/recent", get(read_recent))
        .route("/api/units", get(units))
        .route("/api/events", get(stream_events))
        .with_state(state)
}

/// Steps the engine on a fixed interval while a disaster is running.
async fn autoplay_loop(state: Arc<AppState>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let engine = state.engine.clone();
        let idle = tokio::task::spawn_blocking(move || engine.snapshot().phase == Phase::Idle)
            .await
            .unwrap_or(true);
        if idle {
            continue;
        }
        if let Err(err) = state.step().await {
            warn!(error = %err, "autoplay cycle failed");
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}

fn default_intensity() -> f64 {
    0.8
}

#[derive(Debug, Deserialize)]
pub struct DisasterRequest {
    pub scenario: String,
    #[serde(default = "default_intensity")]
    pub intensity: f64,
    #[serde(default)]
    pub resources: Option<Allocation>,
}

#[derive(Debug, Serialize)]
pub struct DisasterResponse {
    pub scenario: String,
    pub intensity: f64,
    pub world: WorldSnapshot,
}

async fn trigger_disaster(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DisasterRequest>,
) -> Result<Json<DisasterResponse>, ApiError> {
    state
        .engine
        .trigger_disaster(&request.scenario, request.intensity, request.resources)?;
    Ok(Json(DisasterResponse {
        scenario: request.scenario,
        intensity: request.intensity,
        world: state.engine.snapshot(),
    }))
}

async fn run_cycle(State(state): State<Arc<AppState>>) -> Result<Json<CycleResult>, ApiError> {
    Ok(Json(state.step().await?))
}

async fn snapshot(State(state): State<Arc<AppState>>) -> Json<WorldSnapshot> {
    Json(state.engine.snapshot())
}

async fn reset(State(state): State<Arc<AppState>>) -> Json<WorldSnapshot> {
    state.engine.reset();
    Json(state.engine.snapshot())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PauseState {
    pub paused: bool,
}

async fn pause(State(state): State<Arc<AppState>>) -> Json<PauseState> {
    Json(PauseState {
        paused: state.engine.pause(),
    })
}

async fn resume(State(state): State<Arc<AppState>>) -> Json<PauseState> {
    Json(PauseState {
        paused: state.engine.resume(),
    })
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub consumer: Option<String>,
    #[serde(default)]
    pub clear: bool,
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub count: usize,
    pub messages: Vec<Message>,
}

impl From<Vec<Message>> for MessagesResponse {
    fn from(messages: Vec<Message>) -> Self {
        Self {
            count: messages.len(),
            messages,
        }
    }
}

async fn read_messages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessagesQuery>,
) -> Json<MessagesResponse> {
    let consumer = query.consumer.as_deref().unwrap_or(DEFAULT_CONSUMER);
    Json(state.engine.read_messages(consumer, query.clear).into())
}

async fn read_recent(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentQuery>,
) -> Json<MessagesResponse> {
    let count = query.count.unwrap_or(DEFAULT_RECENT);
    Json(state.engine.read_recent(count).into())
}

async fn units(State(state): State<Arc<AppState>>) -> Json<Vec<UnitPosition>> {
    Json(state.engine.unit_positions())
}

/// Headline numbers derived from one snapshot.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub phase: Phase,
    pub victims_initial: u64,
    pub victims_saved: u64,
    pub victims_remaining: u64,
    pub save_rate_percent: f64,
    pub resources_initial: Allocation,
    pub resources_remaining: Allocation,
    pub resources_used: Allocation,
    pub time_step: u64,
    pub total_time_steps: u64,
    pub disasters_completed: u64,
    pub rebuild_progress: f64,
}

impl From<&WorldSnapshot> for StatsResponse {
    fn from(snapshot: &WorldSnapshot) -> Self {
        let initial = snapshot.stats.total_victims_initial;
        // Aftershock victims are saved too, so they belong in the denominator.
        let total = initial + snapshot.stats.secondary_victims;
        let save_rate = if total == 0 {
            0.0
        } else {
            snapshot.victims_saved as f64 / total as f64 * 100.0
        };
        Self {
            phase: snapshot.phase,
            victims_initial: initial,
            victims_saved: snapshot.victims_saved,
            victims_remaining: snapshot.victims,
            save_rate_percent: (save_rate * 100.0).round() / 100.0,
            resources_initial: snapshot.initial_resources.clone(),
            resources_remaining: snapshot.resources.clone(),
            resources_used: snapshot.resources_used.clone(),
            time_step: snapshot.time_step,
            total_time_steps: snapshot.stats.total_time_steps,
            disasters_completed: snapshot.stats.disasters_completed,
            rebuild_progress: snapshot.rebuild_progress,
        }
    }
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse::from(&state.engine.snapshot()))
}

async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(payload) => Some(Ok(Event::default().event("cycle").data(payload))),
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(2))
            .text("keep-alive"),
    )
}
