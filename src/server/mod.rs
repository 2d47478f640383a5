pub mod history;
pub mod routes;
pub mod stream;
mod ws;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::TelemetryError;
use crate::sampler::gpu::GpuRegistry;
use crate::sampler::host::HostSampler;
use crate::wire::AuthError;
use history::HistoryBook;
use routes::{Capabilities, Endpoint, route_index, route_set};
use stream::EndpointStream;

/// Everything the handlers share: the config, the samplers opened once at
/// startup, the route set derived from detected capabilities, and the
/// recorded timelines.
pub struct AppState {
    pub config: Config,
    pub host: tokio::sync::Mutex<HostSampler>,
    pub gpu: Option<GpuRegistry>,
    pub routes: Vec<Endpoint>,
    pub history: Mutex<HistoryBook>,
}

impl AppState {
    /// Probe the hardware once and fix the device set and route set for
    /// the lifetime of the process.
    pub fn new(config: Config) -> Self {
        let gpu = match GpuRegistry::detect() {
            Ok(registry) => {
                info!(devices = registry.device_count(), "GPU telemetry enabled");
                Some(registry)
            }
            Err(err) => {
                info!(%err, "GPU telemetry disabled");
                None
            }
        };

        let caps = match &gpu {
            Some(registry) => Capabilities {
                gpus: registry.device_count(),
                pcie_counters: registry.has_pcie_counters(),
                nvlink_counters: registry.has_nvlink_counters(),
            },
            None => Capabilities::default(),
        };
        let routes = route_set(&caps);
        let history = Mutex::new(HistoryBook::new(&routes, config.sampling.history_points));

        AppState {
            config,
            host: tokio::sync::Mutex::new(HostSampler::new()),
            gpu,
            routes,
            history,
        }
    }

    fn endpoint(&self, name: &str) -> Option<Endpoint> {
        self.routes.iter().copied().find(|e| e.name() == name)
    }
}

pub type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/index.json", get(index))
        .route("/:route", get(endpoint_handler))
        .route("/:route/history", get(history_handler))
        .with_state(state)
}

/// Bind, start the background recorder, and serve until ctrl-c.
pub async fn run(state: SharedState, addr: SocketAddr) -> crate::error::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| TelemetryError::Bind { addr, source })?;
    info!(%addr, routes = state.routes.len(), "listening");

    tokio::spawn(record_loop(state.clone()));

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .map_err(TelemetryError::Serve)
}

/// Background recorder: appends one point per tick to every endpoint's
/// rolling window so charts can backfill on connect.
async fn record_loop(state: SharedState) {
    let period = Duration::from_millis(state.config.sampling.tick_ms);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut streams = Vec::with_capacity(state.routes.len());
    for &endpoint in &state.routes {
        streams.push((endpoint, EndpointStream::new(endpoint, &state).await));
    }

    loop {
        interval.tick().await;
        for (endpoint, stream) in &mut streams {
            match stream.sample(&state).await {
                Ok(point) => {
                    if let Ok(mut history) = state.history.lock() {
                        history.record(*endpoint, point);
                    }
                }
                Err(err) => debug!(endpoint = endpoint.name(), %err, "recorder tick skipped"),
            }
        }
    }
}

fn authorized(state: &AppState, headers: &HeaderMap, params: &HashMap<String, String>) -> bool {
    let Some(token) = &state.config.auth.token else {
        return true;
    };
    if let Some(value) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok())
        && let Some(bearer) = value.strip_prefix("Bearer ")
        && bearer == token
    {
        return true;
    }
    params.get("token").is_some_and(|t| t == token)
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(AuthError::unauthorized())).into_response()
}

async fn index(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&state, &headers, &params) {
        return unauthorized();
    }
    Json(route_index(&state.routes)).into_response()
}

/// Plain GET returns one freshly sampled tick; a WebSocket upgrade on the
/// same path streams ticks until the consumer goes away.
async fn endpoint_handler(
    State(state): State<SharedState>,
    Path(route): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    upgrade: Option<WebSocketUpgrade>,
) -> Response {
    let Some(endpoint) = state.endpoint(&route) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let authorized = authorized(&state, &headers, &params);

    if let Some(upgrade) = upgrade {
        // Complete the upgrade even when unauthorized so the client gets
        // a JSON error on the socket rather than a bare HTTP failure.
        return upgrade
            .on_upgrade(move |socket| ws::stream(socket, state, endpoint, authorized));
    }

    if !authorized {
        return unauthorized();
    }
    let mut source = EndpointStream::cold(endpoint);
    match source.sample(&state).await {
        Ok(tick) => Json(tick).into_response(),
        Err(err) => {
            warn!(endpoint = endpoint.name(), %err, "sample failed");
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string()).into_response()
        }
    }
}

async fn history_handler(
    State(state): State<SharedState>,
    Path(route): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(endpoint) = state.endpoint(&route) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !authorized(&state, &headers, &params) {
        return unauthorized();
    }
    let points = match state.history.lock() {
        Ok(history) => history.snapshot(endpoint),
        Err(_) => Vec::new(),
    };
    Json(points).into_response()
}
