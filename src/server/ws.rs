use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::AppState;
use super::routes::Endpoint;
use super::stream::EndpointStream;
use crate::config::SamplingConfig;
use crate::error::TelemetryError;
use crate::wire::{AuthError, ControlMessage, Hello};

/// Consumer connection lifecycle. The upgrade itself is `Init`;
/// `Connected` becomes `Streaming` on the first successful send, and a
/// pause drops back to `Connected` without closing the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Init,
    Connected,
    Streaming,
    Closed,
}

impl ConnState {
    fn on_open(self) -> Self {
        match self {
            ConnState::Init => ConnState::Connected,
            other => other,
        }
    }

    fn on_send(self) -> Self {
        match self {
            ConnState::Connected => ConnState::Streaming,
            other => other,
        }
    }

    fn on_pause(self) -> Self {
        match self {
            ConnState::Streaming => ConnState::Connected,
            other => other,
        }
    }
}

/// Apply a consumer's control message to the current tick period,
/// clamping to the configured bounds. `None` means the period is
/// unchanged and the timer keeps its phase.
fn next_period(requested: Option<u64>, current: u64, sampling: &SamplingConfig) -> Option<u64> {
    let clamped = sampling.clamp_tick_ms(requested?);
    (clamped != current).then_some(clamped)
}

fn tick_timer(period_ms: u64) -> tokio::time::Interval {
    // First fire one full period out, then steady spacing. Skip, don't
    // burst, when a tick overruns.
    let period = Duration::from_millis(period_ms);
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Drive one WebSocket consumer: greet, then stream one JSON object per
/// tick until the consumer disconnects. Errors here never outlive the
/// connection's own task.
pub(super) async fn stream(
    mut socket: WebSocket,
    state: std::sync::Arc<AppState>,
    endpoint: Endpoint,
    authorized: bool,
) {
    if !authorized {
        let reply = serde_json::to_string(&AuthError::unauthorized()).unwrap_or_default();
        let _ = socket.send(Message::Text(reply)).await;
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    match run_stream(&mut socket, &state, endpoint).await {
        Ok(()) => debug!(endpoint = endpoint.name(), "consumer closed the stream"),
        Err(err) => debug!(endpoint = endpoint.name(), %err, "consumer stream ended"),
    }
}

async fn run_stream(
    socket: &mut WebSocket,
    state: &AppState,
    endpoint: Endpoint,
) -> crate::error::Result<()> {
    let mut conn = ConnState::Init;
    let hello = serde_json::to_string(&Hello::connected()).unwrap_or_default();
    socket
        .send(Message::Text(hello))
        .await
        .map_err(|_| TelemetryError::ConsumerDisconnected)?;
    conn = conn.on_open();

    let mut source = EndpointStream::new(endpoint, state).await;
    let mut period_ms = state.config.sampling.tick_ms;
    let mut interval = tick_timer(period_ms);
    let mut paused = false;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if paused {
                    continue;
                }
                match source.sample(state).await {
                    Ok(tick) => {
                        let text = match serde_json::to_string(&tick) {
                            Ok(text) => text,
                            Err(err) => {
                                warn!(endpoint = endpoint.name(), %err, "failed to serialize tick");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(text)).await.is_err() {
                            return Err(TelemetryError::ConsumerDisconnected);
                        }
                        conn = conn.on_send();
                    }
                    // Skip this metric for this tick; the next tick is the retry.
                    Err(err) => warn!(endpoint = endpoint.name(), %err, "sample failed"),
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(control) = serde_json::from_str::<ControlMessage>(&text) else {
                            debug!(endpoint = endpoint.name(), "ignoring malformed control message");
                            continue;
                        };
                        if let Some(period) = next_period(
                            control.update_frequency,
                            period_ms,
                            &state.config.sampling,
                        ) {
                            period_ms = period;
                            interval = tick_timer(period_ms);
                            debug!(endpoint = endpoint.name(), period_ms, "retimed tick loop");
                        }
                        if let Some(pause) = control.is_paused {
                            paused = pause;
                            if pause {
                                conn = conn.on_pause();
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong are handled by the protocol layer
                    Some(Err(_)) => return Err(TelemetryError::ConsumerDisconnected),
                }
            }
        }
    }

    conn = ConnState::Closed;
    debug!(endpoint = endpoint.name(), state = ?conn, "unsubscribed");
    Ok(())
}
