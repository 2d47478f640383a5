use thiserror::Error;

/// Errors raised while sampling or streaming telemetry.
///
/// Only `Bind` is fatal to the process. `DeviceUnavailable` hides the
/// affected routes at startup; `SampleRead` skips one metric for one tick;
/// `ConsumerDisconnected` ends a single consumer's task.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("failed to read {metric}: {reason}")]
    SampleRead { metric: &'static str, reason: String },

    #[error("consumer disconnected")]
    ConsumerDisconnected,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

impl TelemetryError {
    pub fn sample_read(metric: &'static str, err: impl std::fmt::Display) -> Self {
        TelemetryError::SampleRead {
            metric,
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
