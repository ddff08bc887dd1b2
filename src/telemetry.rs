//! Tracing setup and standardized spans.

use crate::config::{LogConfig, LogFormat};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` overrides the default `info`.
pub fn init(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = match config.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    // a second init (tests, embedding) keeps the first subscriber
    let _ = installed;
}

/// Span for a room actor task.
pub fn room_span(room_id: &str) -> tracing::Span {
    tracing::info_span!("room", room_id = %room_id)
}

/// Span for an account actor task.
pub fn account_span(account_id: &str) -> tracing::Span {
    tracing::info_span!("account", account_id = %account_id)
}

/// Span for one physical client connection.
pub fn connection_span(conn_id: &str, peer: &str) -> tracing::Span {
    tracing::info_span!("connection", conn_id = %conn_id, peer = %peer)
}
