//! HTTP ingestion and WebSocket broadcast service for the AQI engine.
//!
//! This crate provides a service that:
//! - Accepts sensor readings over HTTP and runs them through the engine
//! - Keeps the most recent results in memory
//! - Pushes every new result to WebSocket subscribers
//! - Optionally exposes Prometheus metrics
//!
//! # REST API Endpoints
//!
//! - `POST /data` - Submit a reading, returns the computed result
//! - `GET /data` - Most recent results, newest first (`?limit=`)
//! - `GET /api/scopes` - Windowed per-pollutant averages for every scope
//! - `GET /api/health` - Service health check
//! - `GET /api/status` - Engine counters and service state
//! - `GET /metrics` - Prometheus metrics (when enabled)
//! - `WS /api/ws` - Real-time result stream
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/aqi/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:3001"
//! broadcast_buffer = 100
//!
//! [engine]
//! window_secs = 300
//!
//! [storage]
//! recent_limit = 100
//!
//! [prometheus]
//! enabled = false
//! ```

pub mod api;
pub mod config;
pub mod state;
pub mod ws;

pub use config::{
    Config, ConfigError, EngineConfig, PrometheusConfig, ServerConfig, StorageConfig,
    ValidationError,
};
pub use state::AppState;
pub use ws::WsEvent;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the full application router with tracing and permissive CORS.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(api::router())
        .merge(ws::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
