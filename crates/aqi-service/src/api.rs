//! REST API endpoints for the aqi-service.
//!
//! # Concurrency and Lock Acquisition
//!
//! - **Engine**: synchronous and internally locked per scope and pollutant.
//!   Handlers call it directly; a reading is processed in microseconds.
//! - **`state.recent`** (RwLock): write lock only while publishing a result,
//!   read lock while serving `GET /data` and `/metrics`.
//! - **`state.config`** (RwLock): read only.
//!
//! No handler holds an async lock while calling the engine.
//!
//! ## Error Handling
//!
//! All endpoints return structured JSON errors via [`AppError`]. Rejected
//! readings (missing pollutants, invalid values, unknown identifiers) return
//! HTTP 400.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};

use aqi_core::{EngineStats, Pollutant, REQUIRED_POLLUTANTS, ScopeSnapshot};
use aqi_types::{AqiResult, SensorReading};

use crate::state::AppState;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // Ingestion
        .route("/data", get(get_data).post(post_data))
        // Diagnostics
        .route("/api/scopes", get(get_scopes))
        .route("/api/health", get(health))
        .route("/api/status", get(get_status))
        // Prometheus metrics
        .route("/metrics", get(prometheus_metrics))
}

// ==========================================================================
// Ingestion
// ==========================================================================

/// Response for an accepted reading.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub message: &'static str,
    pub result: AqiResult,
}

/// Accept a sensor reading, compute its index and broadcast the result.
///
/// # Errors
///
/// - Returns [`AppError::BadRequest`] if the body is not a valid reading
/// - Returns [`AppError::BadRequest`] listing every required pollutant that is absent
/// - Returns [`AppError::BadRequest`] if the engine rejects the reading
async fn post_data(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SensorReading>, JsonRejection>,
) -> Result<Json<IngestResponse>, AppError> {
    let Json(reading) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    if let Some(pollutants) = &reading.pollutants {
        let missing = pollutants.missing(&REQUIRED_POLLUTANTS);
        if !missing.is_empty() {
            let ids: Vec<&str> = missing.iter().map(Pollutant::id).collect();
            return Err(AppError::BadRequest(format!(
                "Missing required pollutants: {}",
                ids.join(", ")
            )));
        }
    }

    let result = state.calculator.calculate_final_aqi(&reading)?;
    info!(
        location = %result.scope_key,
        aqi = ?result.aqi(),
        overall_aqi = ?result.overall.aqi,
        "Received reading"
    );

    state.publish(result.clone()).await;

    Ok(Json(IngestResponse {
        message: "Data received, AQI calculated, and sent to WebSocket",
        result,
    }))
}

/// Query parameters for recent results.
#[derive(Debug, Deserialize, Default)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

impl RecentQuery {
    /// Validate the query parameters.
    /// Returns an error if `limit` is zero.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.limit == Some(0) {
            return Err(AppError::BadRequest(
                "Invalid limit: must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Most recent results, newest first.
///
/// `limit` defaults to, and is capped at, `storage.recent_limit`.
async fn get_data(
    State(state): State<Arc<AppState>>,
    query: Result<Query<RecentQuery>, QueryRejection>,
) -> Result<Json<Vec<AqiResult>>, AppError> {
    let Query(params) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    params.validate()?;

    let max = state.recent_limit();
    let limit = params.limit.map_or(max, |l| l.min(max));
    Ok(Json(state.recent(limit).await))
}

// ==========================================================================
// Diagnostics
// ==========================================================================

/// Every known scope with its stored per-pollutant averages.
///
/// Reads never evict, so an idle scope reports the averages of its last write.
async fn get_scopes(State(state): State<Arc<AppState>>) -> Json<Vec<ScopeSnapshot>> {
    let history = state.calculator.history();
    let scopes = history
        .scope_keys()
        .iter()
        .filter_map(|key| history.snapshot(key))
        .collect();
    Json(scopes)
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Service status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service version.
    pub version: &'static str,
    /// Current timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Seconds since the service started.
    pub uptime_seconds: u64,
    /// Averaging window in seconds.
    pub window_secs: u64,
    /// Number of known scopes, including the overall scope.
    pub scope_count: usize,
    /// Number of results held for `GET /data`.
    pub recent_count: usize,
    /// Connected WebSocket subscribers.
    pub subscribers: usize,
    /// Engine counters.
    pub engine: EngineStats,
}

/// Get service status including engine counters.
async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let now = OffsetDateTime::now_utc();
    let calculator = &state.calculator;

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        timestamp: now,
        uptime_seconds: (now - state.started_at).whole_seconds().max(0) as u64,
        window_secs: calculator.window().as_secs(),
        scope_count: calculator.history().scope_count(),
        recent_count: state.recent.read().await.len(),
        subscribers: state.results_tx.receiver_count(),
        engine: calculator.metrics().snapshot(),
    })
}

// ==========================================================================
// Prometheus
// ==========================================================================

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Prometheus metrics endpoint.
///
/// Index gauges come from the newest result per location, so they match what
/// clients last saw. Exposed metrics:
///
/// - `aqi_index` - Latest index per scope
/// - `aqi_sub_index` - Latest windowed sub-index per scope and pollutant
/// - `aqi_readings_processed_total`, `aqi_readings_rejected_total`,
///   `aqi_unknown_pollutant_total` - Reading counters
/// - `aqi_samples_recorded_total`, `aqi_samples_evicted_total` - History counters
/// - `aqi_scopes` - Known scopes
/// - `aqi_websocket_subscribers` - Connected WebSocket clients
///
/// # Errors
///
/// Returns [`AppError::NotFound`] when `prometheus.enabled` is false.
async fn prometheus_metrics(
    State(state): State<Arc<AppState>>,
) -> Result<
    (
        StatusCode,
        [(axum::http::header::HeaderName, &'static str); 1],
        String,
    ),
    AppError,
> {
    let config = state.config.read().await;
    if !config.prometheus.enabled {
        return Err(AppError::NotFound(
            "Prometheus metrics endpoint is disabled".to_string(),
        ));
    }
    drop(config);

    let mut output = String::with_capacity(4096);

    output.push_str("# Air quality index metrics\n");
    output.push_str(&format!(
        "# Generated at {}\n\n",
        OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default()
    ));

    // Newest result per location; the first one seen also carries the latest overall scope
    let latest: Vec<AqiResult> = {
        let recent = state.recent.read().await;
        let mut seen = std::collections::HashSet::new();
        recent
            .iter()
            .filter(|r| seen.insert(r.scope_key.clone()))
            .cloned()
            .collect()
    };

    if let Some(newest) = latest.first() {
        let mut scopes: Vec<(String, Option<&str>, &aqi_types::ScopeAqi)> = latest
            .iter()
            .map(|r| (r.scope_key.clone(), r.scope_name.as_deref(), &r.location))
            .collect();
        scopes.push(("overall".to_string(), None, &newest.overall));

        output.push_str("# HELP aqi_index Latest air quality index per scope\n");
        output.push_str("# TYPE aqi_index gauge\n");
        for (scope, name, result) in &scopes {
            if let Some(aqi) = result.aqi {
                output.push_str(&format!(
                    "aqi_index{{{}}} {:.2}\n",
                    scope_labels(scope, *name),
                    aqi
                ));
            }
        }
        output.push('\n');

        output.push_str("# HELP aqi_sub_index Latest windowed sub-index per scope and pollutant\n");
        output.push_str("# TYPE aqi_sub_index gauge\n");
        for (scope, name, result) in &scopes {
            for (pollutant, value) in &result.sub_indices {
                output.push_str(&format!(
                    "aqi_sub_index{{{},pollutant=\"{}\"}} {:.2}\n",
                    scope_labels(scope, *name),
                    pollutant.id(),
                    value
                ));
            }
        }
        output.push('\n');
    }

    let stats = state.calculator.metrics().snapshot();
    let counters = [
        (
            "aqi_readings_processed_total",
            "Readings that produced an index",
            stats.readings_processed,
        ),
        (
            "aqi_readings_rejected_total",
            "Readings rejected as invalid",
            stats.readings_rejected,
        ),
        (
            "aqi_unknown_pollutant_total",
            "Readings that named an unknown pollutant",
            stats.unknown_pollutant_failures,
        ),
        (
            "aqi_samples_recorded_total",
            "Sub-index samples written to history",
            stats.samples_recorded,
        ),
        (
            "aqi_samples_evicted_total",
            "Sub-index samples evicted from the window",
            stats.samples_evicted,
        ),
    ];
    for (name, help, value) in counters {
        output.push_str(&format!("# HELP {} {}\n", name, help));
        output.push_str(&format!("# TYPE {} counter\n", name));
        output.push_str(&format!("{} {}\n\n", name, value));
    }

    output.push_str("# HELP aqi_scopes Number of known scopes\n");
    output.push_str("# TYPE aqi_scopes gauge\n");
    output.push_str(&format!(
        "aqi_scopes {}\n\n",
        state.calculator.history().scope_count()
    ));

    output.push_str("# HELP aqi_websocket_subscribers Connected WebSocket clients\n");
    output.push_str("# TYPE aqi_websocket_subscribers gauge\n");
    output.push_str(&format!(
        "aqi_websocket_subscribers {}\n",
        state.results_tx.receiver_count()
    ));

    Ok((
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        output,
    ))
}

fn scope_labels(scope: &str, name: Option<&str>) -> String {
    match name {
        Some(name) => format!(
            "scope=\"{}\",name=\"{}\"",
            escape_label_value(scope),
            escape_label_value(name)
        ),
        None => format!("scope=\"{}\"", escape_label_value(scope)),
    }
}

/// Escape special characters in Prometheus label values.
fn escape_label_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

// ==========================================================================
// Errors
// ==========================================================================

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Engine(aqi_core::Error),
}

impl From<aqi_core::Error> for AppError {
    fn from(e: aqi_core::Error) -> Self {
        AppError::Engine(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Engine(e) if e.is_client_error() => (StatusCode::BAD_REQUEST, e.to_string()),
            AppError::Engine(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        if status.is_client_error() {
            warn!(%status, "{}", message);
        }

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}
