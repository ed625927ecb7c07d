// GET/DELETE handlers: version, sources, charts, stats, refresh

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::str::FromStr;

use super::AppState;
use crate::models::Source;
use crate::series::{Mode, SeriesRequest, since_window_ms};
use crate::version::{NAME, VERSION};

/// Read-side errors. "No data yet" is never an error; unknown sources and
/// storage trouble are.
#[derive(Debug, thiserror::Error)]
pub(super) enum ApiError {
    #[error("Invalid source")]
    InvalidSource,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidSource => StatusCode::BAD_REQUEST,
            ApiError::Internal(e) => {
                tracing::warn!(error = %e, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = axum::Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// GET /version — returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /sources — the known source identifiers.
pub(super) async fn sources_handler() -> impl IntoResponse {
    let sources: Vec<&str> = Source::ALL.iter().map(|s| s.as_str()).collect();
    axum::Json(serde_json::json!({ "sources": sources }))
}

/// GET /charts — the static chart catalog.
pub(super) async fn charts_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.charts.as_ref().clone())
}

/// Query params for GET /stats/:source. Flags arrive as literal "true"
/// strings from the dashboard; anything else means off.
#[derive(Debug, Deserialize)]
pub(super) struct StatsQuery {
    aggregate: Option<String>,
    buckets: Option<u32>,
    #[serde(rename = "sinceTime")]
    since_time: Option<f64>,
    #[serde(rename = "sinceUnits")]
    since_units: Option<String>,
    delta: Option<String>,
    #[serde(rename = "relativeTime")]
    relative_time: Option<String>,
}

fn flag(v: &Option<String>) -> bool {
    v.as_deref() == Some("true")
}

/// GET /stats/:source — reconstructed series for one source.
pub(super) async fn stats_handler(
    State(state): State<AppState>,
    Path(source): Path<String>,
    Query(query): Query<StatsQuery>,
) -> Result<Response, ApiError> {
    let source = Source::from_str(&source).map_err(|_| ApiError::InvalidSource)?;

    // Modes are mutually exclusive; delta and relative-time imply aggregation.
    let mode = if flag(&query.delta) {
        Mode::Delta
    } else if flag(&query.relative_time) {
        Mode::RelativeTime
    } else if flag(&query.aggregate) {
        Mode::Bucketed
    } else {
        Mode::Raw
    };

    let since_ms = match (query.since_time, query.since_units.as_deref()) {
        (Some(value), Some(units)) => since_window_ms(value, units),
        _ => None,
    };

    let request = SeriesRequest {
        source,
        since_ms,
        buckets: query.buckets.unwrap_or(state.config.series.default_buckets),
        mode,
    };
    let response = state.reconstructor.stats(&request).await?;
    Ok(axum::Json(response).into_response())
}

/// DELETE /stats/:source — administrative bulk delete; returns the count.
pub(super) async fn delete_stats_handler(
    State(state): State<AppState>,
    Path(source): Path<String>,
) -> Result<Response, ApiError> {
    let source = Source::from_str(&source).map_err(|_| ApiError::InvalidSource)?;
    let deleted = state.repo.delete_all(source).await?;
    tracing::info!(source = %source, deleted, "snapshots deleted");
    Ok(axum::Json(serde_json::json!({ "deleted": deleted })).into_response())
}

/// GET|POST /refresh — manual refresh-all pass (honors the kill switch).
pub(super) async fn refresh_handler(State(state): State<AppState>) -> impl IntoResponse {
    let outcomes = state.scheduler.refresh_all(true).await;
    let by_source: BTreeMap<String, _> = outcomes
        .into_iter()
        .map(|(source, outcome)| (source.to_string(), outcome))
        .collect();
    axum::Json(serde_json::json!({ "outcomes": by_source }))
}
