//! HTTP surface: probes, Prometheus metrics and read-only inspection.

use crate::node::DaemonState;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use warden_consumer::CursorStore;
use warden_counters::{CountStore, Period};
use warden_policy::{FIREHOSE_STREAM, MODERATION_STREAM};
use warden_records::Did;
use warden_votes::VoteKind;

type AppState = Arc<DaemonState>;

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .route("/api/v1/counts/:subject", get(get_counts))
        .route("/api/v1/cursors/:stream", get(get_cursor))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Distinct voter counts per period for one kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeriodCounts {
    pub total: u64,
    pub day: u64,
    pub hour: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectCounts {
    pub subject: String,
    /// Keyed by vote kind (`good-bot`, `bad-bot`).
    pub counts: BTreeMap<&'static str, PeriodCounts>,
}

/// Current counts of both kinds against `subject`.
pub async fn counts_for(counters: &dyn CountStore, subject: &Did) -> warden_counters::Result<SubjectCounts> {
    let mut counts = BTreeMap::new();
    for kind in VoteKind::ALL {
        let mut entry = PeriodCounts::default();
        for period in Period::ALL {
            let n = counters
                .get_count_distinct(kind.as_str(), subject.as_str(), period)
                .await?;
            match period {
                Period::Total => entry.total = n,
                Period::Day => entry.day = n,
                Period::Hour => entry.hour = n,
            }
        }
        counts.insert(kind.as_str(), entry);
    }
    Ok(SubjectCounts {
        subject: subject.to_string(),
        counts,
    })
}

pub fn is_known_stream(stream: &str) -> bool {
    stream == FIREHOSE_STREAM || stream == MODERATION_STREAM
}

// --- Probes ---

async fn health() -> &'static str {
    "OK"
}

async fn ready(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.ready.load(Ordering::Acquire) {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "starting")
    }
}

async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let body = state.metrics.encode_text().map_err(|e| {
        tracing::error!(error = %e, "failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

// --- Inspection ---

async fn get_counts(
    State(state): State<AppState>,
    Path(subject): Path<String>,
) -> Result<Json<SubjectCounts>, StatusCode> {
    let subject = Did::parse(&subject).map_err(|_| StatusCode::BAD_REQUEST)?;
    let counts = counts_for(state.counters.as_ref(), &subject).await.map_err(|e| {
        tracing::error!(did = %subject, error = %e, "failed to read counts");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(counts))
}

#[derive(Debug, Serialize)]
struct CursorResponse {
    stream: String,
    cursor: Option<u64>,
}

async fn get_cursor(
    State(state): State<AppState>,
    Path(stream): Path<String>,
) -> Result<Json<CursorResponse>, StatusCode> {
    if !is_known_stream(&stream) {
        return Err(StatusCode::NOT_FOUND);
    }
    let cursor = state.cursors.load_cursor(&stream).await.map_err(|e| {
        tracing::error!(stream = %stream, error = %e, "failed to read cursor");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(CursorResponse { stream, cursor }))
}
