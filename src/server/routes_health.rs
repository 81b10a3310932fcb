//! # Health & Observability Endpoints
//!
//! | Endpoint | Purpose |
//! |----------|---------|
//! | `GET /healthz` | Liveness: the process serves HTTP |
//! | `GET /ping` | Storage liveness via `Repository::ping` (500 when unreachable) |
//! | `GET /metrics` | Prometheus scraping endpoint |

use super::{with_deadline, AppState};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use std::sync::Arc;
use tracing::warn;

/// Liveness probe: no dependencies checked.
pub async fn handler_healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Storage liveness. For the SQL backend this is a `SELECT 1` round trip;
/// in-process backends always succeed.
pub async fn handler_ping(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match with_deadline(state.repo.ping()).await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            warn!(error = %e, "storage ping failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "storage unreachable")
        }
    }
}

/// Prometheus metrics in text exposition format. Refreshes the stored-record
/// gauge first; if storage is unreachable the previous reading is kept.
pub async fn handler_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match with_deadline(state.repo.get_all()).await {
        Ok(all) => {
            state.prom_metrics.stored_metrics.set(all.len() as i64);
        }
        Err(e) => warn!(error = %e, "failed to count stored metrics"),
    }
    match state.prom_metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                "content-type",
                "application/openmetrics-text; version=1.0.0; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
