//! Write endpoints: text path, single JSON record, JSON batch.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use super::{with_deadline, AppState};
use crate::error::StoreError;
use crate::metric::{Metric, MetricType};

#[derive(Debug, Deserialize)]
pub struct UpdatePath {
    #[serde(rename = "type")]
    mtype: String,
    name: String,
    value: String,
    #[serde(default)]
    hash: Option<String>,
}

/// Build a metric from path segments. Unknown types map to 501, unparsable
/// values to 400.
fn parse_text_update(path: UpdatePath) -> Result<Metric, Response> {
    let mut metric = match MetricType::from(path.mtype) {
        MetricType::Gauge => match path.value.parse::<f64>() {
            Ok(v) => Metric::gauge(path.name, v),
            Err(_) => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    format!("invalid gauge value '{}'", path.value),
                )
                    .into_response())
            }
        },
        MetricType::Counter => match path.value.parse::<i64>() {
            Ok(d) => Metric::counter(path.name, d),
            Err(_) => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    format!("invalid counter value '{}'", path.value),
                )
                    .into_response())
            }
        },
        MetricType::Other(t) => return Err(StoreError::UnknownMetricType(t).into_response()),
    };
    metric.hash = path.hash;
    Ok(metric)
}

pub async fn handler_update_text(
    State(state): State<Arc<AppState>>,
    Path(path): Path<UpdatePath>,
) -> Response {
    let metric = match parse_text_update(path) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    match with_deadline(state.repo.set(metric)).await {
        Ok(stored) => {
            state.record_stored(std::slice::from_ref(&stored));
            Json(stored).into_response()
        }
        Err(e) => {
            state.prom_metrics.record_rejection(&e);
            e.into_response()
        }
    }
}

pub async fn handler_update_json(
    State(state): State<Arc<AppState>>,
    Json(metric): Json<Metric>,
) -> Result<Json<Metric>, StoreError> {
    let stored = with_deadline(state.repo.set(metric))
        .await
        .inspect_err(|e| state.prom_metrics.record_rejection(e))?;
    state.record_stored(std::slice::from_ref(&stored));
    Ok(Json(stored))
}

pub async fn handler_updates(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<Vec<Metric>>,
) -> Result<Json<Vec<Metric>>, StoreError> {
    let stored = with_deadline(state.repo.updates(batch))
        .await
        .inspect_err(|e| state.prom_metrics.record_rejection(e))?;
    state.record_stored(&stored);
    Ok(Json(stored))
}
