//! Read endpoints: text value, JSON value, HTML listing.

use axum::extract::{Path, State};
use axum::response::Html;
use axum::Json;
use serde::Deserialize;
use std::fmt::Write as _;
use std::sync::Arc;

use super::{with_deadline, AppState};
use crate::error::StoreError;
use crate::metric::{Metric, MetricType};

#[derive(Debug, Deserialize)]
pub struct MetricKey {
    pub id: String,
    #[serde(rename = "type")]
    pub mtype: MetricType,
}

pub async fn handler_value_text(
    State(state): State<Arc<AppState>>,
    Path((mtype, name)): Path<(String, String)>,
) -> Result<String, StoreError> {
    let metric = with_deadline(state.repo.get(&name, &MetricType::from(mtype))).await?;
    Ok(metric.value_text())
}

pub async fn handler_value_json(
    State(state): State<Arc<AppState>>,
    Json(key): Json<MetricKey>,
) -> Result<Json<Metric>, StoreError> {
    let metric = with_deadline(state.repo.get(&key.id, &key.mtype)).await?;
    Ok(Json(metric))
}

pub async fn handler_index(State(state): State<Arc<AppState>>) -> Result<Html<String>, StoreError> {
    let metrics = with_deadline(state.repo.get_all()).await?;
    state.prom_metrics.stored_metrics.set(metrics.len() as i64);
    Ok(Html(render_index(&metrics)))
}

fn render_index(metrics: &[Metric]) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head><title>Metrics</title></head>\n<body>\n<table>\n\
         <tr><th>Name</th><th>Type</th><th>Value</th></tr>\n",
    );
    for m in metrics {
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&m.id),
            m.mtype,
            m.value_text()
        );
    }
    html.push_str("</table>\n</body>\n</html>\n");
    html
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
