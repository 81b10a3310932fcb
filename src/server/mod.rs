//! # Server — HTTP Front End for the Metric Repository
//!
//! An Axum server that accepts metrics from agents and exposes the stored
//! values. All storage goes through a single `Arc<dyn Repository>` chosen at
//! startup (see [`open_backend`]).
//!
//! ## Routes
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | `GET` | `/` | HTML table of every stored metric |
//! | `POST` | `/update/{type}/{name}/{value}[/{hash}]` | text-path write |
//! | `POST` | `/update/` | JSON write of one record |
//! | `POST` | `/updates/` | JSON batch write (atomic) |
//! | `GET` | `/value/{type}/{name}` | plain-text value |
//! | `POST` | `/value/` | JSON read by `{id, type}` |
//! | `GET` | `/ping` | repository liveness |
//! | `GET` | `/healthz` | process liveness |
//! | `GET` | `/metrics` | Prometheus exposition |
//!
//! ## Error Mapping
//!
//! | `StoreError` | Status |
//! |--------------|--------|
//! | `InvalidChecksum`, `MissingValue`, `NonFiniteValue`, `TypeConflict` | 400 |
//! | `NotFound` | 404 |
//! | `UnknownMetricType` | 501 |
//! | everything else | 500 |
//!
//! Repository calls run under a [`REPOSITORY_TIMEOUT`] deadline.
//!
//! ## Middleware
//!
//! Request/response gzip, panic catching, per-request span with
//! `x-request-id`, request tracing, a 1 MiB body limit and a 30 s overall
//! timeout.

mod routes_health;
mod routes_update;
mod routes_value;

use anyhow::{Context, Result};
use axum::extract::{MatchedPath, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Instrument};

use crate::checksum::Signer;
use crate::error::StoreError;
use crate::metric::Metric;
use crate::prom_metrics;
use crate::repository::file::FileRepository;
use crate::repository::memory::MemoryRepository;
use crate::repository::postgres::PgRepository;
use crate::repository::Repository;

/// Deadline for a single repository call made by a handler.
pub const REPOSITORY_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolved server settings.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub address: String,
    pub store_interval: Duration,
    pub store_file: Option<PathBuf>,
    pub restore: bool,
    pub key: String,
    pub database_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: "localhost:8080".to_string(),
            store_interval: Duration::from_secs(300),
            store_file: Some(PathBuf::from("tmp/devops-metrics-db.json")),
            restore: true,
            key: String::new(),
            database_url: None,
        }
    }
}

pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub prom_metrics: prom_metrics::Metrics,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        AppState {
            repo,
            prom_metrics: prom_metrics::Metrics::new(),
        }
    }

    fn record_stored(&self, stored: &[Metric]) {
        for metric in stored {
            self.prom_metrics.record_write(&metric.mtype);
        }
    }
}

/// Run a repository call under [`REPOSITORY_TIMEOUT`].
async fn with_deadline<T>(
    call: impl Future<Output = crate::error::Result<T>>,
) -> crate::error::Result<T> {
    tokio::time::timeout(REPOSITORY_TIMEOUT, call)
        .await
        .unwrap_or_else(|_| Err(StoreError::Timeout))
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            StoreError::InvalidChecksum { .. }
            | StoreError::MissingValue { .. }
            | StoreError::NonFiniteValue { .. }
            | StoreError::TypeConflict { .. } => StatusCode::BAD_REQUEST,
            StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            StoreError::UnknownMetricType(_) => StatusCode::NOT_IMPLEMENTED,
            StoreError::Io(_)
            | StoreError::Json(_)
            | StoreError::Database(_)
            | StoreError::Timeout => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if !self.is_client_error() {
            warn!(error = %self, "repository failure");
        }
        (status, self.to_string()).into_response()
    }
}

async fn metrics_middleware(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let method = req.method().to_string();
    let raw_path = req.uri().path().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = std::time::Instant::now();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %raw_path,
    );
    let mut response = next.run(req).instrument(span).await;

    let duration = start.elapsed().as_secs_f64();
    state
        .prom_metrics
        .http_request_duration
        .get_or_create(&prom_metrics::RouteLabel {
            method: method.clone(),
            path: route.clone(),
        })
        .observe(duration);
    state
        .prom_metrics
        .http_requests
        .get_or_create(&prom_metrics::RequestLabel {
            method,
            path: route,
            status: response.status().as_u16().to_string(),
        })
        .inc();

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes_value::handler_index))
        .route(
            "/update/{type}/{name}/{value}",
            post(routes_update::handler_update_text),
        )
        .route(
            "/update/{type}/{name}/{value}/{hash}",
            post(routes_update::handler_update_text),
        )
        .route("/update/", post(routes_update::handler_update_json))
        .route("/updates/", post(routes_update::handler_updates))
        .route("/value/{type}/{name}", get(routes_value::handler_value_text))
        .route("/value/", post(routes_value::handler_value_json))
        .route("/ping", get(routes_health::handler_ping))
        .route("/healthz", get(routes_health::handler_healthz))
        .route("/metrics", get(routes_health::handler_metrics))
        .layer(RequestDecompressionLayer::new())
        .layer(CompressionLayer::new())
        .layer(CatchPanicLayer::new())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .with_state(state)
}

// ── Backend selection ───────────────────────────────────────────

/// The concrete repository behind the server, kept so that startup and
/// shutdown can reach backend-specific operations.
pub enum Backend {
    Memory(Arc<MemoryRepository>),
    File(Arc<FileRepository>),
    Postgres(Arc<PgRepository>),
}

impl Backend {
    pub fn repository(&self) -> Arc<dyn Repository> {
        match self {
            Backend::Memory(r) => r.clone(),
            Backend::File(r) => r.clone(),
            Backend::Postgres(r) => r.clone(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Memory(_) => "memory",
            Backend::File(_) => "file",
            Backend::Postgres(_) => "postgres",
        }
    }

    /// Start the periodic snapshot task for an interval-mode file backend.
    pub fn spawn_background(&self, cancel: &CancellationToken) -> Option<JoinHandle<()>> {
        match self {
            Backend::File(r) => r.spawn_snapshot_task(cancel.clone()),
            _ => None,
        }
    }

    /// Final flush on shutdown.
    pub fn close(&self) -> Result<()> {
        if let Backend::File(r) = self {
            r.flush()
                .with_context(|| format!("final snapshot to {}", r.path().display()))?;
            info!(path = %r.path().display(), "final snapshot written");
        }
        Ok(())
    }
}

/// Database URL → Postgres; else store file → file snapshot; else memory.
pub async fn open_backend(config: &ServerConfig) -> Result<Backend> {
    let signer = Signer::new(&config.key);

    if let Some(url) = config.database_url.as_deref().filter(|u| !u.is_empty()) {
        let repo = PgRepository::connect(url, signer).await?;
        repo.ensure_schema()
            .await
            .context("failed to create metrics table")?;
        return Ok(Backend::Postgres(Arc::new(repo)));
    }

    if let Some(path) = config.store_file.as_ref().filter(|p| !p.as_os_str().is_empty()) {
        let repo = FileRepository::new(path.clone(), config.store_interval, signer);
        if config.restore {
            if let Err(e) = repo.restore() {
                warn!(path = %path.display(), error = %e, "snapshot restore failed, starting empty");
            }
        }
        return Ok(Backend::File(Arc::new(repo)));
    }

    Ok(Backend::Memory(Arc::new(MemoryRepository::new(signer))))
}

/// Serve until `cancel` fires, then stop background work and flush.
pub async fn run(config: ServerConfig, cancel: CancellationToken) -> Result<()> {
    let backend = open_backend(&config).await?;
    let snapshot_task = backend.spawn_background(&cancel);
    let state = Arc::new(AppState::new(backend.repository()));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.address)
        .await
        .with_context(|| format!("failed to bind {}", config.address))?;
    info!(
        address = %config.address,
        backend = backend.name(),
        signing = !config.key.is_empty(),
        "server running"
    );

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    cancel.cancel();
    if let Some(task) = snapshot_task {
        if let Err(e) = task.await {
            warn!(error = %e, "snapshot task ended abnormally");
        }
    }
    backend.close()?;
    info!("server shut down gracefully");
    Ok(())
}
