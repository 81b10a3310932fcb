//! Shared test helpers for integration tests.

#![allow(dead_code)]

use metricsrelay::checksum::Signer;
use metricsrelay::metric::Metric;
use metricsrelay::repository::memory::MemoryRepository;
use metricsrelay::repository::postgres::PgRepository;
use metricsrelay::server::{build_router, AppState};
use std::sync::Arc;

/// Returns the test database URL from the `TEST_DATABASE_URL` environment variable.
/// Panics if the variable is not set.
pub fn test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set for integration tests")
}

/// Returns true if the test database URL is configured.
pub fn has_test_db() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

/// Connect to the test database, create the table and empty it.
pub async fn setup_test_db(key: &str) -> PgRepository {
    let repo = PgRepository::connect(&test_db_url(), Signer::new(key))
        .await
        .expect("Failed to connect to test database");
    repo.ensure_schema().await.unwrap();
    sqlx::query("TRUNCATE TABLE metrics")
        .execute(repo.pool())
        .await
        .unwrap();
    repo
}

/// Axum router over a fresh in-memory repository.
pub fn build_test_app(key: &str) -> axum::Router {
    let repo = Arc::new(MemoryRepository::new(Signer::new(key)));
    build_router(Arc::new(AppState::new(repo)))
}

/// Attach the checksum `key` would produce.
pub fn signed(key: &str, mut metric: Metric) -> Metric {
    metric.hash = Signer::new(key).sign(&metric);
    metric
}
