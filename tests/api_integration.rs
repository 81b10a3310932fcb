//! API integration tests for the metricsrelay HTTP endpoints.
//!
//! Requests go straight into the Axum router with `tower::ServiceExt::oneshot`;
//! no listener is bound. Every test builds its own router over a fresh
//! in-memory repository, so these always run and need no database.
//!
//! # How to run
//!
//! ```bash
//! cargo test --test api_integration
//! ```

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use metricsrelay::metric::Metric;
use tower::ServiceExt;

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
    let (status, body) = send(
        app,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await;
    (status, String::from_utf8_lossy(&body).into_owned())
}

async fn post(app: &Router, uri: &str) -> (StatusCode, String) {
    let (status, body) = send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    (status, String::from_utf8_lossy(&body).into_owned())
}

async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let (status, bytes) = send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await;
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

// ── Text routes ─────────────────────────────────────────────────

#[tokio::test]
async fn text_update_then_read_gauge() {
    let app = common::build_test_app("");
    let (status, _) = post(&app, "/update/gauge/Alloc/12.5").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(&app, "/value/gauge/Alloc").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "12.5");
}

#[tokio::test]
async fn text_counter_accumulates() {
    let app = common::build_test_app("");
    post(&app, "/update/counter/PollCount/10").await;
    post(&app, "/update/counter/PollCount/15").await;
    let (_, body) = get(&app, "/value/counter/PollCount").await;
    assert_eq!(body, "25");
}

#[tokio::test]
async fn text_update_rejects_bad_value_and_type() {
    let app = common::build_test_app("");
    let (status, _) = post(&app, "/update/gauge/Alloc/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&app, "/update/histogram/h/1").await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn text_update_rejects_non_finite_gauge() {
    let app = common::build_test_app("");
    for value in ["NaN", "inf", "-inf"] {
        let (status, _) = post(&app, &format!("/update/gauge/x/{}", value)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{} should be rejected", value);
    }
    let (status, _) = get(&app, "/value/gauge/x").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn text_read_of_unknown_metric_is_404() {
    let app = common::build_test_app("");
    let (status, _) = get(&app, "/value/gauge/Nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn text_update_with_hash_segment() {
    let key = "secret";
    let app = common::build_test_app(key);
    let hash = common::signed(key, Metric::gauge("Alloc", 2.0)).hash.unwrap();

    let (status, _) = post(&app, &format!("/update/gauge/Alloc/2/{}", hash)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(&app, "/update/gauge/Alloc/3").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── JSON routes ─────────────────────────────────────────────────

#[tokio::test]
async fn json_update_returns_stored_record() {
    let app = common::build_test_app("");
    post_json(&app, "/update/", serde_json::json!({"id": "c", "type": "counter", "delta": 10})).await;
    let (status, json) =
        post_json(&app, "/update/", serde_json::json!({"id": "c", "type": "counter", "delta": 15})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["delta"], 25);
    assert_eq!(json["type"], "counter");
}

#[tokio::test]
async fn json_value_returns_checksum_when_keyed() {
    let key = "k";
    let app = common::build_test_app(key);
    let metric = common::signed(key, Metric::gauge("Alloc", 1.5));
    let (status, _) = post_json(&app, "/update/", serde_json::to_value(&metric).unwrap()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = post_json(&app, "/value/", serde_json::json!({"id": "Alloc", "type": "gauge"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["value"], 1.5);
    assert_eq!(json["hash"], metric.hash.unwrap());
}

#[tokio::test]
async fn json_value_missing_is_404() {
    let app = common::build_test_app("");
    let (status, _) = post_json(&app, "/value/", serde_json::json!({"id": "x", "type": "counter"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn json_update_unknown_type_is_501() {
    let app = common::build_test_app("");
    let (status, _) =
        post_json(&app, "/update/", serde_json::json!({"id": "y", "type": "bogus", "value": 1.0})).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    let (status, _) = get(&app, "/value/gauge/y").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn json_update_missing_value_is_400() {
    let app = common::build_test_app("");
    let (status, _) = post_json(&app, "/update/", serde_json::json!({"id": "g", "type": "gauge"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn batch_update_is_atomic() {
    let key = "k";
    let app = common::build_test_app(key);
    let good = common::signed(key, Metric::gauge("a", 1.0));
    let mut bad = common::signed(key, Metric::gauge("b", 2.0));
    bad.value = Some(20.0);
    let also_good = common::signed(key, Metric::counter("c", 3));

    let (status, _) = post_json(
        &app,
        "/updates/",
        serde_json::to_value(vec![good, bad, also_good]).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for uri in ["/value/gauge/a", "/value/gauge/b", "/value/counter/c"] {
        let (status, _) = get(&app, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{} should not exist", uri);
    }
}

#[tokio::test]
async fn batch_update_returns_every_stored_record() {
    let app = common::build_test_app("");
    let (status, json) = post_json(
        &app,
        "/updates/",
        serde_json::json!([
            {"id": "PollCount", "type": "counter", "delta": 2},
            {"id": "RandomValue", "type": "gauge", "value": 0.5},
            {"id": "PollCount", "type": "counter", "delta": 3}
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let records = json.as_array().unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[2]["delta"], 5);
}

#[tokio::test]
async fn malformed_json_is_client_error() {
    let app = common::build_test_app("");
    let (status, _) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/updates/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("[{not json"))
            .unwrap(),
    )
    .await;
    assert!(status.is_client_error());
}

// ── Listing, health, middleware ─────────────────────────────────

#[tokio::test]
async fn index_lists_stored_metrics() {
    let app = common::build_test_app("");
    post(&app, "/update/gauge/Alloc/1.5").await;
    post(&app, "/update/counter/PollCount/4").await;

    let (status, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Alloc"));
    assert!(body.contains("PollCount"));
}

#[tokio::test]
async fn ping_and_healthz_are_ok() {
    let app = common::build_test_app("");
    assert_eq!(get(&app, "/ping").await.0, StatusCode::OK);
    assert_eq!(get(&app, "/healthz").await.0, StatusCode::OK);
}

#[tokio::test]
async fn metrics_endpoint_counts_writes() {
    let app = common::build_test_app("");
    post(&app, "/update/counter/c/1").await;
    let (status, body) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("metricsrelay_metric_writes_total{metric_type=\"counter\"} 1"));
    assert!(body.contains("metricsrelay_http_requests_total"));
}

#[tokio::test]
async fn metrics_scrape_reports_stored_record_count() {
    let app = common::build_test_app("");
    post(&app, "/update/gauge/Alloc/1").await;
    post(&app, "/update/counter/PollCount/2").await;
    post(&app, "/update/counter/PollCount/3").await;

    let (_, body) = get(&app, "/metrics").await;
    assert!(body.contains("metricsrelay_stored_metrics 2"));
}

#[tokio::test]
async fn request_id_is_echoed_or_generated() {
    let app = common::build_test_app("");
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .header("x-request-id", "abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc-123");

    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn gzip_request_bodies_are_accepted() {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let app = common::build_test_app("");
    let payload = serde_json::json!([{"id": "z", "type": "gauge", "value": 7.0}]).to_string();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload.as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();

    let (status, _) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/updates/")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_ENCODING, "gzip")
            .body(Body::from(compressed))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(get(&app, "/value/gauge/z").await.1, "7");
}

#[tokio::test]
async fn responses_are_gzipped_on_request() {
    let app = common::build_test_app("");
    post(&app, "/update/gauge/Alloc/1").await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/")
                .header(header::ACCEPT_ENCODING, "gzip")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
}
