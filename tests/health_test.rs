//! Liveness and readiness endpoints.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};

#[tokio::test]
async fn readiness_reports_database_catalog_and_carrier() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/health/ready", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["status"], "up");
    assert_eq!(body["checks"]["database"], "up");
    assert_eq!(body["checks"]["catalog"], "up");
    assert_eq!(body["carrier"], "flat_rate");
}

#[tokio::test]
async fn readiness_names_yalidine_when_credentials_are_set() {
    let app = TestApp::with_config(|cfg| {
        cfg.yalidine_api_id = Some("id".to_string());
        cfg.yalidine_api_token = Some("token".to_string());
    })
    .await;
    let response = app.request(Method::GET, "/health/ready", None, None).await;
    assert_eq!(response_json(response).await["carrier"], "yalidine");
}

#[tokio::test]
async fn liveness_answers_without_touching_the_database() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/health/live", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "up");
    assert!(body["uptime_seconds"].is_u64());
}
