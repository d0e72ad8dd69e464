//! Exercises the control plane's HTTP surface end-to-end: auth boundary,
//! the JSON envelope shape, and one full `/notify` round trip through a
//! registered fake destination.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

use notifyd::adapter::fake::FakeAdapter;
use notifyd::adapter::registry::Registry;
use notifyd::adapter::Adapter;
use notifyd::config::Config;
use notifyd::descriptor::ParsedDescriptor;
use notifyd::middleware::auth::issue_token;
use notifyd::{routes, AppState};

async fn test_app() -> (Router, Arc<AppState>) {
    let pool = SqlitePoolOptions::new()
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let mut registry = Registry::new();
    registry.register(
        &["fake"],
        "fake",
        None,
        false,
        0,
        Arc::new(|_p: &ParsedDescriptor| {
            Ok(Box::new(FakeAdapter::new("fake")) as Box<dyn Adapter>)
        }),
    );

    let config = Config::default();
    let state = AppState::new(pool, config, registry);

    let app = Router::new()
        .merge(routes::health::router())
        .merge(routes::protected_router())
        .with_state(state.clone());

    (app, state)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_public_and_unauthenticated() {
    let (app, _state) = test_app().await;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn notify_without_credentials_is_rejected() {
    let (app, _state) = test_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/notify")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"body": "hello"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn notify_with_valid_token_dispatches_to_resolved_destination() {
    let (app, state) = test_app().await;
    let token = issue_token(&state.config.auth, "u1", "alice", vec!["admin".into()]).unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/notify")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(
            r#"{"urls": ["fake://host/"], "title": "T", "body": "B", "type": "info"}"#,
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["data"][0]["adapter"], "fake");
    assert_eq!(json["data"][0]["success"], true);
}

#[tokio::test]
async fn notify_with_unresolvable_scheme_skips_it_and_still_succeeds() {
    let (app, state) = test_app().await;
    let token = issue_token(&state.config.auth, "u1", "alice", vec![]).unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/notify")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(r#"{"urls": ["nosuchscheme://host/"], "body": "b"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn notify_with_empty_body_reports_invalid_request_without_http_error() {
    let (app, state) = test_app().await;
    let token = issue_token(&state.config.auth, "u1", "alice", vec![]).unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/notify")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(r#"{"urls": ["fake://host/"], "body": ""}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["data"][0]["error_kind"], "invalid request");
}

#[tokio::test]
async fn notify_increments_the_adapter_sent_metric() {
    let (app, state) = test_app().await;
    let token = issue_token(&state.config.auth, "u1", "alice", vec![]).unwrap();

    let dispatch_request = Request::builder()
        .method("POST")
        .uri("/notify")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(r#"{"urls": ["fake://host/"], "body": "B"}"#))
        .unwrap();
    app.clone().oneshot(dispatch_request).await.unwrap();

    let metrics_request = Request::builder()
        .uri("/metrics")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(metrics_request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let entry = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["metric_key"] == "fake.sent")
        .expect("fake.sent metric row");
    assert_eq!(entry["count"], 1);
}

#[tokio::test]
async fn services_without_credentials_is_rejected() {
    let (app, _state) = test_app().await;
    let request = Request::builder()
        .uri("/services")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn services_lists_the_registered_fake_scheme() {
    let (app, state) = test_app().await;
    let token = issue_token(&state.config.auth, "u1", "alice", vec![]).unwrap();

    let request = Request::builder()
        .uri("/services")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let schemes: Vec<String> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["scheme"].as_str().unwrap().to_string())
        .collect();
    assert!(schemes.contains(&"fake".to_string()));
}
