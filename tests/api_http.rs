// tests/api_http.rs
//
// HTTP-level tests for the admin/status Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value as Json};
use tower::ServiceExt as _; // for `oneshot`

use bounty_notifier::api::{self, AppState};
use bounty_notifier::status::{CycleSummary, StatusBoard};
use bounty_notifier::store::subscriptions::SubscriptionStore;

const BODY_LIMIT: usize = 1024 * 1024;

async fn test_state(dir: &tempfile::TempDir) -> AppState {
    AppState {
        subscriptions: Arc::new(
            SubscriptionStore::open(dir.path().join("subs.json"))
                .await
                .unwrap(),
        ),
        status: Arc::new(StatusBoard::new()),
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build GET request")
}

fn json_request(method: &str, uri: &str, payload: Json) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build JSON request")
}

async fn body_json(resp: axum::response::Response) -> Json {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    serde_json::from_slice(&bytes).expect("parse body json")
}

#[tokio::test]
async fn health_returns_200_and_ok_body() {
    let dir = tempfile::tempdir().unwrap();
    let app: Router = api::create_router(test_state(&dir).await);

    let resp = app.oneshot(get("/health")).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    assert_eq!(String::from_utf8(bytes).unwrap(), "ok");
}

#[tokio::test]
async fn register_subscribe_list_remove_flow() {
    let dir = tempfile::tempdir().unwrap();
    let app = api::create_router(test_state(&dir).await);

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/destinations",
            json!({ "destination_id": "chan-1", "scope_id": "guild-1" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/subscriptions",
            json!({ "destination_id": "chan-1", "location": "Remote" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    // Same normalized key: reported as duplicate, not an error.
    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/subscriptions",
            json!({ "destination_id": "chan-1", "location": " remote " }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["added"], false);

    let resp = app
        .clone()
        .oneshot(get("/subscriptions/chan-1"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!(["Remote"]));

    let resp = app
        .clone()
        .oneshot(json_request(
            "DELETE",
            "/subscriptions",
            json!({ "destination_id": "chan-1", "location": "REMOTE" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["removed"], true);

    let resp = app.oneshot(get("/subscriptions/chan-1")).await.unwrap();
    assert_eq!(body_json(resp).await, json!([]));
}

#[tokio::test]
async fn subscribing_an_unregistered_destination_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = api::create_router(test_state(&dir).await);

    let resp = app
        .oneshot(json_request(
            "POST",
            "/subscriptions",
            json!({ "destination_id": "nope", "location": "Remote" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn blank_location_is_unprocessable() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir).await;
    state
        .subscriptions
        .register_destination(bounty_notifier::store::subscriptions::Destination {
            destination_id: "chan-1".into(),
            scope_id: "guild-1".into(),
        })
        .await
        .unwrap();
    let app = api::create_router(state);

    let resp = app
        .oneshot(json_request(
            "POST",
            "/subscriptions",
            json!({ "destination_id": "chan-1", "location": "   " }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn status_reports_counts_and_last_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir).await;
    state
        .subscriptions
        .register_destination(bounty_notifier::store::subscriptions::Destination {
            destination_id: "chan-1".into(),
            scope_id: "guild-1".into(),
        })
        .await
        .unwrap();

    let mut summary = CycleSummary::begin(Utc::now());
    summary.fetched = 5;
    summary.fresh = 2;
    summary.matched_pairs = 2;
    summary.delivered = 1;
    summary.rejected = 1;
    state.status.record_cycle(summary);

    let app = api::create_router(state);
    let resp = app.oneshot(get("/status")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let v = body_json(resp).await;
    assert_eq!(v["destinations"], 1);
    assert_eq!(v["cycles_run"], 1);
    assert_eq!(v["last_cycle"]["fetched"], 5);
    assert_eq!(v["last_cycle"]["delivered"], 1);
    assert_eq!(v["last_cycle"]["rejected"], 1);
    assert!(v["last_error"].is_null());
}
