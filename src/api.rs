// src/api.rs
//
// HTTP boundary for the (external) command surface: destination
// registration, subscription management, and operator status. Thin glue over
// the store and status board; the pipeline itself never goes through here.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::status::{StatusBoard, StatusSnapshot};
use crate::store::subscriptions::{AddOutcome, Destination, SubscriptionStore};

#[derive(Clone)]
pub struct AppState {
    pub subscriptions: Arc<SubscriptionStore>,
    pub status: Arc<StatusBoard>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(current_status))
        .route("/destinations", axum::routing::post(register_destination))
        .route(
            "/subscriptions",
            axum::routing::post(add_subscription).delete(remove_subscription),
        )
        .route("/subscriptions/{destination_id}", get(list_subscriptions))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct StatusOut {
    destinations: usize,
    #[serde(flatten)]
    pipeline: StatusSnapshot,
}

async fn current_status(State(state): State<AppState>) -> Json<StatusOut> {
    Json(StatusOut {
        destinations: state.subscriptions.destination_count(),
        pipeline: state.status.snapshot(),
    })
}

#[derive(Deserialize)]
struct RegisterReq {
    destination_id: String,
    scope_id: String,
}

async fn register_destination(
    State(state): State<AppState>,
    Json(req): Json<RegisterReq>,
) -> (StatusCode, Json<serde_json::Value>) {
    let destination = Destination {
        destination_id: req.destination_id,
        scope_id: req.scope_id,
    };
    match state.subscriptions.register_destination(destination).await {
        Ok(true) => (StatusCode::CREATED, Json(json!({ "created": true }))),
        Ok(false) => (StatusCode::OK, Json(json!({ "created": false }))),
        Err(e) => {
            tracing::error!(error = %e, "destination registration failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "registration failed" })),
            )
        }
    }
}

#[derive(Deserialize)]
struct SubscriptionReq {
    destination_id: String,
    location: String,
}

async fn add_subscription(
    State(state): State<AppState>,
    Json(req): Json<SubscriptionReq>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state
        .subscriptions
        .add(&req.destination_id, &req.location)
        .await
    {
        Ok(AddOutcome::Added) => (StatusCode::CREATED, Json(json!({ "added": true }))),
        Ok(AddOutcome::Duplicate) => (
            StatusCode::OK,
            Json(json!({ "added": false, "reason": "already subscribed" })),
        ),
        Ok(AddOutcome::UnknownDestination) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "destination not registered" })),
        ),
        Ok(AddOutcome::EmptyLocation) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "location must not be empty" })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "subscription add failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "subscription add failed" })),
            )
        }
    }
}

async fn remove_subscription(
    State(state): State<AppState>,
    Json(req): Json<SubscriptionReq>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state
        .subscriptions
        .remove(&req.destination_id, &req.location)
        .await
    {
        Ok(removed) => (StatusCode::OK, Json(json!({ "removed": removed }))),
        Err(e) => {
            tracing::error!(error = %e, "subscription remove failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "subscription remove failed" })),
            )
        }
    }
}

async fn list_subscriptions(
    State(state): State<AppState>,
    Path(destination_id): Path<String>,
) -> Json<Vec<String>> {
    Json(state.subscriptions.list_for_destination(&destination_id))
}
