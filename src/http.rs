//! Management REST API — thin CRUD over aliases, webhooks, and bindings.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::error;
use uuid::Uuid;

use crate::address::Address;
use crate::error::DatabaseError;
use crate::store::{Registry, WebhookRecord};
use crate::webhook::{Blueprint, Webhook};

/// Shared state for the management routes.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<dyn Registry>,
    /// Domain new aliases are provisioned under.
    pub domain: String,
}

/// Builds the management router.
pub fn management_routes(state: ApiState) -> Router {
    Router::new()
        .route("/addresses", get(list_addresses))
        .route("/address/user/random", post(create_random_address))
        .route("/address/user/{user}", post(create_address))
        .route("/address/{addr}/webhooks", get(address_webhooks))
        .route(
            "/address/{addr}/webhook/{id}",
            post(bind_webhook).delete(unbind_webhook),
        )
        .route("/webhook", post(create_webhook))
        .route("/webhook/{id}", get(find_webhook))
        .route("/webhooks", get(list_webhooks))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn bad_request(err: impl std::fmt::Display) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": err.to_string()})),
    )
}

fn internal(context: &str, err: impl std::fmt::Display) -> (StatusCode, Json<serde_json::Value>) {
    error!(error = %err, "{context}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": err.to_string()})),
    )
}

/// GET /addresses
async fn list_addresses(State(state): State<ApiState>) -> impl IntoResponse {
    match state.registry.list_addresses().await {
        Ok(addresses) => {
            let rendered: Vec<String> = addresses.iter().map(|a| a.to_string()).collect();
            (StatusCode::OK, Json(json!({"addresses": rendered})))
        }
        Err(e) => internal("failed to list addresses", e),
    }
}

/// POST /address/user/{user}
async fn create_address(
    State(state): State<ApiState>,
    Path(user): Path<String>,
) -> impl IntoResponse {
    let addr = match Address::new(&user, &state.domain) {
        Ok(addr) => addr,
        Err(e) => return bad_request(e),
    };
    match state.registry.create_address(&addr).await {
        Ok(()) => (
            StatusCode::CREATED,
            Json(json!({"address": addr.to_string()})),
        ),
        Err(e) => internal("failed to create address", e),
    }
}

/// POST /address/user/random
async fn create_random_address(State(state): State<ApiState>) -> impl IntoResponse {
    let addr = match Address::random(&state.domain) {
        Ok(addr) => addr,
        Err(e) => return internal("failed to generate address", e),
    };
    match state.registry.create_address(&addr).await {
        Ok(()) => (
            StatusCode::CREATED,
            Json(json!({"address": addr.to_string()})),
        ),
        Err(e) => internal("failed to create address", e),
    }
}

/// GET /address/{addr}/webhooks
async fn address_webhooks(
    State(state): State<ApiState>,
    Path(addr): Path<String>,
) -> impl IntoResponse {
    let addr = match Address::parse(&addr) {
        Ok(addr) => addr,
        Err(e) => return bad_request(e),
    };
    match state.registry.webhooks_for(&addr).await {
        Ok(records) => {
            let ids: Vec<String> = records.iter().map(|r| r.id.to_string()).collect();
            (StatusCode::OK, Json(json!({"webhooks": ids})))
        }
        Err(e) => internal("failed to resolve webhooks", e),
    }
}

/// POST /address/{addr}/webhook/{id}
async fn bind_webhook(
    State(state): State<ApiState>,
    Path((addr, id)): Path<(String, String)>,
) -> impl IntoResponse {
    let (addr, id) = match parse_binding(&addr, &id) {
        Ok(pair) => pair,
        Err(response) => return response,
    };
    match state.registry.bind(&addr, id).await {
        Ok(()) => (StatusCode::CREATED, Json(json!({}))),
        Err(e) => internal("failed to bind webhook", e),
    }
}

/// DELETE /address/{addr}/webhook/{id}
async fn unbind_webhook(
    State(state): State<ApiState>,
    Path((addr, id)): Path<(String, String)>,
) -> impl IntoResponse {
    let (addr, id) = match parse_binding(&addr, &id) {
        Ok(pair) => pair,
        Err(response) => return response,
    };
    match state.registry.unbind(&addr, id).await {
        Ok(()) => (StatusCode::OK, Json(json!({}))),
        Err(e) => internal("failed to unbind webhook", e),
    }
}

fn parse_binding(
    addr: &str,
    id: &str,
) -> Result<(Address, Uuid), (StatusCode, Json<serde_json::Value>)> {
    let addr = Address::parse(addr).map_err(bad_request)?;
    let id = Uuid::parse_str(id).map_err(bad_request)?;
    Ok((addr, id))
}

/// POST /webhook
///
/// Accepts a [`Blueprint`]; the webhook is constructed first so an invalid
/// description never reaches the registry.
async fn create_webhook(
    State(state): State<ApiState>,
    Json(blueprint): Json<Blueprint>,
) -> impl IntoResponse {
    let webhook = match Webhook::from_blueprint(&blueprint) {
        Ok(webhook) => webhook,
        Err(e) => return bad_request(e),
    };
    let record = WebhookRecord::from_webhook(&webhook);
    match state.registry.upsert_webhook(&record).await {
        Ok(()) => (
            StatusCode::CREATED,
            Json(json!({"id": webhook.id().to_string()})),
        ),
        Err(e) => internal("failed to persist webhook", e),
    }
}

/// GET /webhook/{id}
async fn find_webhook(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = match Uuid::parse_str(&id) {
        Ok(id) => id,
        Err(e) => return bad_request(e).into_response(),
    };
    match state.registry.find_webhook(id).await {
        Ok(record) => (StatusCode::OK, Json(record.to_blueprint())).into_response(),
        Err(DatabaseError::NotFound { .. }) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => internal("failed to fetch webhook", e).into_response(),
    }
}

/// GET /webhooks
async fn list_webhooks(State(state): State<ApiState>) -> impl IntoResponse {
    match state.registry.list_webhooks().await {
        Ok(records) => {
            let blueprints: Vec<Blueprint> =
                records.iter().map(WebhookRecord::to_blueprint).collect();
            (StatusCode::OK, Json(blueprints)).into_response()
        }
        Err(e) => internal("failed to list webhooks", e).into_response(),
    }
}
