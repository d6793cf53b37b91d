use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use brokergate_core::{DataError, ReportRequest};
use serde::Deserialize;
use std::sync::Arc;

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Health
        .route("/health", get(health_check))
        // Broker reports
        .route("/report", get(get_report))
        // Tokens
        .route("/tokens", get(list_tokens))
        .route("/tokens", post(add_token))
        .route("/tokens/{token}", delete(remove_token))
        .route("/tokens/{token}/select", post(select_token))
        .route("/tokens/{token}/account", post(set_account))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ---------------------------------------------------------------------------
// Broker reports
// ---------------------------------------------------------------------------

/// Fetch the broker report for the selected credential's account over the
/// fixed 30-day lookback window.
async fn get_report(State(state): State<Arc<AppState>>) -> Response {
    // Re-resolve the credential per request; it can change at any time and
    // sandbox vs. production is critical.
    let credential = match state.credentials.selected() {
        Ok(Some(credential)) => credential,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "No credential selected"})),
            )
                .into_response()
        }
        Err(e) => return data_error_response(e),
    };

    let Some(account_id) = credential.account_id.clone() else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Selected credential has no account"})),
        )
            .into_response();
    };

    let request = ReportRequest::last_30_days(account_id, credential.is_sandbox);
    let broker = state.brokers.for_credential(&credential);

    match state.reports.fetch(broker, request).await {
        // The body is already serialized JSON (cached or fresh); pass it
        // through byte for byte.
        Ok(Some(body)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddTokenRequest {
    token: String,
    #[serde(default)]
    is_sandbox: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetAccountRequest {
    account_id: String,
}

async fn list_tokens(State(state): State<Arc<AppState>>) -> Response {
    match state.credentials.list() {
        Ok(credentials) => Json(credentials).into_response(),
        Err(e) => data_error_response(e),
    }
}

async fn add_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddTokenRequest>,
) -> Response {
    match state.credentials.add(&req.token, req.is_sandbox) {
        Ok(credential) => (StatusCode::CREATED, Json(credential)).into_response(),
        Err(e) => data_error_response(e),
    }
}

async fn remove_token(State(state): State<Arc<AppState>>, Path(token): Path<String>) -> Response {
    match state.credentials.remove(&token) {
        Ok(()) => Json(serde_json::json!({"status": "removed"})).into_response(),
        Err(e) => data_error_response(e),
    }
}

async fn select_token(State(state): State<Arc<AppState>>, Path(token): Path<String>) -> Response {
    match state.credentials.select(&token) {
        Ok(()) => Json(serde_json::json!({"status": "selected"})).into_response(),
        Err(e) => data_error_response(e),
    }
}

async fn set_account(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(req): Json<SetAccountRequest>,
) -> Response {
    match state.credentials.set_account(&token, &req.account_id) {
        Ok(credential) => Json(credential).into_response(),
        Err(e) => data_error_response(e),
    }
}

fn data_error_response(e: DataError) -> Response {
    match e {
        DataError::NotFound(message) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": message})),
        )
            .into_response(),
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": other.to_string()})),
        )
            .into_response(),
    }
}
