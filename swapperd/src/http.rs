//! HTTP surface, grounded on the Go original's
//! `adapters/http.NewServer`, rebuilt on `axum`.
//!
//! Routes: `POST /swaps` (Basic auth) creates a swap; `GET /swaps` lists
//! receipts; `POST /transfers` and `GET /balances` are out of scope for
//! this core (stubbed `501`); `GET /info` is unauthenticated.

use crate::supervisor::Supervisor;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use swapperd_core::store::SwapStore;
use swapperd_core::types::{StepStatus, Token};
use swapperd_core::{SwapBlob, SwapID, SwapReceipt};

use tower_http::cors::{Any, CorsLayer};

/// Wire shape for `POST /swaps`: identical to [`SwapBlob`] but without
/// `id` (server-assigned) or `password` (carried in the Basic auth header
/// instead).
#[derive(Debug, Deserialize, Serialize)]
struct SwapRequest {
    send_token: Token,
    receive_token: Token,
    send_amount: String,
    receive_amount: String,
    send_to: String,
    receive_from: String,
    #[serde(default)]
    secret_hash: Option<[u8; 32]>,
    time_lock: Option<i64>,
    should_initiate_first: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub store: Arc<crate::sled_store::SledStore>,
    pub password: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/swaps", post(create_swap).get(list_swaps))
        .route("/transfers", post(not_implemented))
        .route("/balances", get(not_implemented))
        .route("/info", get(info))
        .layer(CorsLayer::new().allow_methods([axum::http::Method::GET, axum::http::Method::POST]).allow_origin(Any))
        .with_state(state)
}

struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

fn check_auth(headers: &HeaderMap, expected_password: &str) -> Result<(), ApiError> {
    let auth = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError(StatusCode::UNAUTHORIZED, "missing authorization header".into()))?;

    let encoded = auth.strip_prefix("Basic ").ok_or_else(|| ApiError(StatusCode::UNAUTHORIZED, "expected Basic auth".into()))?;
    use base64::Engine;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| ApiError(StatusCode::UNAUTHORIZED, "malformed Basic auth".into()))?;
    let decoded = String::from_utf8(decoded).map_err(|_| ApiError(StatusCode::UNAUTHORIZED, "malformed Basic auth".into()))?;
    let password = decoded.split_once(':').map(|(_, p)| p).unwrap_or(&decoded);

    if password != expected_password {
        return Err(ApiError(StatusCode::UNAUTHORIZED, "invalid password".into()));
    }
    Ok(())
}

async fn create_swap(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<SwapRequest>) -> Result<Response, ApiError> {
    check_auth(&headers, &state.password)?;

    // `password` derives this swap's disposable keys; it must not be the
    // long-lived Basic auth secret every swap would otherwise share.
    let password = generate_swap_password();

    let blob = SwapBlob {
        id: SwapID::generate(),
        send_token: req.send_token,
        receive_token: req.receive_token,
        send_amount: req.send_amount,
        receive_amount: req.receive_amount,
        send_to: req.send_to,
        receive_from: req.receive_from,
        secret_hash: req.secret_hash,
        time_lock: req.time_lock,
        should_initiate_first: req.should_initiate_first,
        password,
        step: StepStatus::Inactive,
        secret: None,
        personal_contract: None,
        foreign_contract: None,
        expiry: None,
    };

    state
        .store
        .put_pending_swap(&blob)
        .await
        .map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let now = swapperd_core::types::now_unix();
    let receipt = SwapReceipt::new(&blob, now);
    state
        .store
        .put_swap_receipt(&receipt)
        .await
        .map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    state.supervisor.start_swap(blob.id);

    Ok((StatusCode::CREATED, Json(blob)).into_response())
}

async fn list_swaps(State(state): State<AppState>) -> Result<Json<Vec<SwapReceipt>>, ApiError> {
    let receipts = state
        .store
        .list_swap_receipts()
        .await
        .map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(receipts))
}

fn generate_swap_password() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

async fn not_implemented() -> StatusCode {
    StatusCode::NOT_IMPLEMENTED
}

async fn info() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "name": "swapperd", "version": env!("CARGO_PKG_VERSION") }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_basic_auth() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert!(check_auth(&headers, "secret").is_err());
    }

    #[test]
    fn accepts_matching_password() {
        use base64::Engine;
        let mut headers = HeaderMap::new();
        let encoded = base64::engine::general_purpose::STANDARD.encode(":secret");
        headers.insert(axum::http::header::AUTHORIZATION, format!("Basic {encoded}").parse().unwrap());
        assert!(check_auth(&headers, "secret").is_ok());
    }
}
