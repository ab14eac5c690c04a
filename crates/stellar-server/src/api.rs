//! HTTP handlers and the router.
//!
//! The wire contract: camelCase JSON bodies, `{"success": true, ...}` on
//! every non-error path, 400 for a missing or malformed id, 404 for an
//! unknown row, 500 for store failures. Preflight `OPTIONS` is answered by
//! the CORS layer with permissive headers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use stellar_engine::prelude::*;
use stellar_store::prelude::*;

/// Build the application router around a shared store.
pub fn router(store: Arc<MemoryStore>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/tick", post(tick))
        .route("/mark-inactive", post(mark_inactive))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(store)
}

type ApiResponse = (StatusCode, Json<Value>);

fn bad_request(message: &str) -> ApiResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message })),
    )
}

/// Parse an id field, distinguishing "missing" from "malformed".
fn parse_id(field: &str, value: Option<&String>) -> Result<Uuid, ApiResponse> {
    let Some(raw) = value else {
        return Err(bad_request(&format!("Missing {field}")));
    };
    Uuid::parse_str(raw).map_err(|_| bad_request(&format!("Invalid {field}")))
}

// ---------------------------------------------------------------------------
// POST /tick
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickRequest {
    pub game_id: Option<String>,
}

async fn tick(
    State(store): State<Arc<MemoryStore>>,
    Json(request): Json<TickRequest>,
) -> ApiResponse {
    let game_id = match parse_id("gameId", request.game_id.as_ref()) {
        Ok(id) => GameId(id),
        Err(response) => return response,
    };

    match process_tick(&store, game_id, Utc::now()) {
        Ok(TickOutcome::Advanced { tick, stats }) => (
            StatusCode::OK,
            Json(json!({ "success": true, "tick": tick, "stats": stats })),
        ),
        Ok(TickOutcome::Completed {
            tick,
            winner_id,
            winning_percentage,
        }) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "tick": tick,
                "gameComplete": true,
                "winner": winner_id,
                "winningPercentage": winning_percentage,
            })),
        ),
        Ok(TickOutcome::Skipped(reason)) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": reason.message() })),
        ),
        Err(TickError::Store(StoreError::UnknownGame(_))) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Game not found" })),
        ),
        Err(e) => {
            tracing::error!(error = %e, game_id = %game_id, "tick processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Tick processing failed", "details": e.to_string() })),
            )
        }
    }
}

// ---------------------------------------------------------------------------
// POST /mark-inactive
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkInactiveRequest {
    pub game_id: Option<String>,
    pub player_id: Option<String>,
}

async fn mark_inactive(
    State(store): State<Arc<MemoryStore>>,
    Json(request): Json<MarkInactiveRequest>,
) -> ApiResponse {
    let game_id = match parse_id("gameId", request.game_id.as_ref()) {
        Ok(id) => GameId(id),
        Err(response) => return response,
    };
    let player_id = match parse_id("playerId", request.player_id.as_ref()) {
        Ok(id) => PlayerId(id),
        Err(response) => return response,
    };

    match store.set_participant_inactive(game_id, player_id) {
        Ok(_) => (StatusCode::OK, Json(json!({ "success": true }))),
        Err(StoreError::UnknownParticipant { .. }) | Err(StoreError::UnknownGame(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Participant not found" })),
        ),
        Err(e) => {
            tracing::error!(error = %e, game_id = %game_id, "mark-inactive failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Update failed", "details": e.to_string() })),
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
