//! HTTP route definitions

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::game::map::{MapDefinition, MapSummary};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.client_origin);

    // The socket route stays outside the timeout; it lives for the whole session
    let api = Router::new()
        .route("/health", get(health_handler))
        .route("/maps", get(maps_handler))
        .route("/maps/:id", get(map_handler))
        .layer(TimeoutLayer::new(Duration::from_secs(10)));

    Router::new()
        .merge(api)
        .route("/ws", get(ws_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS from a comma separated origin list; `*` allows any origin
fn cors_layer(client_origin: &str) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if client_origin.split(',').any(|o| o.trim() == "*") {
        return base.allow_origin(Any);
    }

    let allowed_origins: Vec<header::HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();
    base.allow_origin(allowed_origins)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_rooms: usize,
    active_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let (active_rooms, active_players) = {
        let rooms = state.rooms.lock();
        (rooms.room_count(), rooms.player_count())
    };

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_rooms,
        active_players,
    })
}

// ============================================================================
// Map endpoints
// ============================================================================

async fn maps_handler(State(state): State<AppState>) -> Json<Vec<MapSummary>> {
    Json(state.maps.list())
}

async fn map_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MapDefinition>, AppError> {
    state
        .maps
        .get(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("map {id}")))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
