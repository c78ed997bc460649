//! HTTP surface: health, leaderboard, agent lookup, Prometheus metrics

use std::sync::Arc;

use arena_common::{AgentState, LeaderboardEntry};
use arena_ledger::PopulationStore;
use arena_market::Dispatcher;
use axum::{
    extract::{Path, Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

/// Default leaderboard size
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PopulationStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub registry: Registry,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherHealth {
    pub running: bool,
    pub active_workers: usize,
    pub queued_jobs: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store: String,
    pub dispatcher: DispatcherHealth,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/leaderboard", get(leaderboard))
        .route("/agents/:agent_id", get(get_agent))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store = match state.store.ping().await {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            warn!(error = %e, "Store health check failed");
            e.to_string()
        }
    };
    let store_ok = store == "ok";
    let running = !state.dispatcher.is_shut_down();

    let status = if store_ok && running {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if status == StatusCode::OK { "healthy" } else { "degraded" }.to_string(),
            version: arena_common::VERSION.to_string(),
            store,
            dispatcher: DispatcherHealth {
                running,
                active_workers: state.dispatcher.active_workers(),
                queued_jobs: state.dispatcher.total_queued(),
            },
        }),
    )
}

async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Json<Vec<LeaderboardEntry>> {
    let limit = query.limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT);
    Json(state.store.leaderboard(limit).await)
}

async fn get_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentState>, (StatusCode, String)> {
    let id = Uuid::parse_str(&agent_id)
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid agent id".to_string()))?;
    state
        .store
        .get_agent(&id)
        .await
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Agent not found".to_string()))
}

async fn metrics(State(state): State<AppState>) -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&state.registry.gather(), &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    ([(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer).into_response()
}
