use axum::{
    Json, Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::state::SharedState;

pub mod auth;
mod error;
mod peers;
pub mod types;

pub use error::ApiError;
pub use types::*;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Arc<Config> {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }

    #[must_use]
    pub fn peer_service(&self) -> &Arc<dyn crate::services::PeerService> {
        &self.shared.peer_service
    }
}

pub async fn create_app_state(shared: Arc<SharedState>) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
    })
}

pub async fn create_app_state_from_config(config: Config) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared).await)
}

pub async fn router(state: Arc<AppState>) -> Router {
    let peer_routes = Router::new()
        .route(
            "/vpn_peers",
            post(peers::create_peer).get(peers::list_peers),
        )
        .route(
            "/vpn_peers/",
            post(peers::create_peer).get(peers::list_peers),
        )
        .route("/vpn_peers/self", post(peers::create_peer_self))
        .route("/vpn_peers/self/config", get(peers::get_self_config))
        .route(
            "/vpn_peers/{id}",
            get(peers::get_peer)
                .put(peers::update_peer)
                .delete(peers::delete_peer),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .with_state(state.clone());

    let public_routes = Router::new()
        .route("/health", get(health))
        .with_state(state.clone());

    let cors_origins: Vec<HeaderValue> = state
        .config()
        .server
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(cors_origins)
        .allow_methods(Any)
        .allow_headers(Any);

    public_routes
        .merge(peer_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: String,

    uptime_seconds: u64,
}

async fn health(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> Result<Json<ApiResponse<HealthResponse>>, ApiError> {
    state
        .store()
        .ping()
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(ApiResponse::success(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })))
}
