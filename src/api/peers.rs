use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use std::sync::Arc;

use super::types::{
    ApiResponse, CreatePeerBody, MessageResponse, PeerDto, PeerListQuery, UpdatePeerBody,
    WgQuickResponse,
};
use super::{ApiError, AppState};
use crate::services::CurrentUser;

/// POST /vpn_peers/
/// Create a peer for the requester or, as admin, for another user. The
/// private key is returned here exactly once.
pub async fn create_peer(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(body): Json<CreatePeerBody>,
) -> Result<Json<ApiResponse<PeerDto>>, ApiError> {
    let record = state
        .peer_service()
        .create_peer(&current, body.into())
        .await?;
    Ok(Json(ApiResponse::success(record.into())))
}

/// POST /vpn_peers/self
/// Same as create, but the target is always the requester and an active
/// subscription is required.
pub async fn create_peer_self(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(body): Json<CreatePeerBody>,
) -> Result<Json<ApiResponse<PeerDto>>, ApiError> {
    let record = state
        .peer_service()
        .create_peer_self(&current, body.into())
        .await?;
    Ok(Json(ApiResponse::success(record.into())))
}

/// GET /vpn_peers/
pub async fn list_peers(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<PeerListQuery>,
) -> Result<Json<ApiResponse<Vec<PeerDto>>>, ApiError> {
    let peers = state
        .peer_service()
        .list_peers(&current, query.user_id, query.skip, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(
        peers.into_iter().map(PeerDto::from).collect(),
    )))
}

/// GET /vpn_peers/{id}
pub async fn get_peer(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<PeerDto>>, ApiError> {
    let record = state.peer_service().get_peer(&current, id).await?;
    Ok(Json(ApiResponse::success(record.into())))
}

/// GET /vpn_peers/self/config
/// Decrypted wg-quick config for the requester's most recent active peer.
pub async fn get_self_config(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<WgQuickResponse>>, ApiError> {
    let wg_quick = state.peer_service().self_config(&current).await?;
    Ok(Json(ApiResponse::success(WgQuickResponse { wg_quick })))
}

/// PUT /vpn_peers/{id}
pub async fn update_peer(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(body): Json<UpdatePeerBody>,
) -> Result<Json<ApiResponse<PeerDto>>, ApiError> {
    let record = state
        .peer_service()
        .update_peer(&current, id, body.into())
        .await?;
    Ok(Json(ApiResponse::success(record.into())))
}

/// DELETE /vpn_peers/{id}
pub async fn delete_peer(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state.peer_service().delete_peer(&current, id).await?;
    Ok(Json(ApiResponse::success(MessageResponse {
        message: "deleted".to_string(),
    })))
}
