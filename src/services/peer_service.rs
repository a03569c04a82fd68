//! Domain service for VPN peer provisioning.
//!
//! This module provides the [`PeerService`] trait, abstracting peer
//! creation under the configured key policy, reads/updates/deletion with
//! ownership checks, and self-service config retrieval.

use thiserror::Error;

use crate::entities::vpn_peers;

/// Domain errors for peer operations. Only these cross to the API layer;
/// best-effort host and config-attach failures are logged and absorbed.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("Not allowed")]
    Forbidden,

    #[error("Active subscription required")]
    SubscriptionRequired,

    #[error("Peer not found")]
    NotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Control-plane error: {0}")]
    Upstream(String),

    #[error("Stored config could not be decrypted")]
    Decryption,

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// The authenticated principal, as resolved by the API layer.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i32,

    pub is_admin: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CreatePeerRequest {
    /// Target user; defaults to the requester. Ignored on the self-service
    /// entry point.
    pub user_id: Option<i32>,

    /// Client-provided public key; a fresh private key is still generated.
    pub wg_public_key: Option<String>,

    pub wg_ip: Option<String>,

    pub allowed_ips: Option<String>,

    /// Client-visible device name, used as the control-plane client name.
    pub device_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdatePeerRequest {
    pub wg_public_key: Option<String>,

    pub wg_ip: Option<String>,

    pub allowed_ips: Option<String>,
}

/// A peer as returned to callers. `wg_private_key` is only populated in the
/// creation response; every read path scrubs it.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub id: i32,
    pub user_id: i32,
    pub wg_public_key: String,
    pub wg_private_key: Option<String>,
    pub wg_ip: String,
    pub allowed_ips: Option<String>,
    pub active: bool,
    pub created_at: String,
}

impl PeerRecord {
    /// A record with the private key scrubbed, regardless of what the row
    /// holds.
    #[must_use]
    pub fn scrubbed(model: vpn_peers::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            wg_public_key: model.wg_public_key,
            wg_private_key: None,
            wg_ip: model.wg_ip,
            allowed_ips: model.allowed_ips,
            active: model.active,
            created_at: model.created_at,
        }
    }

    /// The one-time creation response, carrying the private key when the
    /// policy yielded one.
    #[must_use]
    pub fn with_private_key(model: vpn_peers::Model, private_key: Option<String>) -> Self {
        let mut record = Self::scrubbed(model);
        record.wg_private_key = private_key;
        record
    }
}

/// Key material produced by whichever policy branch ran, carried uniformly
/// through the provisioning flow.
#[derive(Debug, Clone, Default)]
pub(crate) struct KeyMaterial {
    pub private_key: String,

    pub public_key: String,

    /// Control-plane client id, when the `wg-easy` policy created one.
    pub external_client_id: Option<String>,

    /// Address advertised by the control-plane config, if any. Caller-
    /// supplied values take precedence.
    pub address: Option<String>,

    pub allowed_ips: Option<String>,

    /// The raw config document fetched from the control-plane, stored
    /// encrypted in preference to a synthesized one.
    pub config_text: Option<String>,
}

#[async_trait::async_trait]
pub trait PeerService: Send + Sync {
    /// Create a peer for `request.user_id` (default: the requester).
    /// Requires admin or self-targeting.
    ///
    /// # Errors
    ///
    /// - [`PeerError::Forbidden`] when targeting another user without admin
    /// - [`PeerError::Upstream`] when the control-plane create call fails
    /// - [`PeerError::Conflict`] on duplicate public key or address
    async fn create_peer(
        &self,
        requester: &CurrentUser,
        request: CreatePeerRequest,
    ) -> Result<PeerRecord, PeerError>;

    /// Self-service creation: the target is always the requester, and an
    /// active subscription is required.
    async fn create_peer_self(
        &self,
        requester: &CurrentUser,
        request: CreatePeerRequest,
    ) -> Result<PeerRecord, PeerError>;

    /// List peers, scoped to the requester unless admin.
    async fn list_peers(
        &self,
        requester: &CurrentUser,
        user_id: Option<i32>,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<PeerRecord>, PeerError>;

    async fn get_peer(&self, requester: &CurrentUser, id: i32) -> Result<PeerRecord, PeerError>;

    /// Replace public key / address / allowed-ips. No key regeneration.
    async fn update_peer(
        &self,
        requester: &CurrentUser,
        id: i32,
        request: UpdatePeerRequest,
    ) -> Result<PeerRecord, PeerError>;

    /// Delete a peer, then best-effort remove it from the host and the
    /// control-plane.
    async fn delete_peer(&self, requester: &CurrentUser, id: i32) -> Result<(), PeerError>;

    /// Decrypted wg-quick config for the requester's most recent active
    /// peer. Requires an active subscription.
    async fn self_config(&self, requester: &CurrentUser) -> Result<String, PeerError>;
}
