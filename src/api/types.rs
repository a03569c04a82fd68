use serde::{Deserialize, Serialize};

use crate::services::{CreatePeerRequest, PeerRecord, UpdatePeerRequest};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PeerDto {
    pub id: i32,

    pub user_id: i32,

    pub wg_public_key: String,

    /// Present only in the creation response; always null on reads.
    pub wg_private_key: Option<String>,

    pub wg_ip: String,

    pub allowed_ips: Option<String>,

    pub active: bool,

    pub created_at: String,
}

impl From<PeerRecord> for PeerDto {
    fn from(record: PeerRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            wg_public_key: record.wg_public_key,
            wg_private_key: record.wg_private_key,
            wg_ip: record.wg_ip,
            allowed_ips: record.allowed_ips,
            active: record.active,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CreatePeerBody {
    pub user_id: Option<i32>,

    pub wg_public_key: Option<String>,

    pub wg_ip: Option<String>,

    pub allowed_ips: Option<String>,

    pub device_name: Option<String>,
}

impl From<CreatePeerBody> for CreatePeerRequest {
    fn from(body: CreatePeerBody) -> Self {
        Self {
            user_id: body.user_id,
            wg_public_key: body.wg_public_key,
            wg_ip: body.wg_ip,
            allowed_ips: body.allowed_ips,
            device_name: body.device_name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdatePeerBody {
    pub wg_public_key: Option<String>,

    pub wg_ip: Option<String>,

    pub allowed_ips: Option<String>,
}

impl From<UpdatePeerBody> for UpdatePeerRequest {
    fn from(body: UpdatePeerBody) -> Self {
        Self {
            wg_public_key: body.wg_public_key,
            wg_ip: body.wg_ip,
            allowed_ips: body.allowed_ips,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PeerListQuery {
    pub user_id: Option<i32>,

    #[serde(default)]
    pub skip: u64,

    #[serde(default = "default_limit")]
    pub limit: u64,
}

const fn default_limit() -> u64 {
    100
}

#[derive(Debug, Serialize)]
pub struct WgQuickResponse {
    pub wg_quick: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
