use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

use crate::entities::vpn_peers;

/// Fields for a peer row about to be persisted. `active`/`created_at` are
/// filled in by the repository.
#[derive(Debug, Clone)]
pub struct NewPeer {
    pub user_id: i32,

    pub wg_private_key: String,

    pub wg_public_key: String,

    pub wg_client_id: Option<String>,

    pub wg_ip: String,

    pub allowed_ips: Option<String>,
}

pub struct PeerRepository {
    conn: DatabaseConnection,
}

impl PeerRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(&self, peer: NewPeer) -> Result<vpn_peers::Model, DbErr> {
        let now = chrono::Utc::now().to_rfc3339();

        let active = vpn_peers::ActiveModel {
            user_id: Set(peer.user_id),
            wg_private_key: Set(peer.wg_private_key),
            wg_public_key: Set(peer.wg_public_key),
            wg_client_id: Set(peer.wg_client_id),
            wg_ip: Set(peer.wg_ip),
            allowed_ips: Set(peer.allowed_ips),
            wg_config_encrypted: Set(None),
            active: Set(true),
            created_at: Set(now),
            ..Default::default()
        };

        active.insert(&self.conn).await
    }

    pub async fn get(&self, id: i32) -> Result<Option<vpn_peers::Model>, DbErr> {
        vpn_peers::Entity::find_by_id(id).one(&self.conn).await
    }

    pub async fn list(
        &self,
        user_id: Option<i32>,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<vpn_peers::Model>, DbErr> {
        let mut query = vpn_peers::Entity::find().order_by_asc(vpn_peers::Column::Id);

        if let Some(user_id) = user_id {
            query = query.filter(vpn_peers::Column::UserId.eq(user_id));
        }

        query.offset(skip).limit(limit).all(&self.conn).await
    }

    /// The peer served by the self-service config path: most recently
    /// created active peer, ties broken by highest id.
    pub async fn latest_active_for_user(
        &self,
        user_id: i32,
    ) -> Result<Option<vpn_peers::Model>, DbErr> {
        vpn_peers::Entity::find()
            .filter(vpn_peers::Column::UserId.eq(user_id))
            .filter(vpn_peers::Column::Active.eq(true))
            .order_by_desc(vpn_peers::Column::CreatedAt)
            .order_by_desc(vpn_peers::Column::Id)
            .one(&self.conn)
            .await
    }

    pub async fn update_fields(
        &self,
        id: i32,
        wg_public_key: String,
        wg_ip: String,
        allowed_ips: Option<String>,
    ) -> Result<Option<vpn_peers::Model>, DbErr> {
        let Some(peer) = self.get(id).await? else {
            return Ok(None);
        };

        let mut active: vpn_peers::ActiveModel = peer.into();
        active.wg_public_key = Set(wg_public_key);
        active.wg_ip = Set(wg_ip);
        active.allowed_ips = Set(allowed_ips);
        Ok(Some(active.update(&self.conn).await?))
    }

    pub async fn attach_encrypted_config(&self, id: i32, token: String) -> Result<(), DbErr> {
        let Some(peer) = self.get(id).await? else {
            return Err(DbErr::RecordNotFound(format!("vpn_peer {id}")));
        };

        let mut active: vpn_peers::ActiveModel = peer.into();
        active.wg_config_encrypted = Set(Some(token));
        active.update(&self.conn).await?;
        Ok(())
    }

    pub async fn delete(&self, id: i32) -> Result<bool, DbErr> {
        let result = vpn_peers::Entity::delete_by_id(id).exec(&self.conn).await?;
        Ok(result.rows_affected > 0)
    }
}

/// Whether a database error is a unique-constraint rejection (duplicate
/// public key or address).
#[must_use]
pub fn is_unique_violation(err: &DbErr) -> bool {
    let message = err.to_string().to_lowercase();
    message.contains("unique constraint") || message.contains("unique violation")
}
