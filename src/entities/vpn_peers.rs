use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "vpn_peers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(indexed)]
    pub user_id: i32,

    /// Key material, or an opaque marker for host/control-plane managed
    /// keys. Returned once at creation, scrubbed from every read path.
    pub wg_private_key: String,

    #[sea_orm(unique)]
    pub wg_public_key: String,

    /// Identifier assigned by the wg-easy control-plane, used for remote
    /// deletion. Absent for locally provisioned peers.
    pub wg_client_id: Option<String>,

    #[sea_orm(unique)]
    pub wg_ip: String,

    pub allowed_ips: Option<String>,

    /// Ciphertext of the full wg-quick client config.
    pub wg_config_encrypted: Option<String>,

    pub active: bool,

    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
