use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter};

use crate::entities::{user_tariffs, users};

/// The authenticated principal as seen by the peer subsystem.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i32,
    pub email: String,
    pub is_admin: bool,
}

impl From<users::Model> for AuthUser {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            is_admin: model.is_admin,
        }
    }
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Resolve an API key to its user. Inactive users never authenticate.
    pub async fn verify_api_key(&self, api_key: &str) -> Result<Option<AuthUser>, DbErr> {
        let user = users::Entity::find()
            .filter(users::Column::ApiKey.eq(api_key))
            .filter(users::Column::Active.eq(true))
            .one(&self.conn)
            .await?;

        Ok(user.map(AuthUser::from))
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<AuthUser>, DbErr> {
        let user = users::Entity::find_by_id(id).one(&self.conn).await?;
        Ok(user.map(AuthUser::from))
    }

    /// Whether the user currently holds an unexpired tariff. Timestamps are
    /// stored as RFC3339 UTC strings, which compare lexicographically.
    pub async fn has_active_subscription(&self, user_id: i32) -> Result<bool, DbErr> {
        let now = chrono::Utc::now().to_rfc3339();

        let count = user_tariffs::Entity::find()
            .filter(user_tariffs::Column::UserId.eq(user_id))
            .filter(user_tariffs::Column::ExpiresAt.gt(now))
            .count(&self.conn)
            .await?;

        Ok(count > 0)
    }
}
