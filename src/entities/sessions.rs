use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    /// Opaque session token (32 random bytes, hex encoded)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub user_id: String,

    pub created_at: String,

    /// Bumped on every successful validation
    pub last_activity_at: String,

    /// Absolute expiry, fixed at creation; never extended
    pub expires_at: String,

    /// Revoked sessions are kept until the retention sweep deletes them
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
