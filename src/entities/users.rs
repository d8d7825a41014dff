use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// UUID v4, assigned at creation
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(unique)]
    pub username: String,

    #[sea_orm(unique)]
    pub email: String,

    /// PBKDF2-HMAC-SHA256 digest, hex encoded
    pub password_hash: String,

    /// Per-user random salt, hex encoded, never reused
    pub salt: String,

    pub is_admin: bool,

    /// False disables login without deleting the account
    pub is_active: bool,

    /// Consecutive failed logins; reset only by a successful login
    pub failed_attempts: i32,

    /// RFC 3339 UTC; login rejected while now < locked_until
    pub locked_until: Option<String>,

    pub last_login: Option<String>,

    pub password_reset_token: Option<String>,

    pub password_reset_expires: Option<String>,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
