use sea_orm::entity::prelude::*;

/// Append-only security event. Rows are never updated; retention is
/// enforced by pruning the oldest entries beyond a configured cap.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "audit_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Absent when the actor is unknown (e.g. login with unknown username)
    pub user_id: Option<String>,

    pub action: String,

    pub success: bool,

    pub details: String,

    pub ip_address: Option<String>,

    pub user_agent: Option<String>,

    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
