use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionTrait,
};

use crate::entities::{prelude::*, sessions};

pub struct SessionRepository {
    conn: DatabaseConnection,
}

impl SessionRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Issue a session. Any previously active sessions for the same user are
    /// deactivated in the same transaction, so at most one session per
    /// principal is ever active.
    pub async fn create(
        &self,
        token: &str,
        user_id: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<()> {
        let txn = self.conn.begin().await?;

        Sessions::update_many()
            .col_expr(sessions::Column::IsActive, Expr::value(false))
            .filter(sessions::Column::UserId.eq(user_id))
            .filter(sessions::Column::IsActive.eq(true))
            .exec(&txn)
            .await
            .context("Failed to deactivate previous sessions")?;

        Sessions::insert(sessions::ActiveModel {
            id: Set(token.to_string()),
            user_id: Set(user_id.to_string()),
            created_at: Set(now.to_rfc3339()),
            last_activity_at: Set(now.to_rfc3339()),
            expires_at: Set((now + ttl).to_rfc3339()),
            is_active: Set(true),
        })
        .exec(&txn)
        .await
        .context("Failed to insert session")?;

        txn.commit().await?;
        Ok(())
    }

    pub async fn find_by_id(&self, token: &str) -> Result<Option<sessions::Model>> {
        let session = Sessions::find_by_id(token)
            .one(&self.conn)
            .await
            .context("Failed to query session")?;

        Ok(session)
    }

    pub async fn find_active_by_id(&self, token: &str) -> Result<Option<sessions::Model>> {
        let session = Sessions::find_by_id(token)
            .filter(sessions::Column::IsActive.eq(true))
            .one(&self.conn)
            .await
            .context("Failed to query active session")?;

        Ok(session)
    }

    /// Bump `last_activity_at`. Expiry is absolute and never moves.
    pub async fn touch(&self, token: &str, now: DateTime<Utc>) -> Result<()> {
        Sessions::update_many()
            .col_expr(
                sessions::Column::LastActivityAt,
                Expr::value(now.to_rfc3339()),
            )
            .filter(sessions::Column::Id.eq(token))
            .exec(&self.conn)
            .await
            .context("Failed to touch session")?;

        Ok(())
    }

    /// Deactivate a single session. Returns false when it was already
    /// inactive or unknown.
    pub async fn deactivate(&self, token: &str) -> Result<bool> {
        let result = Sessions::update_many()
            .col_expr(sessions::Column::IsActive, Expr::value(false))
            .filter(sessions::Column::Id.eq(token))
            .filter(sessions::Column::IsActive.eq(true))
            .exec(&self.conn)
            .await
            .context("Failed to deactivate session")?;

        Ok(result.rows_affected > 0)
    }

    /// Bulk sweep: flip every active session whose expiry has passed.
    pub async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = Sessions::update_many()
            .col_expr(sessions::Column::IsActive, Expr::value(false))
            .filter(sessions::Column::IsActive.eq(true))
            .filter(sessions::Column::ExpiresAt.lt(now.to_rfc3339()))
            .exec(&self.conn)
            .await
            .context("Failed to deactivate expired sessions")?;

        Ok(result.rows_affected)
    }

    /// Retention: physically delete sessions that expired before the cutoff.
    pub async fn prune_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = Sessions::delete_many()
            .filter(sessions::Column::ExpiresAt.lt(cutoff.to_rfc3339()))
            .exec(&self.conn)
            .await
            .context("Failed to prune old sessions")?;

        Ok(result.rows_affected)
    }
}
