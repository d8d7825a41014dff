use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::entities::{audit_events, prelude::*};

pub struct AuditRepository {
    conn: DatabaseConnection,
}

impl AuditRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Append one event. Rows are never updated afterwards.
    pub async fn append(
        &self,
        user_id: Option<&str>,
        action: &str,
        success: bool,
        details: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<()> {
        AuditEvents::insert(audit_events::ActiveModel {
            user_id: Set(user_id.map(str::to_string)),
            action: Set(action.to_string()),
            success: Set(success),
            details: Set(details.to_string()),
            ip_address: Set(ip_address.map(str::to_string)),
            user_agent: Set(user_agent.map(str::to_string)),
            created_at: Set(Utc::now().to_rfc3339()),
            ..Default::default()
        })
        .exec(&self.conn)
        .await
        .context("Failed to append audit event")?;

        Ok(())
    }

    /// Newest-first page of events.
    pub async fn recent(&self, limit: u64) -> Result<Vec<audit_events::Model>> {
        let events = AuditEvents::find()
            .order_by_desc(audit_events::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to query audit events")?;

        Ok(events)
    }

    /// Retention: delete the oldest rows beyond `cap`, keeping the newest.
    /// Entries are pruned wholesale, never edited in place.
    pub async fn prune_to_cap(&self, cap: u64) -> Result<u64> {
        let total = AuditEvents::find()
            .count(&self.conn)
            .await
            .context("Failed to count audit events")?;

        if total <= cap {
            return Ok(0);
        }

        if cap == 0 {
            let result = AuditEvents::delete_many().exec(&self.conn).await?;
            return Ok(result.rows_affected);
        }

        // Oldest row that stays; everything with a smaller id goes.
        let oldest_kept = AuditEvents::find()
            .order_by_desc(audit_events::Column::Id)
            .offset(cap - 1)
            .limit(1)
            .all(&self.conn)
            .await
            .context("Failed to locate audit retention threshold")?;

        let Some(oldest_kept) = oldest_kept.first() else {
            return Ok(0);
        };

        let result = AuditEvents::delete_many()
            .filter(audit_events::Column::Id.lt(oldest_kept.id))
            .exec(&self.conn)
            .await
            .context("Failed to prune audit events")?;

        Ok(result.rows_affected)
    }
}
