use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration as StdDuration;
use tracing::info;

use crate::entities::{audit_events, sessions, users};
use crate::services::lockout::LockoutPolicy;

pub mod migrator;
pub mod repositories;

pub use repositories::user::{IdentifierConflict, LoginFailureOutcome, NewUser, UserProfile};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(StdDuration::from_secs(10))
            .acquire_timeout(StdDuration::from_secs(10))
            .idle_timeout(StdDuration::from_secs(300))
            .max_lifetime(StdDuration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn session_repo(&self) -> repositories::session::SessionRepository {
        repositories::session::SessionRepository::new(self.conn.clone())
    }

    fn audit_repo(&self) -> repositories::audit::AuditRepository {
        repositories::audit::AuditRepository::new(self.conn.clone())
    }

    // ========== Credential store ==========

    pub async fn create_user(&self, user: NewUser) -> Result<Option<IdentifierConflict>> {
        self.user_repo().create(user).await
    }

    pub async fn find_user_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<users::Model>> {
        self.user_repo().find_by_identifier(identifier).await
    }

    pub async fn find_user_by_id(&self, id: &str) -> Result<Option<users::Model>> {
        self.user_repo().find_by_id(id).await
    }

    pub async fn find_users_by_ids(&self, ids: &[String]) -> Result<Vec<users::Model>> {
        self.user_repo().find_by_ids(ids).await
    }

    pub async fn user_profile(&self, id: &str) -> Result<Option<UserProfile>> {
        self.user_repo().profile(id).await
    }

    pub async fn user_count(&self) -> Result<u64> {
        self.user_repo().count().await
    }

    pub async fn record_login_failure(
        &self,
        id: &str,
        policy: LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<LoginFailureOutcome> {
        self.user_repo().record_login_failure(id, policy, now).await
    }

    pub async fn record_login_success(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        self.user_repo().record_login_success(id, now).await
    }

    pub async fn update_user_password(&self, id: &str, hash: &str, salt: &str) -> Result<()> {
        self.user_repo().update_password(id, hash, salt).await
    }

    pub async fn set_user_reset_token(
        &self,
        id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.user_repo().set_reset_token(id, token, expires_at).await
    }

    pub async fn find_user_by_reset_token(&self, token: &str) -> Result<Option<users::Model>> {
        self.user_repo().find_by_reset_token(token).await
    }

    pub async fn reset_user_password(&self, id: &str, hash: &str, salt: &str) -> Result<()> {
        self.user_repo().reset_password(id, hash, salt).await
    }

    pub async fn set_user_active(&self, id: &str, is_active: bool) -> Result<bool> {
        self.user_repo().set_active(id, is_active).await
    }

    // ========== Session store ==========

    pub async fn create_session(
        &self,
        token: &str,
        user_id: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<()> {
        self.session_repo().create(token, user_id, now, ttl).await
    }

    pub async fn find_session(&self, token: &str) -> Result<Option<sessions::Model>> {
        self.session_repo().find_by_id(token).await
    }

    pub async fn find_active_session(&self, token: &str) -> Result<Option<sessions::Model>> {
        self.session_repo().find_active_by_id(token).await
    }

    pub async fn touch_session(&self, token: &str, now: DateTime<Utc>) -> Result<()> {
        self.session_repo().touch(token, now).await
    }

    pub async fn deactivate_session(&self, token: &str) -> Result<bool> {
        self.session_repo().deactivate(token).await
    }

    pub async fn deactivate_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        self.session_repo().deactivate_expired(now).await
    }

    pub async fn prune_sessions_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.session_repo().prune_expired_before(cutoff).await
    }

    // ========== Audit log ==========

    pub async fn append_audit_event(
        &self,
        user_id: Option<&str>,
        action: &str,
        success: bool,
        details: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<()> {
        self.audit_repo()
            .append(user_id, action, success, details, ip_address, user_agent)
            .await
    }

    pub async fn recent_audit_events(&self, limit: u64) -> Result<Vec<audit_events::Model>> {
        self.audit_repo().recent(limit).await
    }

    pub async fn prune_audit_to_cap(&self, cap: u64) -> Result<u64> {
        self.audit_repo().prune_to_cap(cap).await
    }
}
