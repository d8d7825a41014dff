use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, Set, TransactionTrait,
};

use crate::entities::{prelude::*, users};
use crate::services::lockout::LockoutPolicy;

/// Principal data safe to hand out (no credential material).
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub last_login: Option<String>,
    pub created_at: String,
}

impl From<users::Model> for UserProfile {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            is_admin: model.is_admin,
            is_active: model.is_active,
            last_login: model.last_login,
            created_at: model.created_at,
        }
    }
}

/// Input for account creation; credential material is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub salt: String,
    pub is_admin: bool,
}

/// Which unique identifier an attempted registration collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierConflict {
    Username,
    Email,
}

/// Result of recording a failed login inside the bookkeeping transaction.
#[derive(Debug, Clone, Copy)]
pub struct LoginFailureOutcome {
    pub attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Create an account, enforcing username/email uniqueness inside the
    /// insert transaction. Returns the conflicting identifier, if any.
    pub async fn create(&self, user: NewUser) -> Result<Option<IdentifierConflict>> {
        let txn = self.conn.begin().await?;

        let existing = Users::find()
            .filter(
                Condition::any()
                    .add(users::Column::Username.eq(user.username.as_str()))
                    .add(users::Column::Email.eq(user.email.as_str())),
            )
            .one(&txn)
            .await
            .context("Failed to check for existing user")?;

        if let Some(existing) = existing {
            txn.commit().await?;
            if existing.username == user.username {
                return Ok(Some(IdentifierConflict::Username));
            }
            return Ok(Some(IdentifierConflict::Email));
        }

        let now = Utc::now().to_rfc3339();

        Users::insert(users::ActiveModel {
            id: Set(user.id),
            username: Set(user.username),
            email: Set(user.email),
            password_hash: Set(user.password_hash),
            salt: Set(user.salt),
            is_admin: Set(user.is_admin),
            is_active: Set(true),
            failed_attempts: Set(0),
            locked_until: Set(None),
            last_login: Set(None),
            password_reset_token: Set(None),
            password_reset_expires: Set(None),
            created_at: Set(now.clone()),
            updated_at: Set(now),
        })
        .exec(&txn)
        .await
        .context("Failed to insert user")?;

        txn.commit().await?;
        Ok(None)
    }

    /// Look up by username or email, exact match as stored.
    pub async fn find_by_identifier(&self, identifier: &str) -> Result<Option<users::Model>> {
        let user = Users::find()
            .filter(
                Condition::any()
                    .add(users::Column::Username.eq(identifier))
                    .add(users::Column::Email.eq(identifier)),
            )
            .one(&self.conn)
            .await
            .context("Failed to query user by identifier")?;

        Ok(user)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<users::Model>> {
        let user = Users::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user)
    }

    pub async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<users::Model>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = Users::find()
            .filter(users::Column::Id.is_in(ids.iter().map(String::as_str)))
            .all(&self.conn)
            .await
            .context("Failed to query users by IDs")?;

        Ok(rows)
    }

    pub async fn profile(&self, id: &str) -> Result<Option<UserProfile>> {
        Ok(self.find_by_id(id).await?.map(UserProfile::from))
    }

    pub async fn count(&self) -> Result<u64> {
        let total = Users::find()
            .count(&self.conn)
            .await
            .context("Failed to count users")?;

        Ok(total)
    }

    /// Increment the failure counter and set `locked_until` when the policy
    /// threshold is crossed. The read-increment-write runs in one
    /// transaction so concurrent failures cannot under-count.
    pub async fn record_login_failure(
        &self,
        id: &str,
        policy: LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<LoginFailureOutcome> {
        let txn = self.conn.begin().await?;

        let user = Users::find_by_id(id)
            .one(&txn)
            .await
            .context("Failed to re-read user for failure bookkeeping")?
            .ok_or_else(|| anyhow::anyhow!("User disappeared during login: {id}"))?;

        let outcome = policy.after_failure(user.failed_attempts, now);

        let mut active: users::ActiveModel = user.into();
        active.failed_attempts = Set(outcome.attempts);
        active.locked_until = Set(outcome.locked_until.map(|t| t.to_rfc3339()));
        active.updated_at = Set(now.to_rfc3339());
        active.update(&txn).await?;

        txn.commit().await?;
        Ok(outcome)
    }

    /// Successful login is the only path that resets the failure counter
    /// and clears the lock.
    pub async fn record_login_success(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let txn = self.conn.begin().await?;

        let user = Users::find_by_id(id)
            .one(&txn)
            .await
            .context("Failed to re-read user for success bookkeeping")?
            .ok_or_else(|| anyhow::anyhow!("User disappeared during login: {id}"))?;

        let mut active: users::ActiveModel = user.into();
        active.failed_attempts = Set(0);
        active.locked_until = Set(None);
        active.last_login = Set(Some(now.to_rfc3339()));
        active.updated_at = Set(now.to_rfc3339());
        active.update(&txn).await?;

        txn.commit().await?;
        Ok(())
    }

    /// Replace credential material (fresh hash and salt).
    pub async fn update_password(&self, id: &str, hash: &str, salt: &str) -> Result<()> {
        let user = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(hash.to_string());
        active.salt = Set(salt.to_string());
        active.updated_at = Set(Utc::now().to_rfc3339());
        active.update(&self.conn).await?;

        Ok(())
    }

    pub async fn set_reset_token(
        &self,
        id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let user = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        let mut active: users::ActiveModel = user.into();
        active.password_reset_token = Set(Some(token.to_string()));
        active.password_reset_expires = Set(Some(expires_at.to_rfc3339()));
        active.updated_at = Set(Utc::now().to_rfc3339());
        active.update(&self.conn).await?;

        Ok(())
    }

    pub async fn find_by_reset_token(&self, token: &str) -> Result<Option<users::Model>> {
        let user = Users::find()
            .filter(users::Column::PasswordResetToken.eq(token))
            .one(&self.conn)
            .await
            .context("Failed to query user by reset token")?;

        Ok(user)
    }

    /// Complete a password reset: new credential material, token consumed,
    /// lockout state cleared, all in one transaction.
    pub async fn reset_password(&self, id: &str, hash: &str, salt: &str) -> Result<()> {
        let txn = self.conn.begin().await?;

        let user = Users::find_by_id(id)
            .one(&txn)
            .await
            .context("Failed to re-read user for password reset")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(hash.to_string());
        active.salt = Set(salt.to_string());
        active.password_reset_token = Set(None);
        active.password_reset_expires = Set(None);
        active.failed_attempts = Set(0);
        active.locked_until = Set(None);
        active.updated_at = Set(Utc::now().to_rfc3339());
        active.update(&txn).await?;

        txn.commit().await?;
        Ok(())
    }

    /// Administrative enable/disable. Returns false when the user is unknown.
    pub async fn set_active(&self, id: &str, is_active: bool) -> Result<bool> {
        let Some(user) = self.find_by_id(id).await? else {
            return Ok(false);
        };

        let mut active: users::ActiveModel = user.into();
        active.is_active = Set(is_active);
        active.updated_at = Set(Utc::now().to_rfc3339());
        active.update(&self.conn).await?;

        Ok(true)
    }
}
