//! `SeaORM` implementation of the `AuthService` trait.
//!
//! Orchestrates the password hasher, lockout policy, credential store,
//! session store, and audit log. Audit appends are awaited before an
//! operation returns, but an audit failure never masks the primary result:
//! it is logged and swallowed, the one side channel allowed to fail.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use std::collections::HashMap;
use tokio::task;
use tracing::warn;
use uuid::Uuid;

use crate::config::SecurityConfig;
use crate::db::{IdentifierConflict, NewUser, Store};
use crate::entities::users;
use crate::services::auth_service::{
    AuditAction, AuditEntry, AuthError, AuthService, ClientContext, SweepStats, UserInfo,
};
use crate::services::lockout::{LockoutDecision, LockoutPolicy};
use crate::services::{password, validation};

/// Upper bound for one audit page, matching the store-side index scan.
const MAX_AUDIT_LIMIT: u64 = 1000;

pub struct SeaOrmAuthService {
    store: Store,
    security: SecurityConfig,
}

impl SeaOrmAuthService {
    #[must_use]
    pub const fn new(store: Store, security: SecurityConfig) -> Self {
        Self { store, security }
    }

    fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy::new(
            self.security.max_login_attempts,
            self.security.lockout_seconds,
        )
    }

    fn session_ttl(&self) -> Duration {
        Duration::hours(self.security.session_ttl_hours)
    }

    /// Best-effort audit append; awaited for durability, failure logged.
    async fn audit(
        &self,
        user_id: Option<&str>,
        action: AuditAction,
        success: bool,
        details: &str,
        client: ClientContext<'_>,
    ) {
        if let Err(e) = self
            .store
            .append_audit_event(
                user_id,
                action.as_str(),
                success,
                details,
                client.ip_address,
                client.user_agent,
            )
            .await
        {
            warn!("Failed to write {} audit event: {e}", action.as_str());
        }
    }

    /// Run the deliberately slow KDF off the async runtime.
    async fn hash_blocking(&self, password: &str) -> Result<(String, String), AuthError> {
        let password = password.to_string();
        let iterations = self.security.pbkdf2_iterations;

        task::spawn_blocking(move || password::hash_password(&password, None, iterations))
            .await
            .map_err(|e| AuthError::Store(format!("Password hashing task panicked: {e}")))
    }

    async fn verify_blocking(&self, password: &str, user: &users::Model) -> Result<bool, AuthError> {
        let password = password.to_string();
        let hash = user.password_hash.clone();
        let salt = user.salt.clone();
        let iterations = self.security.pbkdf2_iterations;

        task::spawn_blocking(move || password::verify_password(&password, &hash, &salt, iterations))
            .await
            .map_err(|e| AuthError::Store(format!("Password verification task panicked: {e}")))
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, AuthError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AuthError::Store(format!("Malformed stored timestamp '{value}': {e}")))
}

fn remaining_seconds(until: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (until - now).num_seconds().max(0).unsigned_abs()
}

#[async_trait::async_trait]
impl AuthService for SeaOrmAuthService {
    async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        is_admin: bool,
    ) -> Result<String, AuthError> {
        validation::validate_username(username).map_err(AuthError::Validation)?;
        validation::validate_email(email).map_err(AuthError::Validation)?;
        validation::validate_password_strength(password).map_err(AuthError::Validation)?;

        let (password_hash, salt) = self.hash_blocking(password).await?;
        let id = Uuid::new_v4().to_string();

        let conflict = self
            .store
            .create_user(NewUser {
                id: id.clone(),
                username: username.to_string(),
                email: email.to_string(),
                password_hash,
                salt,
                is_admin,
            })
            .await?;

        match conflict {
            Some(IdentifierConflict::Username) => {
                Err(AuthError::Conflict("Username already exists".to_string()))
            }
            Some(IdentifierConflict::Email) => {
                Err(AuthError::Conflict("Email already registered".to_string()))
            }
            None => {
                self.audit(
                    Some(&id),
                    AuditAction::UserCreated,
                    true,
                    &format!("User '{username}' created"),
                    ClientContext::default(),
                )
                .await;

                Ok(id)
            }
        }
    }

    async fn login(
        &self,
        identifier: &str,
        password: &str,
        client: ClientContext<'_>,
    ) -> Result<String, AuthError> {
        let Some(user) = self.store.find_user_by_identifier(identifier).await? else {
            self.audit(
                None,
                AuditAction::LoginFailed,
                false,
                &format!("User '{identifier}' not found"),
                client,
            )
            .await;

            counter!("login_attempts_total", "outcome" => "invalid").increment(1);
            return Err(AuthError::InvalidCredentials);
        };

        if !user.is_active {
            self.audit(
                Some(&user.id),
                AuditAction::LoginFailed,
                false,
                "Account is disabled",
                client,
            )
            .await;

            counter!("login_attempts_total", "outcome" => "disabled").increment(1);
            return Err(AuthError::AccountDisabled);
        }

        let now = Utc::now();
        let locked_until = user
            .locked_until
            .as_deref()
            .map(parse_timestamp)
            .transpose()?;

        if let LockoutDecision::Locked { remaining } =
            self.lockout_policy().evaluate(locked_until, now)
        {
            self.audit(
                Some(&user.id),
                AuditAction::LoginFailed,
                false,
                "Account is locked",
                client,
            )
            .await;

            counter!("login_attempts_total", "outcome" => "locked").increment(1);
            return Err(AuthError::AccountLocked {
                remaining_seconds: remaining.num_seconds().max(0).unsigned_abs(),
            });
        }

        if !self.verify_blocking(password, &user).await? {
            let outcome = self
                .store
                .record_login_failure(&user.id, self.lockout_policy(), now)
                .await?;

            self.audit(
                Some(&user.id),
                AuditAction::LoginFailed,
                false,
                &format!("Invalid password (attempt {})", outcome.attempts),
                client,
            )
            .await;

            counter!("login_attempts_total", "outcome" => "invalid").increment(1);

            return Err(match outcome.locked_until {
                Some(until) => AuthError::AccountLocked {
                    remaining_seconds: remaining_seconds(until, now),
                },
                None => AuthError::InvalidCredentials,
            });
        }

        self.store.record_login_success(&user.id, now).await?;

        let token = password::generate_session_token();
        self.store
            .create_session(&token, &user.id, now, self.session_ttl())
            .await?;

        self.audit(
            Some(&user.id),
            AuditAction::LoginSuccess,
            true,
            "User logged in successfully",
            client,
        )
        .await;

        counter!("login_attempts_total", "outcome" => "success").increment(1);
        Ok(token)
    }

    async fn validate(&self, session_id: &str) -> Result<Option<String>, AuthError> {
        if session_id.is_empty() {
            return Ok(None);
        }

        let Some(session) = self.store.find_active_session(session_id).await? else {
            return Ok(None);
        };

        let Some(user) = self.store.find_user_by_id(&session.user_id).await? else {
            return Ok(None);
        };

        if !user.is_active {
            return Ok(None);
        }

        let now = Utc::now();
        if now > parse_timestamp(&session.expires_at)? {
            // Expiry detected on read; revoke so later lookups short-circuit.
            self.store.deactivate_session(session_id).await?;
            return Ok(None);
        }

        self.store.touch_session(session_id, now).await?;
        Ok(Some(session.user_id))
    }

    async fn logout(&self, session_id: &str) -> Result<bool, AuthError> {
        let Some(session) = self.store.find_session(session_id).await? else {
            return Ok(false);
        };

        if !self.store.deactivate_session(session_id).await? {
            return Ok(false);
        }

        self.audit(
            Some(&session.user_id),
            AuditAction::Logout,
            true,
            "User logged out",
            ClientContext::default(),
        )
        .await;

        Ok(true)
    }

    async fn sweep(&self) -> Result<SweepStats, AuthError> {
        let now = Utc::now();

        let sessions_expired = self.store.deactivate_expired_sessions(now).await?;

        let cutoff = now - Duration::days(self.security.session_retention_days);
        let sessions_pruned = self.store.prune_sessions_expired_before(cutoff).await?;

        let audit_events_pruned = self
            .store
            .prune_audit_to_cap(self.security.audit_max_entries)
            .await?;

        Ok(SweepStats {
            sessions_expired,
            sessions_pruned,
            audit_events_pruned,
        })
    }

    async fn profile(&self, user_id: &str) -> Result<UserInfo, AuthError> {
        let profile = self
            .store
            .user_profile(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        Ok(UserInfo {
            id: profile.id,
            username: profile.username,
            email: profile.email,
            is_admin: profile.is_admin,
            is_active: profile.is_active,
            last_login: profile.last_login,
            created_at: profile.created_at,
        })
    }

    async fn user_count(&self) -> Result<u64, AuthError> {
        Ok(self.store.user_count().await?)
    }

    async fn recent_audit_events(
        &self,
        acting_user_id: &str,
        limit: u64,
    ) -> Result<Vec<AuditEntry>, AuthError> {
        let acting = self
            .store
            .find_user_by_id(acting_user_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        if !acting.is_admin {
            return Err(AuthError::Unauthorized);
        }

        let limit = limit.clamp(1, MAX_AUDIT_LIMIT);
        let events = self.store.recent_audit_events(limit).await?;

        let mut actor_ids: Vec<String> = events
            .iter()
            .filter_map(|e| e.user_id.clone())
            .collect();
        actor_ids.sort_unstable();
        actor_ids.dedup();

        let usernames: HashMap<String, String> = self
            .store
            .find_users_by_ids(&actor_ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u.username))
            .collect();

        Ok(events
            .into_iter()
            .map(|e| {
                let username = e
                    .user_id
                    .as_ref()
                    .and_then(|id| usernames.get(id).cloned());

                AuditEntry {
                    id: e.id,
                    user_id: e.user_id,
                    username,
                    action: e.action,
                    success: e.success,
                    details: e.details,
                    ip_address: e.ip_address,
                    created_at: e.created_at,
                }
            })
            .collect())
    }

    async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        validation::validate_password_strength(new_password).map_err(AuthError::Validation)?;

        if current_password == new_password {
            return Err(AuthError::Validation(
                "New password must be different from current password".to_string(),
            ));
        }

        if !self.verify_blocking(current_password, &user).await? {
            return Err(AuthError::Validation(
                "Current password is incorrect".to_string(),
            ));
        }

        let (hash, salt) = self.hash_blocking(new_password).await?;
        self.store
            .update_user_password(user_id, &hash, &salt)
            .await?;

        self.audit(
            Some(user_id),
            AuditAction::PasswordChanged,
            true,
            "Password changed",
            ClientContext::default(),
        )
        .await;

        Ok(())
    }

    async fn request_password_reset(
        &self,
        identifier: &str,
    ) -> Result<Option<String>, AuthError> {
        let Some(user) = self.store.find_user_by_identifier(identifier).await? else {
            return Ok(None);
        };

        let token = password::generate_reset_token();
        let expires_at = Utc::now() + Duration::minutes(self.security.reset_token_ttl_minutes);

        self.store
            .set_user_reset_token(&user.id, &token, expires_at)
            .await?;

        self.audit(
            Some(&user.id),
            AuditAction::PasswordResetRequested,
            true,
            "Password reset token generated",
            ClientContext::default(),
        )
        .await;

        Ok(Some(token))
    }

    async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        let Some(user) = self.store.find_user_by_reset_token(token).await? else {
            return Err(AuthError::Validation(
                "Invalid or expired reset token".to_string(),
            ));
        };

        let expires = user
            .password_reset_expires
            .as_deref()
            .map(parse_timestamp)
            .transpose()?;

        let now = Utc::now();
        if expires.is_none_or(|t| now > t) {
            return Err(AuthError::Validation(
                "Invalid or expired reset token".to_string(),
            ));
        }

        validation::validate_password_strength(new_password).map_err(AuthError::Validation)?;

        let (hash, salt) = self.hash_blocking(new_password).await?;
        self.store.reset_user_password(&user.id, &hash, &salt).await?;

        self.audit(
            Some(&user.id),
            AuditAction::PasswordReset,
            true,
            "Password reset completed",
            ClientContext::default(),
        )
        .await;

        Ok(())
    }
}
