//! Domain service for credentials, sessions, and the security audit trail.
//!
//! The five core operations (register, login, validate, logout, sweep) plus
//! profile/password management. This trait is the only entry point the API
//! layer and CLI use.

use serde::Serialize;
use thiserror::Error;

/// Errors specific to authentication operations.
///
/// `InvalidCredentials` is deliberately identical for an unknown identifier
/// and a wrong password, so callers cannot enumerate usernames. Lockout, by
/// contrast, does reveal the remaining wait.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Account locked. Try again in {remaining_seconds} seconds")]
    AccountLocked { remaining_seconds: u64 },

    #[error("User not found")]
    UserNotFound,

    #[error("Not authorized")]
    Unauthorized,

    #[error("Storage error: {0}")]
    Store(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Store(err.to_string())
    }
}

/// Audit event kinds. Stored as their stable string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    UserCreated,
    LoginSuccess,
    LoginFailed,
    Logout,
    PasswordChanged,
    PasswordResetRequested,
    PasswordReset,
}

impl AuditAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserCreated => "USER_CREATED",
            Self::LoginSuccess => "LOGIN_SUCCESS",
            Self::LoginFailed => "LOGIN_FAILED",
            Self::Logout => "LOGOUT",
            Self::PasswordChanged => "PASSWORD_CHANGED",
            Self::PasswordResetRequested => "PASSWORD_RESET_REQUESTED",
            Self::PasswordReset => "PASSWORD_RESET",
        }
    }
}

/// Principal info DTO for responses; never carries credential material.
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub last_login: Option<String>,
    pub created_at: String,
}

/// One audit trail entry, newest-first in listings. `username` is resolved
/// for display; `None` means the actor was unknown at event time.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub action: String,
    pub success: bool,
    pub details: String,
    pub ip_address: Option<String>,
    pub created_at: String,
}

/// Counters reported by one sweep pass.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SweepStats {
    pub sessions_expired: u64,
    pub sessions_pruned: u64,
    pub audit_events_pruned: u64,
}

/// Context the caller passes through to audit events; opaque, never parsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientContext<'a> {
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Create an account. Validates username/email/password shape and
    /// strength, rejects duplicates with [`AuthError::Conflict`], and
    /// records a `USER_CREATED` audit event. Returns the new user id.
    async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        is_admin: bool,
    ) -> Result<String, AuthError>;

    /// Authenticate by username or email. Exactly one audit event is
    /// written for every outcome. Success issues a session token and
    /// deactivates any previously active session for the principal.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`], [`AuthError::AccountDisabled`],
    /// or [`AuthError::AccountLocked`] per the login state machine.
    async fn login(
        &self,
        identifier: &str,
        password: &str,
        client: ClientContext<'_>,
    ) -> Result<String, AuthError>;

    /// Resolve a session token to its owning user id. Returns `None` for
    /// unknown, revoked, or expired sessions and for disabled principals;
    /// an expired session is deactivated as a side effect of the read.
    /// Success refreshes `last_activity_at` but never moves `expires_at`.
    async fn validate(&self, session_id: &str) -> Result<Option<String>, AuthError>;

    /// Deactivate a session. Idempotent: the second call returns `false`.
    async fn logout(&self, session_id: &str) -> Result<bool, AuthError>;

    /// Periodic maintenance: deactivate expired sessions, prune old session
    /// rows, and enforce the audit retention cap.
    async fn sweep(&self) -> Result<SweepStats, AuthError>;

    /// Profile for display.
    async fn profile(&self, user_id: &str) -> Result<UserInfo, AuthError>;

    /// Total number of accounts; zero means first-run setup is needed.
    async fn user_count(&self) -> Result<u64, AuthError>;

    /// Recent audit events, newest first. The acting principal must have
    /// `is_admin`; this check lives here, not in the API layer.
    async fn recent_audit_events(
        &self,
        acting_user_id: &str,
        limit: u64,
    ) -> Result<Vec<AuditEntry>, AuthError>;

    /// Change a password after re-verifying the current one.
    async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError>;

    /// Generate a single-use reset token for the account, if it exists.
    /// Returns `None` for unknown identifiers without revealing which.
    /// Delivering the token to the user is the caller's problem.
    async fn request_password_reset(&self, identifier: &str)
        -> Result<Option<String>, AuthError>;

    /// Consume an unexpired reset token and set a new password. Also clears
    /// the lockout counters, since the owner has proven control.
    async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError>;
}
