pub mod auth_service;
pub use auth_service::{
    AuditAction, AuditEntry, AuthError, AuthService, ClientContext, SweepStats, UserInfo,
};

pub mod auth_service_impl;
pub use auth_service_impl::SeaOrmAuthService;

pub mod lockout;
pub use lockout::{LockoutDecision, LockoutPolicy};

pub mod password;
pub mod validation;
