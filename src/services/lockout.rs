//! Login-attempt lockout policy.
//!
//! Pure decision logic over the attempt history; no I/O. The credential
//! repository applies the outcome inside its bookkeeping transaction.

use chrono::{DateTime, Duration, Utc};

use crate::db::LoginFailureOutcome;

#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub lockout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutDecision {
    Allow,
    Locked { remaining: Duration },
}

impl LockoutPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, lockout_seconds: u64) -> Self {
        Self {
            max_attempts,
            lockout: Duration::seconds(i64::try_from(lockout_seconds).unwrap_or(i64::MAX)),
        }
    }

    /// Is a login attempt admitted right now? An expired lock admits the
    /// attempt; it does not touch the failure counter.
    #[must_use]
    pub fn evaluate(&self, locked_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> LockoutDecision {
        match locked_until {
            Some(until) if now < until => LockoutDecision::Locked {
                remaining: until - now,
            },
            _ => LockoutDecision::Allow,
        }
    }

    /// State after one more failed verification. `locked_until` is `Some`
    /// exactly when this failure reaches the threshold.
    #[must_use]
    pub fn after_failure(&self, failed_attempts: i32, now: DateTime<Utc>) -> LoginFailureOutcome {
        let attempts = failed_attempts.saturating_add(1);

        let locked_until = (attempts.unsigned_abs() >= self.max_attempts)
            .then(|| now + self.lockout);

        LoginFailureOutcome {
            attempts,
            locked_until,
        }
    }
}
