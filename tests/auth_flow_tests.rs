//! Service-level scenarios against an in-memory store: the login state
//! machine, lockout lifecycle, single-session policy, expiry, and the
//! audit trail.

use vestra::config::SecurityConfig;
use vestra::db::Store;
use vestra::services::{AuthError, AuthService, ClientContext, SeaOrmAuthService};

fn test_security() -> SecurityConfig {
    SecurityConfig {
        pbkdf2_iterations: 1_000,
        ..SecurityConfig::default()
    }
}

/// Single DB connection so the in-memory database is shared.
async fn store() -> Store {
    Store::with_pool_options("sqlite::memory:", 1, 1)
        .await
        .expect("in-memory store")
}

async fn service_with(security: SecurityConfig) -> (SeaOrmAuthService, Store) {
    let store = store().await;
    (SeaOrmAuthService::new(store.clone(), security), store)
}

async fn service() -> (SeaOrmAuthService, Store) {
    service_with(test_security()).await
}

const CLIENT: ClientContext<'static> = ClientContext {
    ip_address: Some("203.0.113.7"),
    user_agent: Some("tests"),
};

#[tokio::test]
async fn test_end_to_end_register_login_validate_lockout() {
    let (auth, _) = service().await;

    let user_id = auth
        .register("alice", "a@x.com", "Str0ng!Pass", false)
        .await
        .expect("registration succeeds");

    let token = auth
        .login("alice", "Str0ng!Pass", CLIENT)
        .await
        .expect("login succeeds");

    let resolved = auth.validate(&token).await.expect("validate succeeds");
    assert_eq!(resolved.as_deref(), Some(user_id.as_str()));

    for attempt in 1..=4 {
        let err = auth.login("alice", "wrong", CLIENT).await.unwrap_err();
        assert!(
            matches!(err, AuthError::InvalidCredentials),
            "attempt {attempt} should be InvalidCredentials"
        );
    }

    // Fifth consecutive failure crosses max_attempts
    let err = auth.login("alice", "wrong", CLIENT).await.unwrap_err();
    assert!(matches!(err, AuthError::AccountLocked { .. }));

    // Even the correct password is rejected while locked
    let err = auth.login("alice", "Str0ng!Pass", CLIENT).await.unwrap_err();
    match err {
        AuthError::AccountLocked { remaining_seconds } => assert!(remaining_seconds > 0),
        other => panic!("expected AccountLocked, got {other:?}"),
    }
}

#[tokio::test]
async fn test_successful_login_after_lock_expiry_resets_counter() {
    // Zero-length lockout: the lock expires the moment it is set, which
    // exercises expiry without sleeping.
    let (auth, store) = service_with(SecurityConfig {
        lockout_seconds: 0,
        ..test_security()
    })
    .await;

    let user_id = auth
        .register("alice", "a@x.com", "Str0ng!Pass", false)
        .await
        .unwrap();

    for _ in 0..5 {
        let _ = auth.login("alice", "wrong", CLIENT).await.unwrap_err();
    }

    let user = store.find_user_by_id(&user_id).await.unwrap().unwrap();
    assert_eq!(user.failed_attempts, 5);
    assert!(user.locked_until.is_some());

    // Lock already expired; correct password is admitted and resets state
    auth.login("alice", "Str0ng!Pass", CLIENT)
        .await
        .expect("login after expired lock succeeds");

    let user = store.find_user_by_id(&user_id).await.unwrap().unwrap();
    assert_eq!(user.failed_attempts, 0);
    assert!(user.locked_until.is_none());
    assert!(user.last_login.is_some());
}

#[tokio::test]
async fn test_expired_lock_without_success_keeps_counter_elevated() {
    let (auth, store) = service_with(SecurityConfig {
        lockout_seconds: 0,
        ..test_security()
    })
    .await;

    let user_id = auth
        .register("alice", "a@x.com", "Str0ng!Pass", false)
        .await
        .unwrap();

    for _ in 0..5 {
        let _ = auth.login("alice", "wrong", CLIENT).await.unwrap_err();
    }

    // The counter is only reset by a successful login, so one more failure
    // after lock expiry re-locks immediately.
    let err = auth.login("alice", "wrong", CLIENT).await.unwrap_err();
    assert!(matches!(err, AuthError::AccountLocked { .. }));

    let user = store.find_user_by_id(&user_id).await.unwrap().unwrap();
    assert_eq!(user.failed_attempts, 6);
}

#[tokio::test]
async fn test_second_login_supersedes_first_session() {
    let (auth, _) = service().await;

    auth.register("alice", "a@x.com", "Str0ng!Pass", false)
        .await
        .unwrap();

    let first = auth.login("alice", "Str0ng!Pass", CLIENT).await.unwrap();
    assert!(auth.validate(&first).await.unwrap().is_some());

    let second = auth.login("alice", "Str0ng!Pass", CLIENT).await.unwrap();
    assert_ne!(first, second);

    assert!(auth.validate(&first).await.unwrap().is_none());
    assert!(auth.validate(&second).await.unwrap().is_some());
}

#[tokio::test]
async fn test_expired_session_is_deactivated_on_validate() {
    // Zero TTL: sessions are born expired
    let (auth, store) = service_with(SecurityConfig {
        session_ttl_hours: 0,
        ..test_security()
    })
    .await;

    auth.register("alice", "a@x.com", "Str0ng!Pass", false)
        .await
        .unwrap();

    let token = auth.login("alice", "Str0ng!Pass", CLIENT).await.unwrap();

    assert!(auth.validate(&token).await.unwrap().is_none());

    // Expiry detection flips is_active as a side effect of the read
    let session = store.find_session(&token).await.unwrap().unwrap();
    assert!(!session.is_active);
}

#[tokio::test]
async fn test_validate_rejects_disabled_principal() {
    let (auth, store) = service().await;

    let user_id = auth
        .register("alice", "a@x.com", "Str0ng!Pass", false)
        .await
        .unwrap();

    let token = auth.login("alice", "Str0ng!Pass", CLIENT).await.unwrap();
    assert!(auth.validate(&token).await.unwrap().is_some());

    assert!(store.set_user_active(&user_id, false).await.unwrap());
    assert!(auth.validate(&token).await.unwrap().is_none());

    let err = auth.login("alice", "Str0ng!Pass", CLIENT).await.unwrap_err();
    assert!(matches!(err, AuthError::AccountDisabled));
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let (auth, _) = service().await;

    auth.register("alice", "a@x.com", "Str0ng!Pass", false)
        .await
        .unwrap();
    let token = auth.login("alice", "Str0ng!Pass", CLIENT).await.unwrap();

    assert!(auth.logout(&token).await.unwrap());
    assert!(!auth.logout(&token).await.unwrap());
    assert!(!auth.logout("unknown-token").await.unwrap());

    assert!(auth.validate(&token).await.unwrap().is_none());
}

#[tokio::test]
async fn test_registration_rejections() {
    let (auth, _) = service().await;

    let err = auth
        .register("ab", "a@x.com", "Str0ng!Pass", false)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));

    let err = auth
        .register("alice", "not-an-email", "Str0ng!Pass", false)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));

    let err = auth
        .register("alice", "a@x.com", "alllowercase1!", false)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));

    let err = auth
        .register("alice", "a@x.com", "Password1!", false)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));

    auth.register("alice", "a@x.com", "Str0ng!Pass", false)
        .await
        .unwrap();

    // Same email, different username
    let err = auth
        .register("bob", "a@x.com", "Str0ng!Pass", false)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Conflict(_)));

    // Same username, different email
    let err = auth
        .register("alice", "b@x.com", "Str0ng!Pass", false)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Conflict(_)));
}

#[tokio::test]
async fn test_login_by_email_works() {
    let (auth, _) = service().await;

    auth.register("alice", "a@x.com", "Str0ng!Pass", false)
        .await
        .unwrap();

    let token = auth.login("a@x.com", "Str0ng!Pass", CLIENT).await.unwrap();
    assert!(auth.validate(&token).await.unwrap().is_some());
}

#[tokio::test]
async fn test_unknown_and_wrong_password_are_indistinguishable() {
    let (auth, _) = service().await;

    auth.register("alice", "a@x.com", "Str0ng!Pass", false)
        .await
        .unwrap();

    let unknown = auth.login("nobody", "whatever", CLIENT).await.unwrap_err();
    let wrong = auth.login("alice", "wrong", CLIENT).await.unwrap_err();

    assert_eq!(unknown.to_string(), wrong.to_string());
}

#[tokio::test]
async fn test_audit_trail_and_admin_gate() {
    let (auth, _) = service().await;

    let admin_id = auth
        .register("admin1", "admin@x.com", "Str0ng!Pass", true)
        .await
        .unwrap();
    let user_id = auth
        .register("bob", "b@x.com", "Str0ng!Pass", false)
        .await
        .unwrap();

    let _ = auth.login("bob", "wrong", CLIENT).await.unwrap_err();
    let token = auth.login("bob", "Str0ng!Pass", CLIENT).await.unwrap();
    auth.logout(&token).await.unwrap();

    let events = auth.recent_audit_events(&admin_id, 50).await.unwrap();

    // Newest first
    assert!(events.windows(2).all(|w| w[0].id > w[1].id));

    let actions: Vec<&str> = events.iter().map(|e| e.action.as_str()).collect();
    assert!(actions.contains(&"USER_CREATED"));
    assert!(actions.contains(&"LOGIN_FAILED"));
    assert!(actions.contains(&"LOGIN_SUCCESS"));
    assert!(actions.contains(&"LOGOUT"));

    // Client context is carried through verbatim
    let failed = events
        .iter()
        .find(|e| e.action == "LOGIN_FAILED")
        .expect("failed login recorded");
    assert_eq!(failed.ip_address.as_deref(), Some("203.0.113.7"));
    assert_eq!(failed.username.as_deref(), Some("bob"));

    let err = auth.recent_audit_events(&user_id, 50).await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized));
}

#[tokio::test]
async fn test_unknown_login_audited_without_user_id() {
    let (auth, _) = service().await;

    let admin_id = auth
        .register("admin1", "admin@x.com", "Str0ng!Pass", true)
        .await
        .unwrap();

    let _ = auth.login("ghost", "whatever", CLIENT).await.unwrap_err();

    let events = auth.recent_audit_events(&admin_id, 10).await.unwrap();
    let unknown = events
        .iter()
        .find(|e| e.action == "LOGIN_FAILED")
        .expect("failed login recorded");
    assert!(unknown.user_id.is_none());
    assert!(unknown.username.is_none());
}

#[tokio::test]
async fn test_sweep_expires_and_prunes() {
    let (auth, store) = service_with(SecurityConfig {
        session_ttl_hours: 0,
        session_retention_days: 0,
        audit_max_entries: 2,
        ..test_security()
    })
    .await;

    auth.register("alice", "a@x.com", "Str0ng!Pass", false)
        .await
        .unwrap();

    // Born-expired sessions plus a pile of audit events
    let t1 = auth.login("alice", "Str0ng!Pass", CLIENT).await.unwrap();
    let _t2 = auth.login("alice", "Str0ng!Pass", CLIENT).await.unwrap();
    for _ in 0..3 {
        let _ = auth.login("alice", "wrong", CLIENT).await.unwrap_err();
    }

    let stats = auth.sweep().await.unwrap();

    assert!(stats.sessions_expired >= 1);
    assert!(stats.sessions_pruned >= 1);
    assert!(stats.audit_events_pruned >= 1);

    assert!(store.find_session(&t1).await.unwrap().is_none());

    // Cap enforced: only the newest two events remain
    let remaining = store.recent_audit_events(10).await.unwrap();
    assert_eq!(remaining.len(), 2);
}

#[tokio::test]
async fn test_change_password_flow() {
    let (auth, _) = service().await;

    let user_id = auth
        .register("alice", "a@x.com", "Str0ng!Pass", false)
        .await
        .unwrap();

    let err = auth
        .change_password(&user_id, "wrong-current", "N3w!Secret")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));

    auth.change_password(&user_id, "Str0ng!Pass", "N3w!Secret")
        .await
        .unwrap();

    let err = auth.login("alice", "Str0ng!Pass", CLIENT).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));

    auth.login("alice", "N3w!Secret", CLIENT).await.unwrap();
}

#[tokio::test]
async fn test_password_reset_flow() {
    let (auth, _) = service().await;

    auth.register("alice", "a@x.com", "Str0ng!Pass", false)
        .await
        .unwrap();

    // Unknown identifiers do not reveal anything
    assert!(auth
        .request_password_reset("nobody@x.com")
        .await
        .unwrap()
        .is_none());

    let token = auth
        .request_password_reset("a@x.com")
        .await
        .unwrap()
        .expect("token for existing account");

    let err = auth
        .reset_password("bogus-token", "N3w!Secret")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));

    auth.reset_password(&token, "N3w!Secret").await.unwrap();

    // Token is single-use
    let err = auth
        .reset_password(&token, "An0ther!Pw")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));

    auth.login("alice", "N3w!Secret", CLIENT).await.unwrap();
}

#[tokio::test]
async fn test_validate_unknown_token_is_none() {
    let (auth, _) = service().await;

    assert!(auth.validate("").await.unwrap().is_none());
    assert!(auth.validate("deadbeef").await.unwrap().is_none());
}
