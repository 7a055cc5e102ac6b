//! Credential store behavior: registration, opaque login failures, sliding
//! sessions, remember-me renewal, and the API key lifecycle.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};

use domain::{
    ApiKey, AuthMethod, AuthService, CredentialRepository, DomainError, Session,
    SESSION_MAX_AGE_DAYS, SESSION_SLIDING_WINDOW_DAYS, TOKEN_LENGTH,
};
use infrastructure::{SqliteCredentialRepository, SqliteUserRepository};

use common::open_store;

fn auth_fixture() -> (AuthService, Arc<SqliteCredentialRepository>, common::TempStore) {
    let store = open_store();
    let users = Arc::new(SqliteUserRepository::new(store.store.pool()));
    let credentials = Arc::new(SqliteCredentialRepository::new(store.store.pool()));
    let auth = AuthService::new(users, credentials.clone());
    (auth, credentials, store)
}

#[tokio::test]
async fn register_then_authenticate_round_trips() {
    let (auth, _, _store) = auth_fixture();
    let user = auth.register("alice", "pw-alice-1234").await.unwrap();
    assert!(user.is_admin, "first user is the bootstrap admin");

    let again = auth.authenticate("alice", "pw-alice-1234").await.unwrap();
    assert_eq!(again.id, user.id);

    let wrong = auth.authenticate("alice", "pw-alice-9999").await;
    assert!(matches!(wrong, Err(DomainError::InvalidCredentials)));
    let unknown = auth.authenticate("nobody", "pw-alice-1234").await;
    assert!(matches!(unknown, Err(DomainError::InvalidCredentials)));
}

#[tokio::test]
async fn duplicate_and_weak_registrations_fail() {
    let (auth, _, _store) = auth_fixture();
    auth.register("alice", "pw-alice-1234").await.unwrap();
    assert!(matches!(
        auth.register("alice", "pw-other-1234").await,
        Err(DomainError::Duplicate(_))
    ));
    assert!(matches!(
        auth.register("bob", "short").await,
        Err(DomainError::WeakPassword(_))
    ));

    let bob = auth.register("bob", "pw-bob-12345").await.unwrap();
    assert!(!bob.is_admin, "only the first user is admin");
}

#[tokio::test]
async fn session_slides_and_respects_max_age() {
    let (auth, credentials, _store) = auth_fixture();
    let user = auth.register("alice", "pw-alice-1234").await.unwrap();
    let now = Utc::now().naive_utc();

    // Backdated session: active two hours ago, created ten days ago.
    let session = Session {
        id: "s".repeat(TOKEN_LENGTH),
        user_id: user.id.clone(),
        created_at: now - Duration::days(10),
        last_activity: now - Duration::hours(2),
        expires_at: now + Duration::days(5),
        ip: None,
        user_agent: None,
    };
    credentials.create_session(&session).await.unwrap();

    let resolved = auth
        .resolve_session(Some(&session.id), None, None, None)
        .await
        .unwrap();
    assert_eq!(resolved.method, AuthMethod::Session);
    assert!(resolved.session.last_activity >= now - Duration::seconds(5));
    let expected = resolved.session.last_activity + Duration::days(SESSION_SLIDING_WINDOW_DAYS);
    assert_eq!(resolved.session.expires_at, expected);

    // Near the hard cap the slide is clamped to created_at + MAX_AGE.
    let capped = Session {
        id: "c".repeat(TOKEN_LENGTH),
        user_id: user.id.clone(),
        created_at: now - Duration::days(SESSION_MAX_AGE_DAYS - 1),
        last_activity: now - Duration::hours(2),
        expires_at: now + Duration::hours(12),
        ip: None,
        user_agent: None,
    };
    credentials.create_session(&capped).await.unwrap();
    let resolved = auth
        .resolve_session(Some(&capped.id), None, None, None)
        .await
        .unwrap();
    assert_eq!(
        resolved.session.expires_at,
        capped.created_at + Duration::days(SESSION_MAX_AGE_DAYS)
    );

    // Past the cap the session is dead no matter the activity.
    let dead = Session {
        id: "d".repeat(TOKEN_LENGTH),
        user_id: user.id.clone(),
        created_at: now - Duration::days(SESSION_MAX_AGE_DAYS + 1),
        last_activity: now - Duration::minutes(1),
        expires_at: now - Duration::minutes(1),
        ip: None,
        user_agent: None,
    };
    credentials.create_session(&dead).await.unwrap();
    assert!(matches!(
        auth.resolve_session(Some(&dead.id), None, None, None).await,
        Err(DomainError::NotAuthenticated)
    ));
}

#[tokio::test]
async fn remember_token_mints_fresh_sessions() {
    let (auth, _, _store) = auth_fixture();
    let user = auth.register("alice", "pw-alice-1234").await.unwrap();
    let (_, token) = auth
        .create_session(&user, None, None, true)
        .await
        .unwrap();
    let token = token.expect("remember token requested");

    // No session cookie at all: the token renews.
    let first = auth
        .resolve_session(None, Some(&token.id), None, None)
        .await
        .unwrap();
    assert_eq!(first.method, AuthMethod::Renewed);

    // The same token used again produces a different session id.
    let second = auth
        .resolve_session(Some("expired-session-id"), Some(&token.id), None, None)
        .await
        .unwrap();
    assert_eq!(second.method, AuthMethod::Renewed);
    assert_ne!(first.session.id, second.session.id);
}

#[tokio::test]
async fn logout_revokes_the_presented_token() {
    let (auth, _, _store) = auth_fixture();
    let user = auth.register("alice", "pw-alice-1234").await.unwrap();
    let (session, token) = auth.create_session(&user, None, None, true).await.unwrap();
    let token = token.unwrap();

    auth.logout(Some(&session.id), Some(&token.id)).await.unwrap();

    assert!(matches!(
        auth.resolve_session(Some(&session.id), Some(&token.id), None, None)
            .await,
        Err(DomainError::NotAuthenticated)
    ));
}

#[tokio::test]
async fn api_key_lifecycle() {
    let (auth, credentials, _store) = auth_fixture();
    let user = auth.register("alice", "pw-alice-1234").await.unwrap();

    let (full_key, key) = auth
        .create_api_key(&user, "k1", Some(7))
        .await
        .unwrap();
    assert_eq!(full_key.len(), TOKEN_LENGTH);
    assert_eq!(key.prefix, &full_key[..8]);
    assert!(key.expires_at.is_some());

    // Listings expose the prefix, never the full value.
    let listed = auth.list_api_keys(&user).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].prefix, key.prefix);

    let (authed, used_key) = auth.authenticate_api_key(&full_key).await.unwrap();
    assert_eq!(authed.id, user.id);
    assert_eq!(used_key.prefix, key.prefix);
    let listed = auth.list_api_keys(&user).await.unwrap();
    assert!(listed[0].last_used_at.is_some(), "usage is recorded");

    auth.revoke_api_key(&user, &key.prefix).await.unwrap();
    assert!(matches!(
        auth.authenticate_api_key(&full_key).await,
        Err(DomainError::NotAuthenticated)
    ));

    // Expiry is enforced at authentication time.
    let now = Utc::now().naive_utc();
    let stale_value = domain::generate_token(TOKEN_LENGTH);
    credentials
        .create_api_key(&ApiKey {
            id: stale_value.clone(),
            prefix: stale_value[..8].to_string(),
            user_id: user.id.clone(),
            name: "stale".to_string(),
            created_at: now - Duration::days(30),
            last_used_at: None,
            expires_at: Some(now - Duration::days(1)),
            revoked: false,
        })
        .await
        .unwrap();
    assert!(matches!(
        auth.authenticate_api_key(&stale_value).await,
        Err(DomainError::NotAuthenticated)
    ));
}
