//! Accounts, sessions with sliding expiry, remember-me renewal, and API keys.

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, NaiveDateTime, Utc};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::entities::{ApiKey, RememberToken, Session, User};
use crate::errors::DomainError;
use crate::repositories::{CredentialRepository, UserRepository};

/// Sliding window applied on each authenticated request (ITP-safe, < 7 days).
pub const SESSION_SLIDING_WINDOW_DAYS: i64 = 7;
/// Hard cap: a session never outlives its creation time by more than this.
pub const SESSION_MAX_AGE_DAYS: i64 = 30;
pub const REMEMBER_ME_MAX_AGE_DAYS: i64 = 90;
/// Sessions slide at most once per minute to avoid a write per request.
pub const SLIDE_MIN_INTERVAL_SECONDS: i64 = 60;

pub const MIN_PASSWORD_LENGTH: usize = 8;

pub const TOKEN_LENGTH: usize = 64;
pub const API_KEY_PREFIX_LENGTH: usize = 8;
const USER_ID_LENGTH: usize = 22;

const URL_SAFE_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// PHC hash of an empty password, verified against when the username does
/// not exist so both failure paths cost one Argon2 run.
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$tFNvZXh3RWxwYU5GbXhRZA$vzKd8UvX5koSAMbVyfSSJCqbUvs2zOgd+N/9b44xBqY";

/// Generate a cryptographically random URL-safe token.
pub fn generate_token(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| URL_SAFE_ALPHABET[rng.gen_range(0..URL_SAFE_ALPHABET.len())] as char)
        .collect()
}

pub fn hash_password(password: &str) -> Result<String, DomainError> {
    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| DomainError::Internal(format!("Failed to hash password: {e}")))
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, DomainError> {
    let parsed = PasswordHash::new(password_hash)
        .map_err(|e| DomainError::Internal(format!("Invalid password hash format: {e}")))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(DomainError::Internal(format!(
            "Failed to verify password: {e}"
        ))),
    }
}

/// How a request ended up authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Session,
    /// Session was minted in-flight from a remember-me token; the caller
    /// must set the new session cookie.
    Renewed,
    ApiKey,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Session | AuthMethod::Renewed => "session",
            AuthMethod::ApiKey => "api_key",
        }
    }
}

pub struct ResolvedSession {
    pub user: User,
    pub session: Session,
    pub method: AuthMethod,
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    credentials: Arc<dyn CredentialRepository>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, credentials: Arc<dyn CredentialRepository>) -> Self {
        Self { users, credentials }
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<User, DomainError> {
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(DomainError::WeakPassword(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        if self.users.find_by_username(username).await?.is_some() {
            return Err(DomainError::Duplicate(format!(
                "Username {username} is taken"
            )));
        }

        // First account becomes the bootstrap admin.
        let is_admin = self.users.count().await? == 0;
        let user = User::new(
            generate_token(USER_ID_LENGTH),
            username.to_string(),
            hash_password(password)?,
            is_admin,
            Utc::now().naive_utc(),
        );
        user.validate()?;
        self.users.create(&user).await?;
        info!(username, is_admin, "Registered user");
        Ok(user)
    }

    /// Opaque on failure: a missing user and a wrong password are
    /// indistinguishable, and both cost one hash verification.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User, DomainError> {
        match self.users.find_by_username(username).await? {
            Some(user) => {
                if verify_password(password, &user.password_hash)? {
                    debug!(username, "Authenticated user");
                    Ok(user)
                } else {
                    warn!(username, "Failed login attempt");
                    Err(DomainError::InvalidCredentials)
                }
            }
            None => {
                let _ = verify_password(password, DUMMY_HASH);
                warn!(username, "Login attempt for unknown user");
                Err(DomainError::InvalidCredentials)
            }
        }
    }

    pub async fn create_session(
        &self,
        user: &User,
        ip: Option<&str>,
        user_agent: Option<&str>,
        remember: bool,
    ) -> Result<(Session, Option<RememberToken>), DomainError> {
        let now = Utc::now().naive_utc();
        let session = self.mint_session(&user.id, ip, user_agent, now).await?;

        let remember_token = if remember {
            let token = RememberToken {
                id: generate_token(TOKEN_LENGTH),
                user_id: user.id.clone(),
                created_at: now,
                expires_at: now + Duration::days(REMEMBER_ME_MAX_AGE_DAYS),
                ip: ip.map(str::to_string),
                user_agent: user_agent.map(str::to_string),
                revoked: false,
            };
            self.credentials.create_remember_token(&token).await?;
            Some(token)
        } else {
            None
        };

        Ok((session, remember_token))
    }

    async fn mint_session(
        &self,
        user_id: &str,
        ip: Option<&str>,
        user_agent: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<Session, DomainError> {
        let session = Session {
            id: generate_token(TOKEN_LENGTH),
            user_id: user_id.to_string(),
            created_at: now,
            last_activity: now,
            expires_at: now + Duration::days(SESSION_SLIDING_WINDOW_DAYS),
            ip: ip.map(str::to_string),
            user_agent: user_agent.map(str::to_string),
        };
        self.credentials.create_session(&session).await?;
        debug!(session = &session.id[..8], user_id, "Created session");
        Ok(session)
    }

    /// Resolve a session cookie, sliding its expiry, or renew from a
    /// remember-me token when the session is gone.
    pub async fn resolve_session(
        &self,
        session_id: Option<&str>,
        remember_id: Option<&str>,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<ResolvedSession, DomainError> {
        let now = Utc::now().naive_utc();

        if let Some(id) = session_id {
            if let Some(mut session) = self.credentials.get_session(id).await? {
                if session.is_expired(now) {
                    self.credentials.delete_session(id).await?;
                } else {
                    if (now - session.last_activity).num_seconds() >= SLIDE_MIN_INTERVAL_SECONDS {
                        let expires_at = std::cmp::min(
                            now + Duration::days(SESSION_SLIDING_WINDOW_DAYS),
                            session.created_at + Duration::days(SESSION_MAX_AGE_DAYS),
                        );
                        self.credentials.slide_session(id, now, expires_at).await?;
                        session.last_activity = now;
                        session.expires_at = expires_at;
                    }
                    let user = self.require_user(&session.user_id).await?;
                    return Ok(ResolvedSession {
                        user,
                        session,
                        method: AuthMethod::Session,
                    });
                }
            }
        }

        if let Some(id) = remember_id {
            if let Some(token) = self.credentials.get_remember_token(id).await? {
                if token.is_valid(now) {
                    let user = self.require_user(&token.user_id).await?;
                    let session = self.mint_session(&user.id, ip, user_agent, now).await?;
                    info!(
                        username = %user.username,
                        "Renewed session from remember-me token"
                    );
                    return Ok(ResolvedSession {
                        user,
                        session,
                        method: AuthMethod::Renewed,
                    });
                }
            }
        }

        Err(DomainError::NotAuthenticated)
    }

    pub async fn logout(
        &self,
        session_id: Option<&str>,
        remember_id: Option<&str>,
    ) -> Result<(), DomainError> {
        if let Some(id) = session_id {
            self.credentials.delete_session(id).await?;
        }
        if let Some(id) = remember_id {
            self.credentials.revoke_remember_token(id).await?;
        }
        Ok(())
    }

    /// Mint an API key. The full value is returned exactly once; only the
    /// prefix is recoverable afterwards.
    pub async fn create_api_key(
        &self,
        user: &User,
        name: &str,
        expires_days: Option<i64>,
    ) -> Result<(String, ApiKey), DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "API key name cannot be empty".to_string(),
            ));
        }
        let now = Utc::now().naive_utc();
        let value = generate_token(TOKEN_LENGTH);
        let key = ApiKey {
            id: value.clone(),
            prefix: value[..API_KEY_PREFIX_LENGTH].to_string(),
            user_id: user.id.clone(),
            name: name.to_string(),
            created_at: now,
            last_used_at: None,
            expires_at: expires_days.map(|d| now + Duration::days(d)),
            revoked: false,
        };
        self.credentials.create_api_key(&key).await?;
        info!(name, prefix = %key.prefix, username = %user.username, "Created API key");
        Ok((value, key))
    }

    pub async fn authenticate_api_key(
        &self,
        value: &str,
    ) -> Result<(User, ApiKey), DomainError> {
        let key = self
            .credentials
            .get_api_key(value)
            .await?
            .ok_or(DomainError::NotAuthenticated)?;
        let now = Utc::now().naive_utc();
        if !key.is_valid(now) {
            debug!(prefix = %key.prefix, "Rejected revoked or expired API key");
            return Err(DomainError::NotAuthenticated);
        }
        self.credentials.touch_api_key(&key.id, now).await?;
        let user = self.require_user(&key.user_id).await?;
        Ok((user, key))
    }

    pub async fn list_api_keys(&self, user: &User) -> Result<Vec<ApiKey>, DomainError> {
        self.credentials.list_api_keys(&user.id).await
    }

    pub async fn revoke_api_key(&self, user: &User, prefix: &str) -> Result<(), DomainError> {
        let key = self
            .credentials
            .find_api_key_by_prefix(&user.id, prefix)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("API key {prefix}")))?;
        self.credentials.revoke_api_key(&key.id).await?;
        info!(prefix, "Revoked API key");
        Ok(())
    }

    /// Periodic cleanup of dead credentials, run from the maintenance tick.
    pub async fn cleanup_expired(&self) -> Result<(), DomainError> {
        self.credentials
            .delete_expired(Utc::now().naive_utc())
            .await
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, DomainError> {
        self.users.find_by_id(user_id).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>, DomainError> {
        self.users.list().await
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<(), DomainError> {
        self.users.delete_cascade(user_id).await
    }

    async fn require_user(&self, user_id: &str) -> Result<User, DomainError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(DomainError::NotAuthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_url_safe_and_sized() {
        let token = generate_token(TOKEN_LENGTH);
        assert_eq!(token.len(), TOKEN_LENGTH);
        assert!(token.bytes().all(|b| URL_SAFE_ALPHABET.contains(&b)));
    }

    #[test]
    fn tokens_do_not_collide_trivially() {
        assert_ne!(generate_token(TOKEN_LENGTH), generate_token(TOKEN_LENGTH));
    }

    #[test]
    fn password_round_trip() {
        let hash = hash_password("pw-alice-1234").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("pw-alice-1234", &hash).unwrap());
        assert!(!verify_password("pw-alice-9999", &hash).unwrap());
    }

    #[test]
    fn dummy_hash_is_parsable() {
        // The unknown-user path must not error out on the fixture hash.
        assert!(PasswordHash::new(DUMMY_HASH).is_ok());
    }
}
