use chrono::NaiveDateTime;

use crate::entities::{ApiKey, RememberToken, Session};
use crate::errors::DomainError;
use async_trait::async_trait;

/// Storage for the three credential families: sessions, remember-me tokens,
/// and API keys.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn create_session(&self, session: &Session) -> Result<(), DomainError>;
    async fn get_session(&self, id: &str) -> Result<Option<Session>, DomainError>;
    async fn slide_session(
        &self,
        id: &str,
        last_activity: NaiveDateTime,
        expires_at: NaiveDateTime,
    ) -> Result<(), DomainError>;
    async fn delete_session(&self, id: &str) -> Result<(), DomainError>;

    async fn create_remember_token(&self, token: &RememberToken) -> Result<(), DomainError>;
    async fn get_remember_token(&self, id: &str) -> Result<Option<RememberToken>, DomainError>;
    async fn revoke_remember_token(&self, id: &str) -> Result<(), DomainError>;

    async fn create_api_key(&self, key: &ApiKey) -> Result<(), DomainError>;
    /// Bearer lookup by the complete key value.
    async fn get_api_key(&self, id: &str) -> Result<Option<ApiKey>, DomainError>;
    async fn find_api_key_by_prefix(
        &self,
        user_id: &str,
        prefix: &str,
    ) -> Result<Option<ApiKey>, DomainError>;
    async fn list_api_keys(&self, user_id: &str) -> Result<Vec<ApiKey>, DomainError>;
    async fn revoke_api_key(&self, id: &str) -> Result<(), DomainError>;
    async fn touch_api_key(&self, id: &str, used_at: NaiveDateTime) -> Result<(), DomainError>;

    /// Drop expired sessions and expired or revoked remember tokens.
    async fn delete_expired(&self, now: NaiveDateTime) -> Result<(), DomainError>;
}
