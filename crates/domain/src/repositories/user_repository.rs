use crate::entities::User;
use crate::errors::DomainError;
use async_trait::async_trait;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<(), DomainError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, DomainError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, DomainError>;
    async fn list(&self) -> Result<Vec<User>, DomainError>;
    async fn count(&self) -> Result<i64, DomainError>;
    /// Deletes the user and everything they own: backends, torrents,
    /// statuses, actions, transfer jobs, settings, sessions, tokens, API
    /// keys, webhooks.
    async fn delete_cascade(&self, id: &str) -> Result<(), DomainError>;
}
