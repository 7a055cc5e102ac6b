use crate::entities::Webhook;
use crate::errors::DomainError;
use async_trait::async_trait;

#[async_trait]
pub trait WebhookRepository: Send + Sync {
    async fn create(&self, webhook: &Webhook) -> Result<(), DomainError>;
    async fn get(&self, id: &str) -> Result<Option<Webhook>, DomainError>;
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Webhook>, DomainError>;
    async fn delete(&self, id: &str) -> Result<(), DomainError>;
}
