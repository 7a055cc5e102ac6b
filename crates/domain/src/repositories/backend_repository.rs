use crate::entities::Backend;
use crate::errors::DomainError;
use async_trait::async_trait;

#[async_trait]
pub trait BackendRepository: Send + Sync {
    /// Persist a new backend. When `is_default` is set, the previous default
    /// for the owner is cleared in the same transaction.
    async fn create(&self, backend: &Backend) -> Result<(), DomainError>;

    /// Replace the stored record and bump its version counter. The returned
    /// record carries the new version.
    async fn update(&self, backend: &Backend) -> Result<Backend, DomainError>;

    /// Remove the backend and cascade-remove torrent rows and transfer jobs
    /// that reference it. Status and action history is retained until
    /// pruning.
    async fn delete_cascade(&self, id: &str) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Backend>, DomainError>;

    async fn list_for_user(
        &self,
        user_id: &str,
        only_enabled: bool,
    ) -> Result<Vec<Backend>, DomainError>;

    /// All enabled backends across every user, for the maintenance loop.
    async fn list_enabled(&self) -> Result<Vec<Backend>, DomainError>;

    /// Record a successful routed operation for most-recently-used ordering.
    async fn touch_last_used(&self, id: &str) -> Result<(), DomainError>;
}
