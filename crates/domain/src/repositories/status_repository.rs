use chrono::NaiveDateTime;

use crate::entities::{Action, Status};
use crate::errors::DomainError;
use async_trait::async_trait;

#[async_trait]
pub trait StatusRepository: Send + Sync {
    async fn append(&self, status: &Status) -> Result<(), DomainError>;

    /// All observations for one hash, ordered by timestamp ascending.
    async fn for_torrent(&self, torrent_hash: &str) -> Result<Vec<Status>, DomainError>;

    /// Delete observations older than the cutoff; returns the count removed.
    async fn prune_before(&self, cutoff: NaiveDateTime) -> Result<usize, DomainError>;

    /// Hashes owned by the user that have observations but never a seeding
    /// one.
    async fn never_seeded(&self, user_id: &str) -> Result<Vec<String>, DomainError>;
}

#[async_trait]
pub trait ActionRepository: Send + Sync {
    async fn append(&self, action: &Action) -> Result<(), DomainError>;

    /// Audit rows for one hash, ordered by timestamp ascending.
    async fn for_torrent(&self, torrent_hash: &str) -> Result<Vec<Action>, DomainError>;
}
