pub mod sqlite_backend_repository;
pub mod sqlite_credential_repository;
pub mod sqlite_setting_repository;
pub mod sqlite_status_repository;
pub mod sqlite_torrent_repository;
pub mod sqlite_transfer_repository;
pub mod sqlite_user_repository;
pub mod sqlite_webhook_repository;

pub use sqlite_backend_repository::*;
pub use sqlite_credential_repository::*;
pub use sqlite_setting_repository::*;
pub use sqlite_status_repository::*;
pub use sqlite_torrent_repository::*;
pub use sqlite_transfer_repository::*;
pub use sqlite_user_repository::*;
pub use sqlite_webhook_repository::*;

use diesel::r2d2::PooledConnection;
use diesel::SqliteConnection;
use domain::DomainError;

use crate::database::SqlitePool;

pub(crate) type PooledSqlite =
    PooledConnection<diesel::r2d2::ConnectionManager<SqliteConnection>>;

pub(crate) fn get_conn(pool: &SqlitePool) -> Result<PooledSqlite, DomainError> {
    pool.get()
        .map_err(|e| DomainError::Unavailable(format!("Store connection unavailable: {e}")))
}

pub(crate) fn db_err(e: diesel::result::Error) -> DomainError {
    use diesel::result::{DatabaseErrorKind, Error};
    match e {
        Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            DomainError::Duplicate(info.message().to_string())
        }
        other => DomainError::RepositoryError(other.to_string()),
    }
}

/// Run a diesel closure on the blocking pool and map both failure layers.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, DomainError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, diesel::result::Error> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DomainError::Internal(format!("Blocking task failed: {e}")))?
        .map_err(db_err)
}

/// Comma-joined label storage shared by torrents and webhooks.
pub(crate) fn join_list(values: &[String]) -> String {
    values.join(",")
}

pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
