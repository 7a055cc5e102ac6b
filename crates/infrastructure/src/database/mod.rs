pub mod schema;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};

use domain::DomainError;

pub type SqlitePool = r2d2::Pool<ConnectionManager<SqliteConnection>>;

/// The persistence store. Opened explicitly at startup; tests open one per
/// case against a temp file.
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the SQLite database at `path` and ensure
    /// the schema exists.
    pub fn open(path: &str) -> Result<Self, DomainError> {
        let manager = ConnectionManager::<SqliteConnection>::new(path);
        let pool = r2d2::Pool::builder()
            .build(manager)
            .map_err(|e| DomainError::Unavailable(format!("Cannot open store: {e}")))?;

        let mut conn = pool
            .get()
            .map_err(|e| DomainError::Unavailable(format!("Cannot open store: {e}")))?;
        conn.batch_execute(SCHEMA_SQL)
            .map_err(|e| DomainError::RepositoryError(format!("Schema setup failed: {e}")))?;

        Ok(Store { pool })
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }
}

const SCHEMA_SQL: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY NOT NULL,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    is_admin BOOLEAN NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS backends (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    host TEXT NOT NULL,
    port INTEGER NOT NULL,
    rpc_path TEXT,
    use_ssl BOOLEAN NOT NULL DEFAULT 0,
    username TEXT,
    password TEXT,
    enabled BOOLEAN NOT NULL DEFAULT 1,
    is_default BOOLEAN NOT NULL DEFAULT 0,
    version BIGINT NOT NULL DEFAULT 1,
    last_used_at TIMESTAMP,
    created_at TIMESTAMP NOT NULL,
    http_host TEXT,
    http_port INTEGER,
    http_path TEXT,
    http_username TEXT,
    http_password TEXT,
    http_use_ssl BOOLEAN NOT NULL DEFAULT 0,
    mount_path TEXT,
    download_dir TEXT,
    auto_download_enabled BOOLEAN NOT NULL DEFAULT 0,
    auto_download_path TEXT,
    delete_remote_after BOOLEAN NOT NULL DEFAULT 0,
    ssh_host TEXT,
    ssh_port INTEGER,
    ssh_user TEXT,
    ssh_key_path TEXT
);
CREATE INDEX IF NOT EXISTS idx_backends_user ON backends(user_id);

CREATE TABLE IF NOT EXISTS torrents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    info_hash TEXT NOT NULL,
    user_id TEXT NOT NULL,
    backend_id TEXT NOT NULL,
    name TEXT NOT NULL,
    size BIGINT NOT NULL DEFAULT 0,
    is_private BOOLEAN NOT NULL DEFAULT 0,
    base_path TEXT,
    labels TEXT NOT NULL DEFAULT '',
    added_at TIMESTAMP NOT NULL,
    UNIQUE(user_id, info_hash, backend_id)
);
CREATE INDEX IF NOT EXISTS idx_torrents_user ON torrents(user_id);

CREATE TABLE IF NOT EXISTS statuses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    torrent_hash TEXT NOT NULL,
    backend_id TEXT,
    is_seeding BOOLEAN NOT NULL,
    is_private BOOLEAN NOT NULL DEFAULT 0,
    progress DOUBLE NOT NULL DEFAULT 0,
    down_rate BIGINT NOT NULL DEFAULT 0,
    up_rate BIGINT NOT NULL DEFAULT 0,
    peers INTEGER NOT NULL DEFAULT 0,
    seeds INTEGER NOT NULL DEFAULT 0,
    timestamp TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_statuses_hash ON statuses(torrent_hash);
CREATE INDEX IF NOT EXISTS idx_statuses_time ON statuses(timestamp);

CREATE TABLE IF NOT EXISTS actions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    torrent_hash TEXT NOT NULL,
    backend_id TEXT,
    kind TEXT NOT NULL,
    detail TEXT,
    timestamp TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_actions_hash ON actions(torrent_hash);

CREATE TABLE IF NOT EXISTS transfer_jobs (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    torrent_hash TEXT NOT NULL,
    backend_id TEXT NOT NULL,
    source_path TEXT NOT NULL,
    dest_path TEXT NOT NULL,
    state TEXT NOT NULL,
    bytes_done BIGINT NOT NULL DEFAULT 0,
    bytes_total BIGINT NOT NULL DEFAULT 0,
    error TEXT,
    started_at TIMESTAMP NOT NULL,
    finished_at TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_transfers_pair ON transfer_jobs(torrent_hash, backend_id);

CREATE TABLE IF NOT EXISTS torrent_settings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    torrent_hash TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    UNIQUE(user_id, torrent_hash, key)
);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL,
    last_activity TIMESTAMP NOT NULL,
    expires_at TIMESTAMP NOT NULL,
    ip TEXT,
    user_agent TEXT
);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

CREATE TABLE IF NOT EXISTS remember_tokens (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL,
    expires_at TIMESTAMP NOT NULL,
    ip TEXT,
    user_agent TEXT,
    revoked BOOLEAN NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS api_keys (
    id TEXT PRIMARY KEY NOT NULL,
    prefix TEXT NOT NULL,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL,
    last_used_at TIMESTAMP,
    expires_at TIMESTAMP,
    revoked BOOLEAN NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_api_keys_prefix ON api_keys(prefix);

CREATE TABLE IF NOT EXISTS webhooks (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    url TEXT NOT NULL,
    events TEXT NOT NULL DEFAULT '',
    created_at TIMESTAMP NOT NULL
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_schema_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.db");
        let path = path.to_str().unwrap();
        Store::open(path).unwrap();
        // Second open must not fail on existing tables.
        Store::open(path).unwrap();
    }
}
