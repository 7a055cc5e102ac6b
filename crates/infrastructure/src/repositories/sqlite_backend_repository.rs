use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;

use domain::{
    AutoDownload, Backend, BackendKind, BackendRepository, DomainError, HttpDownload, SshConfig,
};

use crate::database::schema::{backends, torrents, transfer_jobs};
use crate::database::SqlitePool;
use crate::repositories::{blocking, get_conn};

// Database model - flattened optional groups, separate from the domain
// entity.
#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = backends)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct BackendModel {
    id: String,
    user_id: String,
    name: String,
    kind: String,
    host: String,
    port: i32,
    rpc_path: Option<String>,
    use_ssl: bool,
    username: Option<String>,
    password: Option<String>,
    enabled: bool,
    is_default: bool,
    version: i64,
    last_used_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    http_host: Option<String>,
    http_port: Option<i32>,
    http_path: Option<String>,
    http_username: Option<String>,
    http_password: Option<String>,
    http_use_ssl: bool,
    mount_path: Option<String>,
    download_dir: Option<String>,
    auto_download_enabled: bool,
    auto_download_path: Option<String>,
    delete_remote_after: bool,
    ssh_host: Option<String>,
    ssh_port: Option<i32>,
    ssh_user: Option<String>,
    ssh_key_path: Option<String>,
}

impl TryFrom<BackendModel> for Backend {
    type Error = DomainError;

    fn try_from(model: BackendModel) -> Result<Self, DomainError> {
        let http_download = model.http_port.map(|port| HttpDownload {
            host: model.http_host.clone(),
            port: port as u16,
            path: model.http_path.clone().unwrap_or_else(|| "/".to_string()),
            username: model.http_username.clone(),
            password: model.http_password.clone(),
            use_ssl: model.http_use_ssl,
        });
        let auto_download = if model.auto_download_enabled {
            model.auto_download_path.clone().map(|local_path| AutoDownload {
                local_path,
                delete_remote_after: model.delete_remote_after,
            })
        } else {
            None
        };
        let ssh = model.ssh_user.clone().map(|user| SshConfig {
            host: model.ssh_host.clone(),
            port: model.ssh_port.unwrap_or(22) as u16,
            user,
            key_path: model.ssh_key_path.clone(),
        });
        Ok(Backend {
            id: model.id,
            user_id: model.user_id,
            name: model.name,
            kind: BackendKind::parse(&model.kind)
                .map_err(|_| DomainError::RepositoryError(format!("Bad kind: {}", model.kind)))?,
            host: model.host,
            port: model.port as u16,
            rpc_path: model.rpc_path,
            use_ssl: model.use_ssl,
            username: model.username,
            password: model.password,
            enabled: model.enabled,
            is_default: model.is_default,
            version: model.version,
            last_used_at: model.last_used_at,
            created_at: model.created_at,
            http_download,
            mount_path: model.mount_path,
            download_dir: model.download_dir,
            auto_download,
            ssh,
        })
    }
}

// treat_none_as_null so clearing an optional group persists on update.
#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = backends)]
#[diesel(treat_none_as_null = true)]
struct BackendRecord {
    id: String,
    user_id: String,
    name: String,
    kind: String,
    host: String,
    port: i32,
    rpc_path: Option<String>,
    use_ssl: bool,
    username: Option<String>,
    password: Option<String>,
    enabled: bool,
    is_default: bool,
    version: i64,
    last_used_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    http_host: Option<String>,
    http_port: Option<i32>,
    http_path: Option<String>,
    http_username: Option<String>,
    http_password: Option<String>,
    http_use_ssl: bool,
    mount_path: Option<String>,
    download_dir: Option<String>,
    auto_download_enabled: bool,
    auto_download_path: Option<String>,
    delete_remote_after: bool,
    ssh_host: Option<String>,
    ssh_port: Option<i32>,
    ssh_user: Option<String>,
    ssh_key_path: Option<String>,
}

impl BackendRecord {
    fn from_entity(backend: &Backend, version: i64) -> Self {
        let http = backend.http_download.as_ref();
        let auto = backend.auto_download.as_ref();
        let ssh = backend.ssh.as_ref();
        BackendRecord {
            id: backend.id.clone(),
            user_id: backend.user_id.clone(),
            name: backend.name.clone(),
            kind: backend.kind.as_str().to_string(),
            host: backend.host.clone(),
            port: backend.port as i32,
            rpc_path: backend.rpc_path.clone(),
            use_ssl: backend.use_ssl,
            username: backend.username.clone(),
            password: backend.password.clone(),
            enabled: backend.enabled,
            is_default: backend.is_default,
            version,
            last_used_at: backend.last_used_at,
            created_at: backend.created_at,
            http_host: http.and_then(|h| h.host.clone()),
            http_port: http.map(|h| h.port as i32),
            http_path: http.map(|h| h.path.clone()),
            http_username: http.and_then(|h| h.username.clone()),
            http_password: http.and_then(|h| h.password.clone()),
            http_use_ssl: http.map(|h| h.use_ssl).unwrap_or(false),
            mount_path: backend.mount_path.clone(),
            download_dir: backend.download_dir.clone(),
            auto_download_enabled: auto.is_some(),
            auto_download_path: auto.map(|a| a.local_path.clone()),
            delete_remote_after: auto.map(|a| a.delete_remote_after).unwrap_or(false),
            ssh_host: ssh.and_then(|s| s.host.clone()),
            ssh_port: ssh.map(|s| s.port as i32),
            ssh_user: ssh.map(|s| s.user.clone()),
            ssh_key_path: ssh.and_then(|s| s.key_path.clone()),
        }
    }
}

pub struct SqliteBackendRepository {
    pool: SqlitePool,
}

impl SqliteBackendRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BackendRepository for SqliteBackendRepository {
    async fn create(&self, backend: &Backend) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let backend = backend.clone();
        blocking(move || {
            conn.transaction(|conn| {
                if backend.is_default {
                    diesel::update(
                        backends::table.filter(backends::user_id.eq(&backend.user_id)),
                    )
                    .set(backends::is_default.eq(false))
                    .execute(conn)?;
                }
                diesel::insert_into(backends::table)
                    .values(BackendRecord::from_entity(&backend, 1))
                    .execute(conn)?;
                Ok(())
            })
        })
        .await
    }

    async fn update(&self, backend: &Backend) -> Result<Backend, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let backend = backend.clone();
        let model = blocking(move || {
            conn.transaction(|conn| {
                let current_version: i64 = backends::table
                    .filter(backends::id.eq(&backend.id))
                    .select(backends::version)
                    .first(conn)?;
                if backend.is_default {
                    diesel::update(
                        backends::table.filter(backends::user_id.eq(&backend.user_id)),
                    )
                    .set(backends::is_default.eq(false))
                    .execute(conn)?;
                }
                diesel::update(backends::table.filter(backends::id.eq(&backend.id)))
                    .set(BackendRecord::from_entity(&backend, current_version + 1))
                    .execute(conn)?;
                backends::table
                    .filter(backends::id.eq(&backend.id))
                    .select(BackendModel::as_select())
                    .first::<BackendModel>(conn)
            })
        })
        .await?;
        model.try_into()
    }

    async fn delete_cascade(&self, id: &str) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let id = id.to_string();
        blocking(move || {
            conn.transaction(|conn| {
                diesel::delete(torrents::table.filter(torrents::backend_id.eq(&id)))
                    .execute(conn)?;
                diesel::delete(
                    transfer_jobs::table.filter(transfer_jobs::backend_id.eq(&id)),
                )
                .execute(conn)?;
                diesel::delete(backends::table.filter(backends::id.eq(&id))).execute(conn)?;
                Ok(())
            })
        })
        .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Backend>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let id = id.to_string();
        let model = blocking(move || {
            backends::table
                .filter(backends::id.eq(id))
                .select(BackendModel::as_select())
                .first::<BackendModel>(&mut conn)
                .optional()
        })
        .await?;
        model.map(TryInto::try_into).transpose()
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        only_enabled: bool,
    ) -> Result<Vec<Backend>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let user_id = user_id.to_string();
        let models = blocking(move || {
            let query = backends::table
                .filter(backends::user_id.eq(user_id))
                .order(backends::created_at.asc())
                .select(BackendModel::as_select());
            if only_enabled {
                query
                    .filter(backends::enabled.eq(true))
                    .load::<BackendModel>(&mut conn)
            } else {
                query.load::<BackendModel>(&mut conn)
            }
        })
        .await?;
        models.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_enabled(&self) -> Result<Vec<Backend>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let models = blocking(move || {
            backends::table
                .filter(backends::enabled.eq(true))
                .order(backends::created_at.asc())
                .select(BackendModel::as_select())
                .load::<BackendModel>(&mut conn)
        })
        .await?;
        models.into_iter().map(TryInto::try_into).collect()
    }

    async fn touch_last_used(&self, id: &str) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let id = id.to_string();
        let now = Utc::now().naive_utc();
        blocking(move || {
            diesel::update(backends::table.filter(backends::id.eq(id)))
                .set(backends::last_used_at.eq(now))
                .execute(&mut conn)
                .map(|_| ())
        })
        .await
    }
}
