use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use domain::{
    generate_token, AutoDownload, Backend, BackendKind, ConnectionTest, HttpDownload, SshConfig,
};

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::state::AppState;

const SERVER_ID_LENGTH: usize = 22;

#[derive(Deserialize)]
pub struct CreateServerRequest {
    pub name: String,
    pub server_type: String,
    pub host: String,
    pub port: u16,
    pub rpc_path: Option<String>,
    #[serde(default)]
    pub use_ssl: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub is_default: bool,
    pub http_host: Option<String>,
    pub http_port: Option<u16>,
    pub http_path: Option<String>,
    pub http_username: Option<String>,
    pub http_password: Option<String>,
    #[serde(default)]
    pub http_use_ssl: bool,
    pub mount_path: Option<String>,
    pub download_dir: Option<String>,
    #[serde(default)]
    pub auto_download_enabled: bool,
    pub auto_download_path: Option<String>,
    #[serde(default)]
    pub delete_remote_after: bool,
    pub ssh_host: Option<String>,
    pub ssh_port: Option<u16>,
    pub ssh_user: Option<String>,
    pub ssh_key_path: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Partial update; only provided fields change.
#[derive(Deserialize, Default)]
pub struct UpdateServerRequest {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub rpc_path: Option<String>,
    pub use_ssl: Option<bool>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub enabled: Option<bool>,
    pub is_default: Option<bool>,
    pub http_host: Option<String>,
    pub http_port: Option<u16>,
    pub http_path: Option<String>,
    pub http_username: Option<String>,
    pub http_password: Option<String>,
    pub http_use_ssl: Option<bool>,
    pub mount_path: Option<String>,
    pub download_dir: Option<String>,
    pub auto_download_enabled: Option<bool>,
    pub auto_download_path: Option<String>,
    pub delete_remote_after: Option<bool>,
    pub ssh_host: Option<String>,
    pub ssh_port: Option<u16>,
    pub ssh_user: Option<String>,
    pub ssh_key_path: Option<String>,
}

/// Credentials never leave the server; everything else round-trips.
#[derive(Serialize)]
pub struct ServerResponse {
    pub id: String,
    pub name: String,
    pub server_type: String,
    pub host: String,
    pub port: u16,
    pub rpc_path: Option<String>,
    pub use_ssl: bool,
    pub enabled: bool,
    pub is_default: bool,
    pub created_at: NaiveDateTime,
    pub http_enabled: bool,
    pub mount_path: Option<String>,
    pub download_dir: Option<String>,
    pub auto_download_enabled: bool,
    pub auto_download_path: Option<String>,
    pub delete_remote_after: bool,
    pub ssh_enabled: bool,
}

impl From<Backend> for ServerResponse {
    fn from(backend: Backend) -> Self {
        ServerResponse {
            id: backend.id,
            name: backend.name,
            server_type: backend.kind.as_str().to_string(),
            host: backend.host,
            port: backend.port,
            rpc_path: backend.rpc_path,
            use_ssl: backend.use_ssl,
            enabled: backend.enabled,
            is_default: backend.is_default,
            created_at: backend.created_at,
            http_enabled: backend.http_download.is_some(),
            mount_path: backend.mount_path,
            download_dir: backend.download_dir,
            auto_download_enabled: backend.auto_download.is_some(),
            auto_download_path: backend.auto_download.as_ref().map(|a| a.local_path.clone()),
            delete_remote_after: backend
                .auto_download
                .map(|a| a.delete_remote_after)
                .unwrap_or(false),
            ssh_enabled: backend.ssh.is_some(),
        }
    }
}

pub async fn create_server(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<CreateServerRequest>,
) -> ApiResult<(StatusCode, Json<ServerResponse>)> {
    let backend = Backend {
        id: generate_token(SERVER_ID_LENGTH),
        user_id: current.user.id.clone(),
        name: request.name,
        kind: BackendKind::parse(&request.server_type)?,
        host: request.host,
        port: request.port,
        rpc_path: request.rpc_path,
        use_ssl: request.use_ssl,
        username: request.username,
        password: request.password,
        enabled: request.enabled,
        is_default: request.is_default,
        version: 1,
        last_used_at: None,
        created_at: Utc::now().naive_utc(),
        http_download: request.http_port.map(|port| HttpDownload {
            host: request.http_host,
            port,
            path: request.http_path.unwrap_or_else(|| "/".to_string()),
            username: request.http_username,
            password: request.http_password,
            use_ssl: request.http_use_ssl,
        }),
        mount_path: request.mount_path,
        download_dir: request.download_dir,
        auto_download: if request.auto_download_enabled {
            request.auto_download_path.map(|local_path| AutoDownload {
                local_path,
                delete_remote_after: request.delete_remote_after,
            })
        } else {
            None
        },
        ssh: request.ssh_user.map(|user| SshConfig {
            host: request.ssh_host,
            port: request.ssh_port.unwrap_or(22),
            user,
            key_path: request.ssh_key_path,
        }),
    };
    backend.validate()?;
    state.app.backends.create(&backend).await?;
    Ok((StatusCode::CREATED, Json(backend.into())))
}

pub async fn list_servers(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<ServerResponse>>> {
    let backends = state
        .app
        .backends
        .list_for_user(&current.user.id, false)
        .await?;
    Ok(Json(backends.into_iter().map(Into::into).collect()))
}

pub async fn get_server(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(server_id): Path<String>,
) -> ApiResult<Json<ServerResponse>> {
    let backend = state
        .app
        .dispatch
        .owned_backend(&current.user.id, &server_id)
        .await?;
    Ok(Json(backend.into()))
}

pub async fn update_server(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(server_id): Path<String>,
    Json(request): Json<UpdateServerRequest>,
) -> ApiResult<Json<ServerResponse>> {
    let mut backend = state
        .app
        .dispatch
        .owned_backend(&current.user.id, &server_id)
        .await?;

    if let Some(name) = request.name {
        backend.name = name;
    }
    if let Some(host) = request.host {
        backend.host = host;
    }
    if let Some(port) = request.port {
        backend.port = port;
    }
    if let Some(rpc_path) = request.rpc_path {
        backend.rpc_path = Some(rpc_path);
    }
    if let Some(use_ssl) = request.use_ssl {
        backend.use_ssl = use_ssl;
    }
    if let Some(username) = request.username {
        backend.username = Some(username);
    }
    if let Some(password) = request.password {
        backend.password = Some(password);
    }
    if let Some(enabled) = request.enabled {
        backend.enabled = enabled;
    }
    if let Some(is_default) = request.is_default {
        backend.is_default = is_default;
    }
    if let Some(mount_path) = request.mount_path {
        backend.mount_path = Some(mount_path);
    }
    if let Some(download_dir) = request.download_dir {
        backend.download_dir = Some(download_dir);
    }

    if request.http_port.is_some() || backend.http_download.is_some() {
        let existing = backend.http_download.take();
        let port = request
            .http_port
            .or(existing.as_ref().map(|h| h.port));
        backend.http_download = port.map(|port| HttpDownload {
            host: request
                .http_host
                .or(existing.as_ref().and_then(|h| h.host.clone())),
            port,
            path: request
                .http_path
                .or(existing.as_ref().map(|h| h.path.clone()))
                .unwrap_or_else(|| "/".to_string()),
            username: request
                .http_username
                .or(existing.as_ref().and_then(|h| h.username.clone())),
            password: request
                .http_password
                .or(existing.as_ref().and_then(|h| h.password.clone())),
            use_ssl: request
                .http_use_ssl
                .unwrap_or(existing.map(|h| h.use_ssl).unwrap_or(false)),
        });
    }

    let auto_enabled = request
        .auto_download_enabled
        .unwrap_or(backend.auto_download.is_some());
    let auto_path = request
        .auto_download_path
        .or(backend.auto_download.as_ref().map(|a| a.local_path.clone()));
    let auto_delete = request.delete_remote_after.unwrap_or(
        backend
            .auto_download
            .as_ref()
            .map(|a| a.delete_remote_after)
            .unwrap_or(false),
    );
    backend.auto_download = if auto_enabled {
        auto_path.map(|local_path| AutoDownload {
            local_path,
            delete_remote_after: auto_delete,
        })
    } else {
        None
    };

    if request.ssh_user.is_some() || backend.ssh.is_some() {
        let existing = backend.ssh.take();
        let user = request.ssh_user.or(existing.as_ref().map(|s| s.user.clone()));
        backend.ssh = user.map(|user| SshConfig {
            host: request
                .ssh_host
                .or(existing.as_ref().and_then(|s| s.host.clone())),
            port: request
                .ssh_port
                .unwrap_or(existing.as_ref().map(|s| s.port).unwrap_or(22)),
            user,
            key_path: request
                .ssh_key_path
                .or(existing.and_then(|s| s.key_path)),
        });
    }

    backend.validate()?;
    let updated = state.app.backends.update(&backend).await?;
    Ok(Json(updated.into()))
}

pub async fn delete_server(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(server_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let backend = state
        .app
        .dispatch
        .owned_backend(&current.user.id, &server_id)
        .await?;
    state.app.backends.delete_cascade(&backend.id).await?;
    Ok(Json(json!({
        "status": "deleted",
        "message": format!("Server {} removed", backend.name),
    })))
}

pub async fn test_server(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(server_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let outcome = state
        .app
        .dispatch
        .test_backend(&current.user.id, &server_id)
        .await?;
    Ok(Json(match outcome {
        ConnectionTest::Connected => json!({
            "status": "connected",
            "message": "Connection successful",
        }),
        ConnectionTest::Failed(message) => json!({
            "status": "failed",
            "message": message,
        }),
    }))
}

pub async fn start_stream(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((server_id, file_path)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let info = state
        .app
        .streams
        .start_stream(&current.user.id, &server_id, &file_path)
        .await?;
    Ok(Json(json!({
        "job_id": info.job_id,
        "playlist": info.playlist_url,
        "duration": info.duration_seconds,
        "media_type": info.media_type,
        "status": info.status,
        "server_id": server_id,
    })))
}
