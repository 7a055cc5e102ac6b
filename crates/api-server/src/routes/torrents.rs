use axum::extract::{Extension, Multipart, Path, Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use domain::{magnet, AddTorrentRequest, DomainError, TorrentSetting, PRIORITY_NORMAL};

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ServerQuery {
    pub server_id: Option<String>,
}

#[derive(Deserialize)]
pub struct AddTorrentBody {
    pub uri: String,
    pub server_id: String,
    #[serde(default = "default_start")]
    pub start: bool,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub labels: Vec<String>,
}

fn default_start() -> bool {
    true
}

fn default_priority() -> i32 {
    PRIORITY_NORMAL
}

pub async fn list_torrents(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<ServerQuery>,
) -> ApiResult<Json<Value>> {
    let list = state
        .app
        .dispatch
        .list_torrents(&current.user.id, query.server_id.as_deref())
        .await?;
    Ok(Json(json!({
        "torrents": list.torrents,
        "errors": list.errors,
    })))
}

pub async fn add_torrent(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(body): Json<AddTorrentBody>,
) -> ApiResult<Json<Value>> {
    let outcome = state
        .app
        .dispatch
        .add(
            &current.user.id,
            AddTorrentRequest {
                uri: body.uri,
                backend_id: body.server_id,
                start: body.start,
                priority: body.priority,
                labels: body.labels,
            },
        )
        .await?;
    Ok(Json(json!({
        "message": outcome.message,
        "info_hash": outcome.info_hash,
    })))
}

#[derive(Deserialize)]
pub struct UploadQuery {
    pub server_id: String,
    #[serde(default = "default_start")]
    pub start: bool,
    #[serde(default = "default_priority")]
    pub priority: i32,
}

pub async fn upload_torrent(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DomainError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| DomainError::BadRequest(format!("Cannot read upload: {e}")))?;
        let outcome = state
            .app
            .dispatch
            .upload(
                &current.user.id,
                &query.server_id,
                &data,
                query.start,
                query.priority,
                Vec::new(),
            )
            .await?;
        return Ok(Json(json!({
            "message": outcome.message,
            "info_hash": outcome.info_hash,
            "name": outcome.name,
        })));
    }
    Err(DomainError::BadRequest("No torrent file provided".to_string()).into())
}

pub async fn get_torrent(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(info_hash): Path<String>,
    Query(query): Query<ServerQuery>,
) -> ApiResult<Json<Value>> {
    let torrent = state
        .app
        .dispatch
        .get_torrent(&current.user.id, &info_hash, query.server_id.as_deref())
        .await?;
    Ok(Json(serde_json::to_value(torrent).unwrap_or(Value::Null)))
}

pub async fn start_torrent(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(info_hash): Path<String>,
    Query(query): Query<ServerQuery>,
) -> ApiResult<Json<Value>> {
    state
        .app
        .dispatch
        .start(&current.user.id, &info_hash, query.server_id.as_deref())
        .await?;
    Ok(Json(json!({ "message": "Torrent started" })))
}

pub async fn stop_torrent(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(info_hash): Path<String>,
    Query(query): Query<ServerQuery>,
) -> ApiResult<Json<Value>> {
    state
        .app
        .dispatch
        .stop(&current.user.id, &info_hash, query.server_id.as_deref())
        .await?;
    Ok(Json(json!({ "message": "Torrent stopped" })))
}

#[derive(Deserialize)]
pub struct DeleteQuery {
    pub server_id: Option<String>,
    #[serde(default)]
    pub delete_data: bool,
}

pub async fn delete_torrent(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(info_hash): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> ApiResult<Json<Value>> {
    state
        .app
        .dispatch
        .erase(
            &current.user.id,
            &info_hash,
            query.server_id.as_deref(),
            query.delete_data,
        )
        .await?;
    Ok(Json(json!({ "message": "Torrent removed" })))
}

pub async fn torrent_files(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(info_hash): Path<String>,
    Query(query): Query<ServerQuery>,
) -> ApiResult<Json<Value>> {
    let (backend, view, files) = state
        .app
        .dispatch
        .files(&current.user.id, &info_hash, query.server_id.as_deref())
        .await?;
    Ok(Json(json!({
        "info_hash": view.info_hash,
        "name": view.name,
        "path": view.base_path,
        "server_id": backend.id,
        "server_name": backend.name,
        "http_enabled": backend.http_download.is_some(),
        "files": files,
    })))
}

#[derive(Deserialize)]
pub struct PriorityBody {
    pub priority: i32,
    pub file_index: Option<i32>,
    pub server_id: Option<String>,
}

pub async fn set_priority(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(info_hash): Path<String>,
    Json(body): Json<PriorityBody>,
) -> ApiResult<Json<Value>> {
    state
        .app
        .dispatch
        .set_priority(
            &current.user.id,
            &info_hash,
            body.server_id.as_deref(),
            body.file_index,
            body.priority,
        )
        .await?;
    Ok(Json(json!({ "message": "Priority updated" })))
}

pub async fn get_labels(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(info_hash): Path<String>,
    Query(query): Query<ServerQuery>,
) -> ApiResult<Json<Value>> {
    let labels = state
        .app
        .dispatch
        .labels(&current.user.id, &info_hash, query.server_id.as_deref())
        .await?;
    Ok(Json(json!({ "labels": labels })))
}

#[derive(Deserialize)]
pub struct LabelsBody {
    pub labels: Vec<String>,
    pub server_id: Option<String>,
}

pub async fn set_labels(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(info_hash): Path<String>,
    Json(body): Json<LabelsBody>,
) -> ApiResult<Json<Value>> {
    state
        .app
        .dispatch
        .set_labels(
            &current.user.id,
            &info_hash,
            body.server_id.as_deref(),
            &body.labels,
        )
        .await?;
    Ok(Json(json!({ "message": "Labels updated" })))
}

pub async fn list_settings(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(info_hash): Path<String>,
) -> ApiResult<Json<Vec<TorrentSetting>>> {
    let hash = magnet::normalize_info_hash(&info_hash)?;
    let settings = state.app.settings.list(&current.user.id, &hash).await?;
    Ok(Json(settings))
}

#[derive(Deserialize)]
pub struct SettingBody {
    pub key: String,
    pub value: String,
}

pub async fn put_setting(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(info_hash): Path<String>,
    Json(body): Json<SettingBody>,
) -> ApiResult<Json<Value>> {
    if body.key.trim().is_empty() {
        return Err(DomainError::BadRequest("Setting key cannot be empty".to_string()).into());
    }
    let hash = magnet::normalize_info_hash(&info_hash)?;
    state
        .app
        .settings
        .set(&TorrentSetting {
            user_id: current.user.id.clone(),
            torrent_hash: hash,
            key: body.key,
            value: body.value,
        })
        .await?;
    Ok(Json(json!({ "message": "Setting saved" })))
}

#[derive(Deserialize)]
pub struct SettingQuery {
    pub key: String,
}

pub async fn delete_setting(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(info_hash): Path<String>,
    Query(query): Query<SettingQuery>,
) -> ApiResult<Json<Value>> {
    let hash = magnet::normalize_info_hash(&info_hash)?;
    state
        .app
        .settings
        .delete(&current.user.id, &hash, &query.key)
        .await?;
    Ok(Json(json!({ "message": "Setting removed" })))
}
