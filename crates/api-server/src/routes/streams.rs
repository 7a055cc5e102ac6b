use axum::body::Body;
use axum::extract::{Extension, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};

use domain::{DomainError, StreamInfo};

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn stream_info(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<StreamInfo>> {
    let info = state.app.streams.job_info(&current.user.id, &job_id).await?;
    Ok(Json(info))
}

/// Serve the playlist and segment files the transcoder writes.
pub async fn stream_file(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((job_id, file_name)): Path<(String, String)>,
) -> ApiResult<Response> {
    let path = state
        .app
        .streams
        .serve_path(&current.user.id, &job_id, &file_name)
        .await?;
    let data = tokio::fs::read(&path)
        .await
        .map_err(|_| DomainError::NotFound(format!("Segment {file_name}")))?;

    let content_type = if file_name.ends_with(".m3u8") {
        "application/vnd.apple.mpegurl"
    } else if file_name.ends_with(".ts") {
        "video/mp2t"
    } else {
        "application/octet-stream"
    };
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from(data),
    )
        .into_response())
}
