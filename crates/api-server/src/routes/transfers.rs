use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;

use domain::TransferJob;

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SubmitTransferRequest {
    pub torrent_hash: String,
    pub server_id: String,
    pub dest_path: Option<String>,
}

pub async fn submit_transfer(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<SubmitTransferRequest>,
) -> ApiResult<(StatusCode, Json<TransferJob>)> {
    let job = state
        .app
        .transfers
        .submit(
            &current.user.id,
            &request.torrent_hash,
            &request.server_id,
            request.dest_path.as_deref(),
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

pub async fn list_transfers(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<TransferJob>>> {
    let jobs = state.app.transfers.list(&current.user.id).await?;
    Ok(Json(jobs))
}

pub async fn get_transfer(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<TransferJob>> {
    let job = state.app.transfers.get(&current.user.id, &job_id).await?;
    Ok(Json(job))
}
