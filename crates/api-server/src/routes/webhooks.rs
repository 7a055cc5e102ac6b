use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use domain::{generate_token, DomainError, Webhook};

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::state::AppState;

const WEBHOOK_ID_LENGTH: usize = 22;

#[derive(Deserialize)]
pub struct CreateWebhookRequest {
    pub url: String,
    /// Event names to subscribe to; empty or omitted means all.
    #[serde(default)]
    pub events: Vec<String>,
}

pub async fn create_webhook(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<CreateWebhookRequest>,
) -> ApiResult<(StatusCode, Json<Webhook>)> {
    let webhook = Webhook {
        id: generate_token(WEBHOOK_ID_LENGTH),
        user_id: current.user.id.clone(),
        url: request.url,
        events: request.events,
        created_at: Utc::now().naive_utc(),
    };
    webhook.validate()?;
    state.app.webhooks.create(&webhook).await?;
    Ok((StatusCode::CREATED, Json(webhook)))
}

pub async fn list_webhooks(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<Webhook>>> {
    let hooks = state.app.webhooks.list_for_user(&current.user.id).await?;
    Ok(Json(hooks))
}

pub async fn delete_webhook(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(webhook_id): Path<String>,
) -> ApiResult<Json<Value>> {
    match state.app.webhooks.get(&webhook_id).await? {
        Some(webhook) if webhook.user_id == current.user.id => {
            state.app.webhooks.delete(&webhook_id).await?;
            Ok(Json(json!({ "message": "Webhook removed" })))
        }
        _ => Err(DomainError::NotFound(format!("Webhook {webhook_id}")).into()),
    }
}
