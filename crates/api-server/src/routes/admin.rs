use axum::extract::{Extension, Path, State};
use axum::response::Json;
use serde_json::{json, Value};
use tracing::info;

use domain::DomainError;

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::state::AppState;

fn require_admin(current: &CurrentUser) -> Result<(), DomainError> {
    if current.user.is_admin {
        Ok(())
    } else {
        Err(DomainError::Forbidden(
            "Admin privileges required".to_string(),
        ))
    }
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Json<Value>> {
    require_admin(&current)?;
    let users = state.app.auth.list_users().await?;
    Ok(Json(json!(users
        .into_iter()
        .map(|user| json!({
            "user_id": user.id,
            "username": user.username,
            "is_admin": user.is_admin,
            "created_at": user.created_at,
        }))
        .collect::<Vec<_>>())))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Value>> {
    require_admin(&current)?;
    if user_id == current.user.id {
        return Err(DomainError::BadRequest(
            "Admins cannot delete themselves".to_string(),
        )
        .into());
    }
    state
        .app
        .auth
        .get_user(&user_id)
        .await?
        .ok_or_else(|| DomainError::NotFound(format!("User {user_id}")))?;
    state.app.auth.delete_user(&user_id).await?;
    info!(user_id, "Admin deleted user");
    Ok(Json(json!({ "message": "User deleted" })))
}
