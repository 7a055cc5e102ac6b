use axum::extract::{Extension, Path, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::{
    build_cookie, clear_cookie, client_ip, parse_cookies, user_agent, CurrentUser,
    REMEMBER_COOKIE, REMEMBER_COOKIE_MAX_AGE, SESSION_COOKIE, SESSION_COOKIE_MAX_AGE,
};
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let user = state
        .app
        .auth
        .register(&request.username, &request.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "user_id": user.id, "username": user.username })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> ApiResult<(HeaderMap, Json<Value>)> {
    let user = state
        .app
        .auth
        .authenticate(&request.username, &request.password)
        .await?;
    let (session, remember) = state
        .app
        .auth
        .create_session(
            &user,
            client_ip(&headers),
            user_agent(&headers),
            request.remember_me,
        )
        .await?;

    let secure = state.config.cookie_secure;
    let mut response_headers = HeaderMap::new();
    if let Ok(value) =
        build_cookie(SESSION_COOKIE, &session.id, SESSION_COOKIE_MAX_AGE, secure).parse()
    {
        response_headers.append(SET_COOKIE, value);
    }
    if let Some(token) = remember {
        if let Ok(value) =
            build_cookie(REMEMBER_COOKIE, &token.id, REMEMBER_COOKIE_MAX_AGE, secure).parse()
        {
            response_headers.append(SET_COOKIE, value);
        }
    }
    Ok((
        response_headers,
        Json(json!({ "user_id": user.id, "username": user.username })),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<(HeaderMap, Json<Value>)> {
    let cookies = parse_cookies(&headers);
    state
        .app
        .auth
        .logout(
            cookies.get(SESSION_COOKIE).map(String::as_str),
            cookies.get(REMEMBER_COOKIE).map(String::as_str),
        )
        .await?;

    let secure = state.config.cookie_secure;
    let mut response_headers = HeaderMap::new();
    for cookie in [
        clear_cookie(SESSION_COOKIE, secure),
        clear_cookie(REMEMBER_COOKIE, secure),
    ] {
        if let Ok(value) = cookie.parse() {
            response_headers.append(SET_COOKIE, value);
        }
    }
    Ok((response_headers, Json(json!({ "message": "Logged out" }))))
}

pub async fn me(Extension(current): Extension<CurrentUser>) -> Json<Value> {
    Json(json!({
        "user_id": current.user.id,
        "username": current.user.username,
        "is_admin": current.user.is_admin,
        "auth_method": current.auth_method,
    }))
}

#[derive(Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    pub expires_days: Option<i64>,
}

#[derive(Serialize)]
pub struct ApiKeyResponse {
    pub prefix: String,
    pub name: String,
    pub created_at: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<NaiveDateTime>,
    pub revoked: bool,
}

impl From<domain::ApiKey> for ApiKeyResponse {
    fn from(key: domain::ApiKey) -> Self {
        ApiKeyResponse {
            prefix: key.prefix,
            name: key.name,
            created_at: key.created_at,
            last_used_at: key.last_used_at,
            expires_at: key.expires_at,
            revoked: key.revoked,
        }
    }
}

pub async fn create_api_key(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<CreateApiKeyRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let (full_key, key) = state
        .app
        .auth
        .create_api_key(&current.user, &request.name, request.expires_days)
        .await?;
    // The full key appears in this response and never again.
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "api_key": full_key,
            "prefix": key.prefix,
            "name": key.name,
            "created_at": key.created_at,
            "expires_at": key.expires_at,
        })),
    ))
}

pub async fn list_api_keys(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<ApiKeyResponse>>> {
    let keys = state.app.auth.list_api_keys(&current.user).await?;
    Ok(Json(keys.into_iter().map(Into::into).collect()))
}

pub async fn revoke_api_key(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(prefix): Path<String>,
) -> ApiResult<Json<Value>> {
    state.app.auth.revoke_api_key(&current.user, &prefix).await?;
    Ok(Json(json!({ "message": "API key revoked" })))
}
