//! Request authentication: bearer API keys first, then the session cookie,
//! then remember-me renewal (which sets a fresh session cookie on the way
//! out).

use std::collections::HashMap;

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE, USER_AGENT};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use domain::{AuthMethod, DomainError, User};

use crate::error::ApiError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "session";
pub const REMEMBER_COOKIE: &str = "remember_me";

pub const SESSION_COOKIE_MAX_AGE: i64 = domain::SESSION_MAX_AGE_DAYS * 24 * 3600;
pub const REMEMBER_COOKIE_MAX_AGE: i64 = domain::REMEMBER_ME_MAX_AGE_DAYS * 24 * 3600;

/// The authenticated principal, inserted into request extensions by
/// `require_auth`.
#[derive(Clone)]
pub struct CurrentUser {
    pub user: User,
    pub auth_method: &'static str,
    pub session_id: Option<String>,
    pub remember_id: Option<String>,
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers().clone();

    if let Some(token) = bearer_token(&headers) {
        let (user, _key) = state.app.auth.authenticate_api_key(&token).await?;
        debug!(username = %user.username, "Authenticated via API key");
        request.extensions_mut().insert(CurrentUser {
            user,
            auth_method: "api_key",
            session_id: None,
            remember_id: None,
        });
        return Ok(next.run(request).await);
    }

    let cookies = parse_cookies(&headers);
    let session_id = cookies.get(SESSION_COOKIE).map(String::as_str);
    let remember_id = cookies.get(REMEMBER_COOKIE).map(String::as_str);
    if session_id.is_none() && remember_id.is_none() {
        return Err(ApiError(DomainError::NotAuthenticated));
    }

    let resolved = state
        .app
        .auth
        .resolve_session(session_id, remember_id, client_ip(&headers), user_agent(&headers))
        .await?;

    let renewed = (resolved.method == AuthMethod::Renewed).then(|| resolved.session.id.clone());
    request.extensions_mut().insert(CurrentUser {
        user: resolved.user,
        auth_method: resolved.method.as_str(),
        session_id: Some(resolved.session.id.clone()),
        remember_id: cookies.get(REMEMBER_COOKIE).cloned(),
    });

    let mut response = next.run(request).await;
    if let Some(session_id) = renewed {
        // A session minted from a remember-me token replaces the cookie.
        let cookie = build_cookie(
            SESSION_COOKIE,
            &session_id,
            SESSION_COOKIE_MAX_AGE,
            state.config.cookie_secure,
        );
        if let Ok(value) = cookie.parse() {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }
    Ok(response)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let mut parts = value.splitn(2, ' ');
    let scheme = parts.next()?;
    let token = parts.next()?.trim();
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.to_string())
}

pub fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for value in headers.get_all(COOKIE) {
        let Ok(value) = value.to_str() else { continue };
        for pair in value.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                cookies.insert(name.trim().to_string(), value.trim().to_string());
            }
        }
    }
    cookies
}

pub fn client_ip(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
}

pub fn user_agent(headers: &HeaderMap) -> Option<&str> {
    headers.get(USER_AGENT).and_then(|v| v.to_str().ok())
}

pub fn build_cookie(name: &str, value: &str, max_age: i64, secure: bool) -> String {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_cookie(name: &str, secure: bool) -> String {
    build_cookie(name, "", 0, secure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn cookie_header_parses_multiple_pairs() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("session=abc; remember_me=def"),
        );
        let cookies = parse_cookies(&headers);
        assert_eq!(cookies.get("session").unwrap(), "abc");
        assert_eq!(cookies.get("remember_me").unwrap(), "def");
    }

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok123"));
        assert_eq!(bearer_token(&headers).unwrap(), "tok123");

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic tok123"));
        assert!(bearer_token(&headers).is_none());
    }

    #[test]
    fn cookies_carry_security_attributes() {
        let cookie = build_cookie("session", "abc", 60, true);
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("Max-Age=60"));

        let insecure = build_cookie("session", "abc", 60, false);
        assert!(!insecure.contains("Secure"));
    }
}
