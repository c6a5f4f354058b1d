use axum::http::{header, HeaderMap, HeaderValue};

use crate::error::AppResult;

pub const JWT_COOKIE: &str = "jwt";
const LOGGED_OUT: &str = "loggedout";

/// `Set-Cookie` value carrying a session token.
pub fn session_cookie(token: &str, max_age_days: i64) -> AppResult<HeaderValue> {
    let max_age = max_age_days.max(0) * 24 * 60 * 60;
    let value = format!(
        "{JWT_COOKIE}={token}; Max-Age={max_age}; Path=/; HttpOnly; Secure; SameSite=Lax"
    );
    Ok(HeaderValue::from_str(&value).map_err(anyhow::Error::from)?)
}

/// Replaces the session cookie with a short-lived placeholder.
pub fn logout_cookie() -> HeaderValue {
    HeaderValue::from_static("jwt=loggedout; Max-Age=10; Path=/; HttpOnly; Secure; SameSite=Lax")
}

/// Session token from the `Cookie` header, ignoring the logout placeholder.
pub fn token_from_cookies(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == JWT_COOKIE)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty() && *value != LOGGED_OUT)
}
