use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};

use super::{cookie::token_from_cookies, model::Account, services::AuthService};
use crate::error::AppError;

/// The authenticated account behind the request's session token.
pub struct CurrentUser(pub Account);

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AuthService: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // Authorization header wins over the cookie
        let token = bearer_token(parts).or_else(|| token_from_cookies(&parts.headers));
        let auth = AuthService::from_ref(state);
        let account = auth.protect(token).await?;
        Ok(CurrentUser(account))
    }
}
