use axum::{
    extract::{FromRef, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;
use tracing::{info, instrument};

use super::{
    cookie::{logout_cookie, session_cookie},
    dto::{
        ForgotPasswordRequest, LoginRequest, ResetPasswordRequest, SignupRequest,
        UpdatePasswordRequest,
    },
    extractors::CurrentUser,
    services::{AuthService, Session},
};
use crate::{error::AppResult, extract::JsonBody, state::AppState};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/logout", get(logout))
        .route("/users/forgotPassword", post(forgot_password))
        .route("/users/resetPassword/:token", patch(reset_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/users/updateMyPassword", patch(update_my_password))
        .route("/users/me", get(get_me))
}

/// Token in the body and in an HTTP-only cookie, account in `data.user`.
fn session_response(state: &AppState, status: StatusCode, session: Session) -> AppResult<Response> {
    let cookie = session_cookie(&session.token, state.config.jwt.cookie_ttl_days)?;
    let body = json!({
        "status": "success",
        "token": session.token,
        "data": { "user": session.account },
    });
    Ok((status, [(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<SignupRequest>,
) -> AppResult<Response> {
    let session = AuthService::from_ref(&state).signup(payload).await?;
    session_response(&state, StatusCode::CREATED, session)
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> AppResult<Response> {
    let session = AuthService::from_ref(&state).login(payload).await?;
    session_response(&state, StatusCode::OK, session)
}

#[instrument]
pub async fn logout() -> Response {
    info!("session cookie cleared");
    (
        StatusCode::OK,
        [(header::SET_COOKIE, logout_cookie())],
        Json(json!({ "status": "success" })),
    )
        .into_response()
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ForgotPasswordRequest>,
) -> AppResult<Json<serde_json::Value>> {
    AuthService::from_ref(&state)
        .forgot_password(&payload.email)
        .await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Token sent to email!",
    })))
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    JsonBody(payload): JsonBody<ResetPasswordRequest>,
) -> AppResult<Response> {
    let session = AuthService::from_ref(&state)
        .reset_password(&token, payload)
        .await?;
    session_response(&state, StatusCode::OK, session)
}

#[instrument(skip(state, user, payload), fields(account_id = %user.0.id))]
pub async fn update_my_password(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(payload): JsonBody<UpdatePasswordRequest>,
) -> AppResult<Response> {
    let session = AuthService::from_ref(&state)
        .update_password(user.0.id, payload)
        .await?;
    session_response(&state, StatusCode::OK, session)
}

#[instrument(skip(user), fields(account_id = %user.0.id))]
pub async fn get_me(user: CurrentUser) -> Json<serde_json::Value> {
    Json(json!({
        "status": "success",
        "data": { "user": user.0 },
    }))
}
