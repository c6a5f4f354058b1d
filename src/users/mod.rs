//! Administration of accounts. Secret columns are not part of the
//! collection, so they can be neither filtered on nor projected.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::Value;
use tracing::{info, instrument};

use crate::{
    auth::{restrict_to, CurrentUser, Role},
    error::AppResult,
    factory::{delete_one, doc_envelope, find_many, find_one, list_envelope, parse_id, query_spec},
    query::{
        sql::{CREATED_AT_COLUMN, ID_COLUMN, VERSION_COLUMN},
        Collection, Column, ColumnKind, QueryParams, QuerySpec,
    },
    state::AppState,
};

pub struct Users;

impl Collection for Users {
    const TABLE: &'static str = "users";
    const NAME: &'static str = "user";
    const COLUMNS: &'static [Column] = &[
        ID_COLUMN,
        Column::readonly("name", "name", ColumnKind::Text),
        Column::readonly("email", "email", ColumnKind::Text),
        Column::readonly("photo", "photo", ColumnKind::Text),
        Column::readonly("role", "role", ColumnKind::Text),
        CREATED_AT_COLUMN,
        VERSION_COLUMN,
    ];
}

const ADMINS: &[Role] = &[Role::Admin];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id", get(get_user).delete(delete_user))
}

#[instrument(skip(state, user, params), fields(account_id = %user.0.id))]
pub async fn list_users(
    State(state): State<AppState>,
    user: CurrentUser,
    params: QueryParams,
) -> AppResult<Json<Value>> {
    restrict_to(&user.0, ADMINS)?;
    let spec = query_spec(QuerySpec::new(), &params)?;
    let users = find_many::<Users>(&state.db, &spec).await?;
    Ok(list_envelope::<Users>(users))
}

#[instrument(skip(state, user), fields(account_id = %user.0.id))]
pub async fn get_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    restrict_to(&user.0, ADMINS)?;
    let doc = find_one::<Users>(&state.db, parse_id(&id)?).await?;
    Ok(doc_envelope::<Users>(doc))
}

#[instrument(skip(state, user), fields(account_id = %user.0.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    restrict_to(&user.0, ADMINS)?;
    delete_one::<Users>(&state.db, parse_id(&id)?).await?;
    info!(%id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
