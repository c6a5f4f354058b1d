use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use serde_json::{Map, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use super::model::{prepare_create, prepare_update, Reviews, REFERENCES};
use crate::{
    auth::{restrict_to, CurrentUser, Role},
    error::AppResult,
    extract::JsonBody,
    factory::{
        create_one, created_envelope, delete_one, doc_envelope, find_many, find_one, list_envelope,
        parse_id, populate, query_spec, update_one,
    },
    query::{Predicate, QueryParams, QuerySpec},
    state::AppState,
};

const AUTHORS: &[Role] = &[Role::User];
const EDITORS: &[Role] = &[Role::User, Role::Admin];

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/reviews", get(list_reviews).post(create_review))
        .route(
            "/reviews/:id",
            get(get_review).patch(update_review).delete(delete_review),
        )
        .route(
            "/tours/:id/reviews",
            get(list_tour_reviews).post(create_tour_review),
        )
}

async fn list(state: &AppState, base: QuerySpec, params: &QueryParams) -> AppResult<Json<Value>> {
    let spec = query_spec(base, params)?;
    let mut reviews = find_many::<Reviews>(&state.db, &spec).await?;
    populate(&state.db, &mut reviews, REFERENCES).await?;
    Ok(list_envelope::<Reviews>(reviews))
}

async fn create(
    state: &AppState,
    author: Uuid,
    tour: Option<Uuid>,
    mut body: Map<String, Value>,
) -> AppResult<Response> {
    prepare_create(&mut body, author, tour)?;
    let doc = create_one::<Reviews>(&state.db, &body).await?;
    info!(review = ?doc.get("id"), "review created");
    Ok(created_envelope::<Reviews>(doc))
}

#[instrument(skip(state, _user, params))]
pub async fn list_reviews(
    State(state): State<AppState>,
    _user: CurrentUser,
    params: QueryParams,
) -> AppResult<Json<Value>> {
    list(&state, QuerySpec::new(), &params).await
}

#[instrument(skip(state, _user, params))]
pub async fn list_tour_reviews(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(tour_id): Path<String>,
    params: QueryParams,
) -> AppResult<Json<Value>> {
    let tour_id = parse_id(&tour_id)?;
    let base = QuerySpec::new().with_predicate(Predicate::eq("tour", tour_id.to_string()));
    list(&state, base, &params).await
}

#[instrument(skip(state, _user))]
pub async fn get_review(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let mut docs = vec![find_one::<Reviews>(&state.db, parse_id(&id)?).await?];
    populate(&state.db, &mut docs, REFERENCES).await?;
    let doc = docs.pop().unwrap_or(Value::Null);
    Ok(doc_envelope::<Reviews>(doc))
}

#[instrument(skip(state, user, body), fields(account_id = %user.0.id))]
pub async fn create_review(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(body): JsonBody<Map<String, Value>>,
) -> AppResult<Response> {
    restrict_to(&user.0, AUTHORS)?;
    create(&state, user.0.id, None, body).await
}

#[instrument(skip(state, user, body), fields(account_id = %user.0.id))]
pub async fn create_tour_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(tour_id): Path<String>,
    JsonBody(body): JsonBody<Map<String, Value>>,
) -> AppResult<Response> {
    restrict_to(&user.0, AUTHORS)?;
    let tour_id = parse_id(&tour_id)?;
    create(&state, user.0.id, Some(tour_id), body).await
}

#[instrument(skip(state, user, body), fields(account_id = %user.0.id))]
pub async fn update_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    JsonBody(mut body): JsonBody<Map<String, Value>>,
) -> AppResult<Json<Value>> {
    restrict_to(&user.0, EDITORS)?;
    prepare_update(&mut body)?;
    let doc = update_one::<Reviews>(&state.db, parse_id(&id)?, &body).await?;
    Ok(doc_envelope::<Reviews>(doc))
}

#[instrument(skip(state, user), fields(account_id = %user.0.id))]
pub async fn delete_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    restrict_to(&user.0, EDITORS)?;
    delete_one::<Reviews>(&state.db, parse_id(&id)?).await?;
    info!(%id, "review deleted");
    Ok(StatusCode::NO_CONTENT)
}
