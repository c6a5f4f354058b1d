use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::{json, Map, Value};
use tracing::{info, instrument};

use super::{
    model::{prepare_write, top_five_cheap, with_virtuals, Tours},
    stats,
};
use crate::{
    auth::{restrict_to, CurrentUser, Role},
    error::AppResult,
    extract::JsonBody,
    factory::{
        create_one, created_envelope, delete_one, doc_envelope, find_many, find_one, list_envelope,
        parse_id, query_spec, update_one,
    },
    query::{QueryParams, QuerySpec},
    state::AppState,
};

const WRITERS: &[Role] = &[Role::Admin, Role::LeadGuide];
const PLANNERS: &[Role] = &[Role::Admin, Role::LeadGuide, Role::Guide];

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/tours", get(list_tours))
        .route("/tours/top-5-cheap", get(list_top_five_cheap))
        .route("/tours/tour-stats", get(get_tour_stats))
        .route("/tours/monthly-plan/:year", get(get_monthly_plan))
        .route("/tours/:id", get(get_tour))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/tours", post(create_tour))
        .route("/tours/:id", patch(update_tour).delete(delete_tour))
}

#[instrument(skip(state, params))]
pub async fn list_tours(
    State(state): State<AppState>,
    params: QueryParams,
) -> AppResult<Json<Value>> {
    let spec = query_spec(QuerySpec::new(), &params)?;
    let tours = find_many::<Tours>(&state.db, &spec)
        .await?
        .into_iter()
        .map(with_virtuals)
        .collect();
    Ok(list_envelope::<Tours>(tours))
}

#[instrument(skip(state, params))]
pub async fn list_top_five_cheap(
    State(state): State<AppState>,
    mut params: QueryParams,
) -> AppResult<Json<Value>> {
    top_five_cheap(&mut params);
    list_tours(State(state), params).await
}

#[instrument(skip(state))]
pub async fn get_tour(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let doc = find_one::<Tours>(&state.db, parse_id(&id)?).await?;
    Ok(doc_envelope::<Tours>(with_virtuals(doc)))
}

#[instrument(skip(state, user, body), fields(account_id = %user.0.id))]
pub async fn create_tour(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(mut body): JsonBody<Map<String, Value>>,
) -> AppResult<Response> {
    restrict_to(&user.0, WRITERS)?;
    prepare_write(&mut body)?;
    let doc = create_one::<Tours>(&state.db, &body).await?;
    info!(tour = ?doc.get("id"), "tour created");
    Ok(created_envelope::<Tours>(with_virtuals(doc)))
}

#[instrument(skip(state, user, body), fields(account_id = %user.0.id))]
pub async fn update_tour(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    JsonBody(mut body): JsonBody<Map<String, Value>>,
) -> AppResult<Json<Value>> {
    restrict_to(&user.0, WRITERS)?;
    prepare_write(&mut body)?;
    let doc = update_one::<Tours>(&state.db, parse_id(&id)?, &body).await?;
    Ok(doc_envelope::<Tours>(with_virtuals(doc)))
}

#[instrument(skip(state, user), fields(account_id = %user.0.id))]
pub async fn delete_tour(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    restrict_to(&user.0, WRITERS)?;
    delete_one::<Tours>(&state.db, parse_id(&id)?).await?;
    info!(%id, "tour deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn get_tour_stats(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let stats = stats::tour_stats(&state.db).await?;
    Ok(Json(json!({ "status": "success", "data": { "stats": stats } })))
}

#[instrument(skip(state, user), fields(account_id = %user.0.id))]
pub async fn get_monthly_plan(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(year): Path<String>,
) -> AppResult<Json<Value>> {
    restrict_to(&user.0, PLANNERS)?;
    let plan = stats::monthly_plan(&state.db, stats::parse_year(&year)?).await?;
    Ok(Json(json!({ "status": "success", "data": { "plan": plan } })))
}
