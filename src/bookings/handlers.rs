use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use serde_json::{Map, Value};
use tracing::{info, instrument};

use super::{Bookings, REFERENCES};
use crate::{
    auth::{restrict_to, CurrentUser, Role},
    error::AppResult,
    extract::JsonBody,
    factory::{
        create_one, created_envelope, delete_one, doc_envelope, find_many, find_one, list_envelope,
        parse_id, populate, query_spec, update_one,
    },
    query::{QueryParams, QuerySpec},
    state::AppState,
};

const STAFF: &[Role] = &[Role::Admin, Role::LeadGuide];

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", get(list_bookings).post(create_booking))
        .route(
            "/bookings/:id",
            get(get_booking).patch(update_booking).delete(delete_booking),
        )
}

#[instrument(skip(state, user, params), fields(account_id = %user.0.id))]
pub async fn list_bookings(
    State(state): State<AppState>,
    user: CurrentUser,
    params: QueryParams,
) -> AppResult<Json<Value>> {
    restrict_to(&user.0, STAFF)?;
    let spec = query_spec(QuerySpec::new(), &params)?;
    let mut bookings = find_many::<Bookings>(&state.db, &spec).await?;
    populate(&state.db, &mut bookings, REFERENCES).await?;
    Ok(list_envelope::<Bookings>(bookings))
}

#[instrument(skip(state, user), fields(account_id = %user.0.id))]
pub async fn get_booking(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    restrict_to(&user.0, STAFF)?;
    let mut docs = vec![find_one::<Bookings>(&state.db, parse_id(&id)?).await?];
    populate(&state.db, &mut docs, REFERENCES).await?;
    Ok(doc_envelope::<Bookings>(docs.pop().unwrap_or(Value::Null)))
}

#[instrument(skip(state, user, body), fields(account_id = %user.0.id))]
pub async fn create_booking(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(body): JsonBody<Map<String, Value>>,
) -> AppResult<Response> {
    restrict_to(&user.0, STAFF)?;
    let doc = create_one::<Bookings>(&state.db, &body).await?;
    info!(booking = ?doc.get("id"), "booking created");
    Ok(created_envelope::<Bookings>(doc))
}

#[instrument(skip(state, user, body), fields(account_id = %user.0.id))]
pub async fn update_booking(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<Map<String, Value>>,
) -> AppResult<Json<Value>> {
    restrict_to(&user.0, STAFF)?;
    let doc = update_one::<Bookings>(&state.db, parse_id(&id)?, &body).await?;
    Ok(doc_envelope::<Bookings>(doc))
}

#[instrument(skip(state, user), fields(account_id = %user.0.id))]
pub async fn delete_booking(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    restrict_to(&user.0, STAFF)?;
    delete_one::<Bookings>(&state.db, parse_id(&id)?).await?;
    info!(%id, "booking deleted");
    Ok(StatusCode::NO_CONTENT)
}
