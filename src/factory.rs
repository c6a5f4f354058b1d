//! Generic CRUD over any [`Collection`], plus the response envelopes and the
//! reference-population step shared by the resource handlers.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    query::{sql, ApiFeatures, Collection, QueryParams, QuerySpec},
};

const NOT_FOUND: &str = "No document found with that ID";

/// Parses a document id from a path segment.
pub fn parse_id(raw: &str) -> AppResult<Uuid> {
    raw.parse()
        .map_err(|_| AppError::validation(format!("Invalid id: {raw}.")))
}

/// Runs filter, sort, projection and pagination over the request parameters,
/// on top of whatever `base` already constrains.
pub fn query_spec(base: QuerySpec, params: &QueryParams) -> AppResult<QuerySpec> {
    Ok(ApiFeatures::new(base, params)
        .filter()?
        .sort()
        .limit_fields()
        .paginate()
        .into_query())
}

pub async fn find_many<C: Collection>(db: &PgPool, spec: &QuerySpec) -> AppResult<Vec<Value>> {
    let mut qb = sql::select::<C>(spec)?;
    let docs = qb.build_query_scalar::<Value>().fetch_all(db).await?;
    debug!(table = C::TABLE, count = docs.len(), "find_many");
    Ok(docs)
}

pub async fn find_one<C: Collection>(db: &PgPool, id: Uuid) -> AppResult<Value> {
    let mut qb = sql::select_by_id::<C>(&id.to_string())?;
    qb.build_query_scalar::<Value>()
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::not_found(NOT_FOUND))
}

pub async fn create_one<C: Collection>(db: &PgPool, body: &Map<String, Value>) -> AppResult<Value> {
    let mut qb = sql::insert::<C>(body)?;
    let doc = qb.build_query_scalar::<Value>().fetch_one(db).await?;
    debug!(table = C::TABLE, "created");
    Ok(doc)
}

pub async fn update_one<C: Collection>(
    db: &PgPool,
    id: Uuid,
    body: &Map<String, Value>,
) -> AppResult<Value> {
    let mut qb = sql::update::<C>(&id.to_string(), body)?;
    qb.build_query_scalar::<Value>()
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::not_found(NOT_FOUND))
}

pub async fn delete_one<C: Collection>(db: &PgPool, id: Uuid) -> AppResult<()> {
    let mut qb = sql::delete::<C>(&id.to_string())?;
    let result = qb.build().execute(db).await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found(NOT_FOUND));
    }
    debug!(table = C::TABLE, %id, "deleted");
    Ok(())
}

/// A document field holding the id of a row in another collection.
#[derive(Clone, Copy)]
pub struct Reference {
    pub field: &'static str,
    /// Fields copied into the embedded document besides `id`.
    pub select: &'static [&'static str],
    query: fn(Vec<Uuid>, &'static [&'static str]) -> AppResult<sql::Statement>,
}

impl Reference {
    pub const fn to<C: Collection>(field: &'static str, select: &'static [&'static str]) -> Self {
        Self {
            field,
            select,
            query: sql::select_refs::<C>,
        }
    }

    /// Statement fetching the embedded documents for `ids`.
    pub fn lookup(&self, ids: Vec<Uuid>) -> AppResult<sql::Statement> {
        (self.query)(ids, self.select)
    }
}

/// Replace reference ids with small embedded documents. Ids whose row is
/// missing or outside the referenced collection's scope are left as they are.
pub async fn populate(db: &PgPool, docs: &mut [Value], references: &[Reference]) -> AppResult<()> {
    for reference in references {
        let ids: Vec<Uuid> = docs
            .iter()
            .filter_map(|d| d.get(reference.field)?.as_str()?.parse().ok())
            .collect();
        if ids.is_empty() {
            continue;
        }

        let mut qb = reference.lookup(ids)?;
        let rows: Vec<(Uuid, Value)> = qb.build_query_as().fetch_all(db).await?;

        for doc in docs.iter_mut() {
            let Some(id) = doc
                .get(reference.field)
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<Uuid>().ok())
            else {
                continue;
            };
            if let Some((_, embedded)) = rows.iter().find(|(row_id, _)| *row_id == id) {
                doc[reference.field] = embedded.clone();
            }
        }
    }
    Ok(())
}

pub fn list_envelope<C: Collection>(docs: Vec<Value>) -> Json<Value> {
    let mut data = Map::new();
    let results = docs.len();
    data.insert(format!("{}s", C::NAME), Value::Array(docs));
    Json(json!({ "status": "success", "results": results, "data": data }))
}

pub fn doc_envelope<C: Collection>(doc: Value) -> Json<Value> {
    let mut data = Map::new();
    data.insert(C::NAME.to_string(), doc);
    Json(json!({ "status": "success", "data": data }))
}

/// 201 with a `Location` header pointing at the new document.
pub fn created_envelope<C: Collection>(doc: Value) -> Response {
    let location = doc
        .get("id")
        .and_then(Value::as_str)
        .and_then(|id| HeaderValue::from_str(&format!("/api/v1/{}s/{}", C::NAME, id)).ok());
    let body = doc_envelope::<C>(doc);
    match location {
        Some(location) => (StatusCode::CREATED, [(header::LOCATION, location)], body).into_response(),
        None => (StatusCode::CREATED, body).into_response(),
    }
}
