//! Translation of a [`QuerySpec`] into PostgreSQL statements.
//!
//! Field names never reach SQL unchecked: every name is looked up in the
//! collection's column whitelist. Values are always bound as text and cast to
//! the column type by the database.

use serde_json::{Map, Value};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::features::{Comparison, Direction, Predicate, Projection, QuerySpec, ID_FIELD, VERSION_FIELD};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Number,
    Boolean,
    Timestamp,
    Uuid,
    TextArray,
    TimestampArray,
}

impl ColumnKind {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Text => "text",
            ColumnKind::Integer => "integer",
            ColumnKind::Number => "double precision",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Timestamp => "timestamptz",
            ColumnKind::Uuid => "uuid",
            ColumnKind::TextArray => "text[]",
            ColumnKind::TimestampArray => "timestamptz[]",
        }
    }

    /// Element type for array columns.
    fn element(self) -> Option<ColumnKind> {
        match self {
            ColumnKind::TextArray => Some(ColumnKind::Text),
            ColumnKind::TimestampArray => Some(ColumnKind::Timestamp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Name used by clients.
    pub field: &'static str,
    /// Name in the table.
    pub name: &'static str,
    pub kind: ColumnKind,
    pub writable: bool,
    pub required: bool,
}

impl Column {
    pub const fn readonly(field: &'static str, name: &'static str, kind: ColumnKind) -> Self {
        Self { field, name, kind, writable: false, required: false }
    }

    pub const fn optional(field: &'static str, name: &'static str, kind: ColumnKind) -> Self {
        Self { field, name, kind, writable: true, required: false }
    }

    pub const fn required(field: &'static str, name: &'static str, kind: ColumnKind) -> Self {
        Self { field, name, kind, writable: true, required: true }
    }
}

pub const ID_COLUMN: Column = Column::readonly(ID_FIELD, "id", ColumnKind::Uuid);
pub const VERSION_COLUMN: Column = Column::readonly(VERSION_FIELD, "version", ColumnKind::Integer);
pub const CREATED_AT_COLUMN: Column = Column::readonly("createdAt", "created_at", ColumnKind::Timestamp);

/// A table exposed through the generic query layer.
pub trait Collection: Send + Sync + 'static {
    const TABLE: &'static str;
    /// Singular name used in response envelopes.
    const NAME: &'static str;
    const COLUMNS: &'static [Column];

    /// Predicates applied to every read, update and delete.
    fn scope() -> Vec<Predicate> {
        Vec::new()
    }

    fn column(field: &str) -> AppResult<&'static Column> {
        Self::COLUMNS
            .iter()
            .find(|c| c.field == field)
            .ok_or_else(|| AppError::validation(format!("Invalid field: {field}")))
    }
}

pub type Statement = QueryBuilder<'static, Postgres>;

/// `SELECT <doc> FROM <table> [WHERE] [ORDER BY] [LIMIT] [OFFSET]`
pub fn select<C: Collection>(spec: &QuerySpec) -> AppResult<Statement> {
    let columns = projected_columns::<C>(&spec.projection)?;

    let mut qb = QueryBuilder::new("SELECT ");
    push_document(&mut qb, &columns);
    qb.push(" AS doc FROM ").push(C::TABLE);
    let mut filter = C::scope();
    filter.extend(spec.filter.iter().cloned());
    push_where::<C>(&mut qb, &filter)?;

    if !spec.sort.is_empty() {
        qb.push(" ORDER BY ");
        let mut has_id = false;
        for (i, key) in spec.sort.iter().enumerate() {
            let column = C::column(&key.field)?;
            has_id |= column.field == ID_FIELD;
            if i > 0 {
                qb.push(", ");
            }
            qb.push(column.name).push(match key.direction {
                Direction::Asc => " ASC",
                Direction::Desc => " DESC",
            });
        }
        // stable pages when the sort keys tie
        if !has_id {
            qb.push(", id ASC");
        }
    }

    if let Some(limit) = spec.limit {
        qb.push(" LIMIT ").push_bind(to_i64(limit));
    }
    if spec.skip > 0 {
        qb.push(" OFFSET ").push_bind(to_i64(spec.skip));
    }
    Ok(qb)
}

/// `SELECT <doc> FROM <table> WHERE id = $1`
pub fn select_by_id<C: Collection>(id: &str) -> AppResult<Statement> {
    let spec = QuerySpec::new().with_predicate(Predicate::eq(ID_FIELD, id));
    select::<C>(&spec)
}

/// `SELECT id, <doc> FROM <table> WHERE id = ANY($1)`, the small documents
/// embedded in place of reference ids. Rows outside the scope stay hidden.
pub fn select_refs<C: Collection>(ids: Vec<Uuid>, fields: &'static [&'static str]) -> AppResult<Statement> {
    let projection = Projection::Fields(fields.iter().map(|f| f.to_string()).collect());
    let columns = projected_columns::<C>(&projection)?;

    let mut qb = QueryBuilder::new("SELECT id, ");
    push_document(&mut qb, &columns);
    qb.push(" AS doc FROM ")
        .push(C::TABLE)
        .push(" WHERE id = ANY(")
        .push_bind(ids)
        .push(")");
    for predicate in C::scope() {
        qb.push(" AND ");
        push_predicate(&mut qb, C::column(&predicate.field)?, &predicate)?;
    }
    Ok(qb)
}

/// `INSERT ... RETURNING <doc>` from a client body; unknown or read-only keys
/// are ignored.
pub fn insert<C: Collection>(body: &Map<String, Value>) -> AppResult<Statement> {
    if let Some(missing) = C::COLUMNS
        .iter()
        .find(|c| c.required && body.get(c.field).map_or(true, Value::is_null))
    {
        return Err(AppError::validation(format!(
            "A {} must have a {}",
            C::NAME,
            missing.field
        )));
    }

    let assignments = writable_assignments::<C>(body);
    let mut qb = QueryBuilder::new("INSERT INTO ");
    qb.push(C::TABLE);
    if assignments.is_empty() {
        qb.push(" DEFAULT VALUES");
    } else {
        qb.push(" (");
        for (i, (column, _)) in assignments.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(column.name);
        }
        qb.push(") VALUES (");
        for (i, (column, value)) in assignments.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            push_value(&mut qb, column, value)?;
        }
        qb.push(")");
    }
    push_returning::<C>(&mut qb)?;
    Ok(qb)
}

/// `UPDATE ... SET ..., version = version + 1 WHERE id = $n RETURNING <doc>`
pub fn update<C: Collection>(id: &str, body: &Map<String, Value>) -> AppResult<Statement> {
    let mut qb = QueryBuilder::new("UPDATE ");
    qb.push(C::TABLE).push(" SET ");
    for (column, value) in writable_assignments::<C>(body) {
        qb.push(column.name).push(" = ");
        push_value(&mut qb, column, value)?;
        qb.push(", ");
    }
    qb.push("version = version + 1");
    push_where::<C>(&mut qb, &scoped_by_id::<C>(id))?;
    push_returning::<C>(&mut qb)?;
    Ok(qb)
}

/// `DELETE FROM <table> WHERE id = $1`
pub fn delete<C: Collection>(id: &str) -> AppResult<Statement> {
    let mut qb = QueryBuilder::new("DELETE FROM ");
    qb.push(C::TABLE);
    push_where::<C>(&mut qb, &scoped_by_id::<C>(id))?;
    Ok(qb)
}

fn scoped_by_id<C: Collection>(id: &str) -> Vec<Predicate> {
    let mut filter = vec![Predicate::eq(ID_FIELD, id)];
    filter.extend(C::scope());
    filter
}

fn projected_columns<C: Collection>(projection: &Projection) -> AppResult<Vec<&'static Column>> {
    match projection {
        Projection::AllButVersion => Ok(C::COLUMNS
            .iter()
            .filter(|c| c.field != VERSION_FIELD)
            .collect()),
        Projection::Fields(fields) => {
            let mut columns = vec![C::column(ID_FIELD)?];
            for field in fields {
                let column = C::column(field)?;
                if !columns.iter().any(|c| c.field == column.field) {
                    columns.push(column);
                }
            }
            Ok(columns)
        }
    }
}

fn push_document(qb: &mut Statement, columns: &[&'static Column]) {
    qb.push("jsonb_build_object(");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push("'").push(column.field).push("', ").push(column.name);
    }
    qb.push(")");
}

fn push_returning<C: Collection>(qb: &mut Statement) -> AppResult<()> {
    let columns = projected_columns::<C>(&Projection::AllButVersion)?;
    qb.push(" RETURNING ");
    push_document(qb, &columns);
    qb.push(" AS doc");
    Ok(())
}

fn push_where<C: Collection>(qb: &mut Statement, filter: &[Predicate]) -> AppResult<()> {
    for (i, predicate) in filter.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        let column = C::column(&predicate.field)?;
        push_predicate(qb, column, predicate)?;
    }
    Ok(())
}

fn push_predicate(qb: &mut Statement, column: &Column, predicate: &Predicate) -> AppResult<()> {
    let invalid = || {
        AppError::validation(format!(
            "Invalid filter value for {}: {}",
            column.field, predicate.value
        ))
    };

    match (&predicate.value, predicate.op, column.kind.element()) {
        (Value::Null, Comparison::Eq, _) => {
            qb.push(column.name).push(" IS NULL");
        }
        (Value::Object(_), _, _) | (Value::Null, _, _) => return Err(invalid()),
        // any element of an array column matching the comparison
        (value, op, Some(element)) => {
            let text = scalar_text(value).ok_or_else(invalid)?;
            qb.push("EXISTS (SELECT 1 FROM unnest(")
                .push(column.name)
                .push(") AS elem WHERE elem ")
                .push(op.sql())
                .push(" CAST(")
                .push_bind(text)
                .push(" AS ")
                .push(element.sql_type())
                .push("))");
        }
        (Value::Array(items), Comparison::Eq, None) => {
            let texts = items
                .iter()
                .map(scalar_text)
                .collect::<Option<Vec<_>>>()
                .ok_or_else(invalid)?;
            qb.push(column.name)
                .push(" = ANY(CAST(")
                .push_bind(texts)
                .push(" AS ")
                .push(column.kind.sql_type())
                .push("[]))");
        }
        (Value::Array(_), _, None) => return Err(invalid()),
        (value, op, None) => {
            let text = scalar_text(value).ok_or_else(invalid)?;
            qb.push(column.name)
                .push(" ")
                .push(op.sql())
                .push(" CAST(")
                .push_bind(text)
                .push(" AS ")
                .push(column.kind.sql_type())
                .push(")");
        }
    }
    Ok(())
}

fn writable_assignments<C: Collection>(body: &Map<String, Value>) -> Vec<(&'static Column, &Value)> {
    C::COLUMNS
        .iter()
        .filter(|c| c.writable)
        .filter_map(|c| body.get(c.field).map(|v| (c, v)))
        .collect()
}

fn push_value(qb: &mut Statement, column: &Column, value: &Value) -> AppResult<()> {
    let invalid = || AppError::validation(format!("Invalid value for {}: {}", column.field, value));
    match (value, column.kind.element()) {
        (Value::Null, _) => {
            qb.push("NULL");
        }
        (Value::Array(items), Some(_)) => {
            let texts = items
                .iter()
                .map(scalar_text)
                .collect::<Option<Vec<_>>>()
                .ok_or_else(invalid)?;
            qb.push("CAST(")
                .push_bind(texts)
                .push(" AS ")
                .push(column.kind.sql_type())
                .push(")");
        }
        (Value::Array(_), None) | (Value::Object(_), _) => return Err(invalid()),
        (_, Some(_)) => return Err(invalid()),
        (scalar, None) => {
            let text = scalar_text(scalar).ok_or_else(invalid)?;
            qb.push("CAST(")
                .push_bind(text)
                .push(" AS ")
                .push(column.kind.sql_type())
                .push(")");
        }
    }
    Ok(())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
