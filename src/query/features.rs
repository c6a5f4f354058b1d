use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use super::params::QueryParams;
use crate::error::{AppError, AppResult};

/// Query keys that drive sorting, projection and paging instead of filtering.
pub const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];
pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 100;
pub const DEFAULT_SORT: &str = "-createdAt";
/// Revision marker kept on every row but hidden unless asked for.
pub const VERSION_FIELD: &str = "version";
pub const ID_FIELD: &str = "id";

lazy_static! {
    static ref OPERATOR_RE: Regex = Regex::new(r"\b(gte|gt|lte|lt)\b").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Gte,
    Gt,
    Lte,
    Lt,
}

impl Comparison {
    fn from_operator(key: &str) -> Option<Self> {
        match key {
            "$gte" => Some(Comparison::Gte),
            "$gt" => Some(Comparison::Gt),
            "$lte" => Some(Comparison::Lte),
            "$lt" => Some(Comparison::Lt),
            _ => None,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Gte => ">=",
            Comparison::Gt => ">",
            Comparison::Lte => "<=",
            Comparison::Lt => "<",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub op: Comparison,
    pub value: Value,
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: Comparison::Eq,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    /// Every field except the version marker.
    #[default]
    AllButVersion,
    /// Exactly these fields plus the identifier.
    Fields(Vec<String>),
}

/// A fetch plan: what to match, how to order, what to return and which page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySpec {
    pub filter: Vec<Predicate>,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.filter.push(predicate);
        self
    }
}

/// Refines a base [`QuerySpec`] from request query parameters.
///
/// The steps are independent of each other and conventionally chained as
/// `filter()?.sort().limit_fields().paginate()`.
#[derive(Debug, Clone)]
pub struct ApiFeatures<'a> {
    query: QuerySpec,
    params: &'a QueryParams,
}

impl<'a> ApiFeatures<'a> {
    pub fn new(query: QuerySpec, params: &'a QueryParams) -> Self {
        Self { query, params }
    }

    pub fn filter(mut self) -> AppResult<Self> {
        let mut remaining = self.params.as_map().clone();
        for key in RESERVED_KEYS {
            remaining.remove(key);
        }

        let raw = serde_json::to_string(&remaining).map_err(anyhow::Error::from)?;
        let substituted = OPERATOR_RE.replace_all(&raw, "$$$1");
        let parsed: Map<String, Value> = serde_json::from_str(&substituted)
            .map_err(|e| AppError::validation(format!("Invalid filter: {e}")))?;

        for (field, value) in parsed {
            push_predicates(&mut self.query.filter, field, value);
        }
        Ok(self)
    }

    pub fn sort(mut self) -> Self {
        let requested = self.params.get_str("sort").map(|s| parse_sort(&s));
        self.query.sort = match requested {
            Some(keys) if !keys.is_empty() => keys,
            _ => parse_sort(DEFAULT_SORT),
        };
        self
    }

    pub fn limit_fields(mut self) -> Self {
        let fields: Vec<String> = self
            .params
            .get_str("fields")
            .map(|s| split_list(&s).map(str::to_string).collect())
            .unwrap_or_default();
        self.query.projection = if fields.is_empty() {
            Projection::AllButVersion
        } else {
            Projection::Fields(fields)
        };
        self
    }

    pub fn paginate(mut self) -> Self {
        let page = positive_int(self.params.get_str("page")).unwrap_or(DEFAULT_PAGE);
        let limit = positive_int(self.params.get_str("limit")).unwrap_or(DEFAULT_LIMIT);
        // a page past the end is not an error, it just matches nothing
        self.query.skip = (page - 1).saturating_mul(limit);
        self.query.limit = Some(limit);
        self
    }

    pub fn query(&self) -> &QuerySpec {
        &self.query
    }

    pub fn into_query(self) -> QuerySpec {
        self.query
    }
}

fn push_predicates(filter: &mut Vec<Predicate>, field: String, value: Value) {
    if let Value::Object(map) = &value {
        let comparisons: Option<Vec<(Comparison, &Value)>> = map
            .iter()
            .map(|(k, v)| Comparison::from_operator(k).map(|op| (op, v)))
            .collect();
        if let Some(comparisons) = comparisons.filter(|c| !c.is_empty()) {
            for (op, v) in comparisons {
                filter.push(Predicate {
                    field: field.clone(),
                    op,
                    value: v.clone(),
                });
            }
            return;
        }
    }
    filter.push(Predicate {
        field,
        op: Comparison::Eq,
        value,
    });
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_sort(raw: &str) -> Vec<SortKey> {
    split_list(raw)
        .filter_map(|item| match item.strip_prefix('-') {
            Some("") => None,
            Some(field) => Some(SortKey {
                field: field.to_string(),
                direction: Direction::Desc,
            }),
            None => Some(SortKey {
                field: item.to_string(),
                direction: Direction::Asc,
            }),
        })
        .collect()
}

fn positive_int(raw: Option<String>) -> Option<u64> {
    raw?.trim().parse::<u64>().ok().filter(|n| *n > 0)
}
