mod features;
mod params;
pub mod sql;

pub use features::{
    ApiFeatures, Comparison, Direction, Predicate, Projection, QuerySpec, SortKey, DEFAULT_LIMIT,
    DEFAULT_PAGE, DEFAULT_SORT, ID_FIELD, RESERVED_KEYS, VERSION_FIELD,
};
pub use params::QueryParams;
pub use sql::{Collection, Column, ColumnKind};
