//! Bookings, managed by staff.

pub mod handlers;

use crate::{
    factory::Reference,
    query::{
        sql::{CREATED_AT_COLUMN, ID_COLUMN, VERSION_COLUMN},
        Collection, Column, ColumnKind,
    },
    state::AppState,
    tours::model::Tours,
    users::Users,
};
use axum::Router;

pub struct Bookings;

impl Collection for Bookings {
    const TABLE: &'static str = "bookings";
    const NAME: &'static str = "booking";
    const COLUMNS: &'static [Column] = &[
        ID_COLUMN,
        Column::required("tour", "tour_id", ColumnKind::Uuid),
        Column::required("user", "user_id", ColumnKind::Uuid),
        Column::required("price", "price", ColumnKind::Number),
        Column::optional("paid", "paid", ColumnKind::Boolean),
        CREATED_AT_COLUMN,
        VERSION_COLUMN,
    ];
}

pub const REFERENCES: &[Reference] = &[
    Reference::to::<Tours>("tour", &["name"]),
    Reference::to::<Users>("user", &["name", "email"]),
];

pub fn router() -> Router<AppState> {
    handlers::routes()
}
