use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    factory::Reference,
    query::{
        sql::{CREATED_AT_COLUMN, ID_COLUMN, VERSION_COLUMN},
        Collection, Column, ColumnKind,
    },
    tours::model::Tours,
    users::Users,
};

pub struct Reviews;

impl Collection for Reviews {
    const TABLE: &'static str = "reviews";
    const NAME: &'static str = "review";
    const COLUMNS: &'static [Column] = &[
        ID_COLUMN,
        Column::required("review", "review", ColumnKind::Text),
        Column::required("rating", "rating", ColumnKind::Integer),
        Column::required("tour", "tour_id", ColumnKind::Uuid),
        Column::required("user", "user_id", ColumnKind::Uuid),
        CREATED_AT_COLUMN,
        VERSION_COLUMN,
    ];
}

pub const REFERENCES: &[Reference] = &[
    Reference::to::<Users>("user", &["name", "photo"]),
    Reference::to::<Tours>("tour", &["name"]),
];

fn check_rating(body: &Map<String, Value>) -> AppResult<()> {
    match body.get("rating") {
        None | Some(Value::Null) => Ok(()),
        Some(value) => match value.as_f64() {
            Some(rating) if (1.0..=5.0).contains(&rating) => Ok(()),
            _ => Err(AppError::validation("Rating must be between 1 and 5")),
        },
    }
}

/// A new review always belongs to the author; the tour comes from the nested
/// route when there is one.
pub fn prepare_create(
    body: &mut Map<String, Value>,
    author: Uuid,
    tour: Option<Uuid>,
) -> AppResult<()> {
    if let Some(tour) = tour {
        body.insert("tour".into(), Value::String(tour.to_string()));
    }
    body.insert("user".into(), Value::String(author.to_string()));
    if body.get("review").and_then(Value::as_str).map_or(true, |r| r.trim().is_empty()) {
        return Err(AppError::validation("Review cannot be empty!"));
    }
    if !body.contains_key("tour") {
        return Err(AppError::validation("Review must belong to a tour!"));
    }
    check_rating(body)
}

/// Updates may change the text and rating only.
pub fn prepare_update(body: &mut Map<String, Value>) -> AppResult<()> {
    body.retain(|key, _| key == "review" || key == "rating");
    check_rating(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn author_and_nested_tour_win() {
        let author = Uuid::new_v4();
        let tour = Uuid::new_v4();
        let mut b = body(json!({ "review": "Great!", "rating": 5, "user": "someone-else", "tour": "x" }));
        prepare_create(&mut b, author, Some(tour)).unwrap();
        assert_eq!(b["user"], author.to_string());
        assert_eq!(b["tour"], tour.to_string());
    }

    #[test]
    fn body_tour_is_kept_outside_nested_route() {
        let tour = Uuid::new_v4().to_string();
        let mut b = body(json!({ "review": "Nice", "rating": 4, "tour": tour }));
        prepare_create(&mut b, Uuid::new_v4(), None).unwrap();
        assert_eq!(b["tour"], tour);
    }

    #[test]
    fn create_validation() {
        let author = Uuid::new_v4();
        let mut b = body(json!({ "rating": 4, "tour": "t" }));
        assert_eq!(
            prepare_create(&mut b, author, None).unwrap_err().to_string(),
            "Review cannot be empty!"
        );
        let mut b = body(json!({ "review": "ok", "rating": 4 }));
        assert_eq!(
            prepare_create(&mut b, author, None).unwrap_err().to_string(),
            "Review must belong to a tour!"
        );
        let mut b = body(json!({ "review": "ok", "rating": 9, "tour": "t" }));
        assert!(prepare_create(&mut b, author, None).is_err());
    }

    #[test]
    fn update_strips_ownership_fields() {
        let mut b = body(json!({ "review": "Edited", "user": "x", "tour": "y" }));
        prepare_update(&mut b).unwrap();
        assert_eq!(b.len(), 1);
        assert!(prepare_update(&mut body(json!({ "rating": 0 }))).is_err());
    }

    #[test]
    fn embedded_tours_skip_secret_ones() {
        let tour = REFERENCES.iter().find(|r| r.field == "tour").unwrap();
        let qb = tour.lookup(vec![Uuid::new_v4()]).unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT id, jsonb_build_object('id', id, 'name', name) AS doc FROM tours \
             WHERE id = ANY($1) AND secret_tour = CAST($2 AS boolean)"
        );

        let user = REFERENCES.iter().find(|r| r.field == "user").unwrap();
        let qb = user.lookup(vec![Uuid::new_v4()]).unwrap();
        assert!(qb.sql().ends_with("FROM users WHERE id = ANY($1)"));
    }
}
