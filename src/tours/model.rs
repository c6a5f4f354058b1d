use serde_json::{Map, Value};

use crate::{
    error::{AppError, AppResult},
    query::{
        sql::{CREATED_AT_COLUMN, ID_COLUMN, VERSION_COLUMN},
        Collection, Column, ColumnKind, Predicate, QueryParams,
    },
};

pub const DIFFICULTIES: [&str; 3] = ["easy", "medium", "hard"];
const NAME_MIN: usize = 10;
const NAME_MAX: usize = 40;

pub struct Tours;

impl Collection for Tours {
    const TABLE: &'static str = "tours";
    const NAME: &'static str = "tour";
    const COLUMNS: &'static [Column] = &[
        ID_COLUMN,
        Column::required("name", "name", ColumnKind::Text),
        Column::optional("slug", "slug", ColumnKind::Text),
        Column::required("duration", "duration", ColumnKind::Integer),
        Column::required("maxGroupSize", "max_group_size", ColumnKind::Integer),
        Column::required("difficulty", "difficulty", ColumnKind::Text),
        Column::optional("ratingsAverage", "ratings_average", ColumnKind::Number),
        Column::optional("ratingsQuantity", "ratings_quantity", ColumnKind::Integer),
        Column::required("price", "price", ColumnKind::Number),
        Column::optional("priceDiscount", "price_discount", ColumnKind::Number),
        Column::required("summary", "summary", ColumnKind::Text),
        Column::optional("description", "description", ColumnKind::Text),
        Column::required("imageCover", "image_cover", ColumnKind::Text),
        Column::optional("images", "images", ColumnKind::TextArray),
        Column::optional("startDates", "start_dates", ColumnKind::TimestampArray),
        Column::optional("secretTour", "secret_tour", ColumnKind::Boolean),
        CREATED_AT_COLUMN,
        VERSION_COLUMN,
    ];

    /// Secret tours never show up in reads, updates or deletes.
    fn scope() -> Vec<Predicate> {
        vec![Predicate::eq("secretTour", false)]
    }
}

/// Lower-case ASCII words joined by `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for word in name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        if !slug.is_empty() {
            slug.push('-');
        }
        slug.push_str(&word.to_ascii_lowercase());
    }
    slug
}

/// Validates and normalizes a create/update body: trims text, derives the
/// slug from the name and checks the discount against the price.
pub fn prepare_write(body: &mut Map<String, Value>) -> AppResult<()> {
    body.remove("slug");

    for field in ["name", "summary", "description"] {
        if let Some(Value::String(text)) = body.get_mut(field) {
            *text = text.trim().to_string();
        }
    }

    if let Some(name) = body.get("name").and_then(Value::as_str) {
        let len = name.chars().count();
        if len > NAME_MAX {
            return Err(AppError::validation(format!(
                "A tour name must have less or equal then {NAME_MAX} characters"
            )));
        }
        if len < NAME_MIN {
            return Err(AppError::validation(format!(
                "A tour name must have more or equal then {NAME_MIN} characters"
            )));
        }
        let slug = slugify(name);
        body.insert("slug".into(), Value::String(slug));
    }

    if let Some(difficulty) = body.get("difficulty").and_then(Value::as_str) {
        if !DIFFICULTIES.contains(&difficulty) {
            return Err(AppError::validation(
                "Difficulty is either: easy, medium, hard",
            ));
        }
    }

    if let Some(rating) = body.get("ratingsAverage").and_then(Value::as_f64) {
        if !(1.0..=5.0).contains(&rating) {
            return Err(AppError::validation("Rating must be between 1.0 and 5.0"));
        }
    }

    let price = body.get("price").and_then(Value::as_f64);
    if let (Some(discount), Some(price)) = (body.get("priceDiscount").and_then(Value::as_f64), price) {
        if discount >= price {
            return Err(AppError::validation(format!(
                "Discount price ({discount}) should be below regular price"
            )));
        }
    }
    Ok(())
}

/// Adds the computed fields clients see on every tour.
pub fn with_virtuals(mut doc: Value) -> Value {
    let weeks = doc.get("duration").and_then(Value::as_f64).map(|d| d / 7.0);
    if let (Some(weeks), Some(map)) = (weeks, doc.as_object_mut()) {
        map.insert("durationWeeks".into(), Value::from(weeks));
    }
    doc
}

/// Preset parameters for the five best-rated, cheapest tours.
pub fn top_five_cheap(params: &mut QueryParams) {
    params.set("limit", "5");
    params.set("sort", "-ratingsAverage,price");
    params.set("fields", "name,price,summary,ratingsAverage,difficulty");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{factory::query_spec, query::{sql, QuerySpec}};
    use serde_json::json;

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn slug_from_name() {
        assert_eq!(slugify("The Forest Hiker"), "the-forest-hiker");
        assert_eq!(slugify("  Sea -- Explorer! 2 "), "sea-explorer-2");
    }

    #[test]
    fn prepare_write_derives_slug_and_ignores_client_slug() {
        let mut b = body(json!({ "name": " The Snow Adventurer ", "slug": "hacked" }));
        prepare_write(&mut b).unwrap();
        assert_eq!(b["name"], "The Snow Adventurer");
        assert_eq!(b["slug"], "the-snow-adventurer");

        let mut b = body(json!({ "price": 10, "slug": "hacked" }));
        prepare_write(&mut b).unwrap();
        assert!(b.get("slug").is_none());
    }

    #[test]
    fn prepare_write_validates() {
        for value in [
            json!({ "name": "Short" }),
            json!({ "name": "A name that is far too long to be accepted here" }),
            json!({ "difficulty": "extreme" }),
            json!({ "ratingsAverage": 6 }),
            json!({ "price": 100, "priceDiscount": 150 }),
        ] {
            let mut b = body(value.clone());
            assert!(
                matches!(prepare_write(&mut b), Err(AppError::Validation(_))),
                "{value}"
            );
        }
    }

    #[test]
    fn duration_weeks_is_added() {
        let doc = with_virtuals(json!({ "duration": 14 }));
        assert_eq!(doc["durationWeeks"], 2.0);
        let doc = with_virtuals(json!({ "name": "no duration" }));
        assert!(doc.get("durationWeeks").is_none());
    }

    #[test]
    fn top_five_preset_overrides_request() {
        let mut params = QueryParams::from_pairs([("limit", "50"), ("difficulty", "easy")]);
        top_five_cheap(&mut params);
        let spec = query_spec(QuerySpec::new(), &params).unwrap();
        assert_eq!(spec.limit, Some(5));
        assert_eq!(spec.sort.len(), 2);
        assert_eq!(spec.filter.len(), 1);
    }

    #[test]
    fn secret_tours_are_scoped_out() {
        let qb = sql::select::<Tours>(&QuerySpec::new()).unwrap();
        assert!(qb.sql().contains("WHERE secret_tour = CAST($1 AS boolean)"));
    }
}
