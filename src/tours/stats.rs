//! Aggregate reports over the public tours.

use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use crate::error::{AppError, AppResult};

const MIN_STATS_RATING: f64 = 4.5;
const MAX_PLAN_ROWS: i64 = 12;

/// Per-difficulty figures for well rated tours, most expensive group first.
pub fn tour_stats_query() -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(
        "SELECT jsonb_build_object(\
         '_id', upper(difficulty), \
         'numTours', count(*), \
         'numRatings', sum(ratings_quantity), \
         'avgRating', avg(ratings_average), \
         'avgDuration', avg(duration), \
         'avgPrice', avg(price), \
         'minPrice', min(price), \
         'maxPrice', max(price)) AS doc \
         FROM tours WHERE secret_tour = false AND ratings_average >= ",
    );
    qb.push_bind(MIN_STATS_RATING)
        .push(" GROUP BY upper(difficulty) ORDER BY avg(price) DESC");
    qb
}

/// Tour starts per month of `year` with the names of the tours starting.
pub fn monthly_plan_query(year: i32) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(
        "SELECT jsonb_build_object('month', month, 'numTourStarts', starts, 'tours', tours) AS doc \
         FROM (SELECT CAST(EXTRACT(MONTH FROM start_date AT TIME ZONE 'UTC') AS integer) AS month, \
         count(*) AS starts, array_agg(t.name ORDER BY t.name) AS tours \
         FROM tours t, unnest(t.start_dates) AS start_date \
         WHERE t.secret_tour = false AND EXTRACT(YEAR FROM start_date AT TIME ZONE 'UTC') = ",
    );
    qb.push_bind(year)
        .push(" GROUP BY 1 ORDER BY starts DESC, month ASC LIMIT ")
        .push_bind(MAX_PLAN_ROWS)
        .push(") AS plan ORDER BY starts DESC, month ASC");
    qb
}

pub fn parse_year(raw: &str) -> AppResult<i32> {
    raw.trim()
        .parse::<i32>()
        .ok()
        .filter(|y| (1..=9999).contains(y))
        .ok_or_else(|| AppError::validation(format!("Invalid year: {raw}")))
}

pub async fn tour_stats(db: &PgPool) -> AppResult<Vec<Value>> {
    let mut qb = tour_stats_query();
    let stats = qb
        .build_query_scalar::<Value>()
        .fetch_all(db)
        .await?;
    debug!(groups = stats.len(), "tour stats");
    Ok(stats)
}

pub async fn monthly_plan(db: &PgPool, year: i32) -> AppResult<Vec<Value>> {
    let mut qb = monthly_plan_query(year);
    let plan = qb
        .build_query_scalar::<Value>()
        .fetch_all(db)
        .await?;
    debug!(year, months = plan.len(), "monthly plan");
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_only_consider_public_well_rated_tours() {
        let qb = tour_stats_query();
        let sql = qb.sql();
        assert!(sql.contains("WHERE secret_tour = false AND ratings_average >= $1"));
        assert!(sql.ends_with("GROUP BY upper(difficulty) ORDER BY avg(price) DESC"));
    }

    #[test]
    fn plan_is_capped_at_twelve_months() {
        let qb = monthly_plan_query(2021);
        let sql = qb.sql();
        assert!(sql.contains("EXTRACT(YEAR FROM start_date AT TIME ZONE 'UTC') = $1"));
        assert!(sql.contains("LIMIT $2"));
    }

    #[test]
    fn year_must_be_numeric() {
        assert_eq!(parse_year("2021").unwrap(), 2021);
        assert!(matches!(parse_year("twenty"), Err(AppError::Validation(_))));
        assert!(parse_year("0").is_err());
    }
}
