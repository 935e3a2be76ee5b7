use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::errors::ApiError;
use crate::models::{parse_range_bound, Category};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/advanced-health/stats/summary", get(get_summary))
        .with_state(state)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryQuery {
    start_date: Option<String>,
    end_date: Option<String>,
}

/// Per-category rollup. `_id` is the field name clients already consume.
#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    #[serde(rename = "_id")]
    pub category: Category,
    pub count: i64,
    pub latest_entry: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    category: String,
    event_date: DateTime<Utc>,
}

async fn get_summary(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<Vec<CategorySummary>>, ApiError> {
    let start = query
        .start_date
        .as_deref()
        .map(|raw| parse_range_bound(raw, false))
        .transpose()?;
    let end = query
        .end_date
        .as_deref()
        .map(|raw| parse_range_bound(raw, true))
        .transpose()?;

    let rows = sqlx::query_as::<_, SummaryRow>(
        "SELECT category, event_date FROM health_events \
         WHERE user_id = $1 \
           AND ($2::timestamptz IS NULL OR event_date >= $2) \
           AND ($3::timestamptz IS NULL OR event_date <= $3)",
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_all(&state.pool)
    .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let category = Category::parse(&row.category).map_err(|_| {
            ApiError::Internal(format!(
                "unexpected entry category '{}' in database",
                row.category
            ))
        })?;
        entries.push((category, row.event_date));
    }

    Ok(Json(summarize(entries)))
}

/// Groups entries by category, keeping a count and the latest timestamp per
/// category. Categories with no matching entries are simply absent.
pub fn summarize(entries: Vec<(Category, DateTime<Utc>)>) -> Vec<CategorySummary> {
    let mut grouped = BTreeMap::<Category, (i64, DateTime<Utc>)>::new();
    for (category, date) in entries {
        let slot = grouped.entry(category).or_insert((0, date));
        slot.0 += 1;
        if date > slot.1 {
            slot.1 = date;
        }
    }

    grouped
        .into_iter()
        .map(|(category, (count, latest_entry))| CategorySummary {
            category,
            count,
            latest_entry,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn summarize_counts_and_tracks_the_latest_entry() {
        let summaries = summarize(vec![
            (Category::BabyMovement, at(2, 9)),
            (Category::BabyMovement, at(5, 14)),
            (Category::BabyMovement, at(3, 20)),
            (Category::Sleep, at(4, 7)),
        ]);

        assert_eq!(summaries.len(), 2);

        let movement = summaries
            .iter()
            .find(|s| s.category == Category::BabyMovement)
            .unwrap();
        assert_eq!(movement.count, 3);
        assert_eq!(movement.latest_entry, at(5, 14));

        let sleep = summaries
            .iter()
            .find(|s| s.category == Category::Sleep)
            .unwrap();
        assert_eq!(sleep.count, 1);
        assert_eq!(sleep.latest_entry, at(4, 7));
    }

    #[test]
    fn categories_without_entries_are_omitted_not_zero_filled() {
        let summaries = summarize(vec![(Category::Medication, at(1, 8))]);

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].category, Category::Medication);
        assert!(summaries.iter().all(|s| s.count > 0));
    }

    #[test]
    fn summarize_of_nothing_is_empty() {
        assert!(summarize(Vec::new()).is_empty());
    }

    #[test]
    fn summary_serializes_with_the_mongo_style_id_key() {
        let value = serde_json::to_value(CategorySummary {
            category: Category::BabyMovement,
            count: 1,
            latest_entry: at(2, 0),
        })
        .unwrap();

        assert_eq!(value["_id"], "babyMovement");
        assert_eq!(value["count"], 1);
        assert!(value["latestEntry"].is_string());
    }
}
