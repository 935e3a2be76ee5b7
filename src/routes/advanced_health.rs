use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sqlx::types::Json as Jsonb;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::ApiError;
use crate::models::{
    parse_event_date, parse_range_bound, Category, EventPayload, HealthEvent, HealthEventRow,
};
use crate::state::AppState;

const SELECT_COLUMNS: &str = "id, user_id, event_date, payload, created_at, updated_at";

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/advanced-health", get(list_entries).post(create_entry))
        .route(
            "/advanced-health/:id",
            get(get_entry).put(update_entry).delete(delete_entry),
        )
        .with_state(state)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    #[serde(rename = "type")]
    entry_type: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
}

fn into_object(body: Value) -> Result<Map<String, Value>, ApiError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::validation(
            "request body must be a JSON object",
            vec![],
        )),
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Result<Option<String>, ApiError> {
    match fields.remove(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ApiError::validation(
            format!("invalid field '{key}'"),
            vec![format!("{key}: must be a string")],
        )),
    }
}

async fn create_entry(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<Value>,
) -> Result<Json<HealthEvent>, ApiError> {
    let mut fields = into_object(body)?;

    let category = take_string(&mut fields, "type")?
        .ok_or_else(|| {
            ApiError::validation("missing required field", vec!["type: required".into()])
        })
        .and_then(|raw| Category::parse(&raw))?;

    let date = take_string(&mut fields, "date")?
        .ok_or_else(|| {
            ApiError::validation("missing required field", vec!["date: required".into()])
        })
        .and_then(|raw| parse_event_date(&raw))?;

    let payload = EventPayload::from_fields(category, fields)?;

    let row = sqlx::query_as::<_, HealthEventRow>(&format!(
        "INSERT INTO health_events (user_id, category, event_date, payload) \
         VALUES ($1, $2, $3, $4) RETURNING {SELECT_COLUMNS}"
    ))
    .bind(user_id)
    .bind(category.as_str())
    .bind(date)
    .bind(Jsonb(payload))
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(row.into_event()))
}

async fn list_entries(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<HealthEvent>>, ApiError> {
    let category = query
        .entry_type
        .as_deref()
        .map(Category::parse)
        .transpose()?;
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

    let rows = sqlx::query_as::<_, HealthEventRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM health_events \
         WHERE user_id = $1 \
           AND ($2::text IS NULL OR category = $2) \
           AND ($3::timestamptz IS NULL OR event_date >= $3) \
           AND ($4::timestamptz IS NULL OR event_date <= $4) \
         ORDER BY event_date DESC"
    ))
    .bind(user_id)
    .bind(category.map(|c| c.as_str()))
    .bind(start)
    .bind(end)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows.into_iter().map(HealthEventRow::into_event).collect()))
}

async fn get_entry(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<HealthEvent>, ApiError> {
    let row = fetch_owned(&state, id, user_id).await?;
    Ok(Json(row.into_event()))
}

async fn update_entry(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<Value>,
) -> Result<Json<HealthEvent>, ApiError> {
    let mut fields = into_object(body)?;

    let event = fetch_owned(&state, id, user_id).await?.into_event();

    let category = match take_string(&mut fields, "type")? {
        Some(raw) => Category::parse(&raw)?,
        None => event.category,
    };
    let date = match take_string(&mut fields, "date")? {
        Some(raw) => parse_event_date(&raw)?,
        None => event.date,
    };
    let payload = event.payload.apply_patch(category, fields)?;

    let row = sqlx::query_as::<_, HealthEventRow>(&format!(
        "UPDATE health_events \
         SET category = $1, event_date = $2, payload = $3, updated_at = now() \
         WHERE id = $4 AND user_id = $5 RETURNING {SELECT_COLUMNS}"
    ))
    .bind(category.as_str())
    .bind(date)
    .bind(Jsonb(payload))
    .bind(id)
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("Entry not found".into()))?;

    Ok(Json(row.into_event()))
}

async fn delete_entry(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let result = sqlx::query("DELETE FROM health_events WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Entry not found".into()));
    }

    Ok(Json(json!({ "message": "Entry deleted" })))
}

/// Fetches an entry scoped to its owner. A record that exists but belongs to
/// someone else is indistinguishable from one that does not exist.
async fn fetch_owned(state: &AppState, id: Uuid, user_id: Uuid) -> Result<HealthEventRow, ApiError> {
    sqlx::query_as::<_, HealthEventRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM health_events WHERE id = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("Entry not found".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_object_body_is_rejected() {
        assert!(matches!(
            into_object(json!([1, 2, 3])),
            Err(ApiError::Validation { .. })
        ));
        assert!(matches!(
            into_object(json!("entry")),
            Err(ApiError::Validation { .. })
        ));
    }

    #[test]
    fn take_string_removes_the_field_from_the_payload() {
        let mut fields = match json!({ "type": "sleep", "hours": 8.0 }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        let taken = take_string(&mut fields, "type").unwrap();
        assert_eq!(taken.as_deref(), Some("sleep"));
        assert!(!fields.contains_key("type"));
        assert!(fields.contains_key("hours"));
    }

    #[test]
    fn take_string_rejects_a_non_string_value() {
        let mut fields = match json!({ "date": 20240602 }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        assert!(matches!(
            take_string(&mut fields, "date"),
            Err(ApiError::Validation { .. })
        ));
    }

    #[test]
    fn take_string_is_none_for_a_missing_field() {
        let mut fields = Map::new();
        assert_eq!(take_string(&mut fields, "type").unwrap(), None);
    }
}
