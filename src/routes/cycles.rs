use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde_json::Value;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::{is_unique_violation, ApiError};
use crate::models::{CycleRow, CycleStatus, PregnancyCycle};
use crate::state::AppState;

/// Partial unique index name from the initial migration; a violation means a
/// concurrent start won the race.
const ACTIVE_CYCLE_CONSTRAINT: &str = "pregnancy_cycles_one_active_per_user";

const SELECT_COLUMNS: &str =
    "id, user_id, start_date, end_date, status, notes, created_at, updated_at";

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/pregnancy-cycles", get(list_cycles).post(start_cycle))
        .route("/pregnancy-cycles/:id/terminate", put(terminate_cycle))
        .with_state(state)
}

struct NewCycle {
    start_date: NaiveDate,
    notes: Option<String>,
}

impl NewCycle {
    /// Pulled apart by hand so a missing or malformed field is a 400 with
    /// per-field detail, not a generic body rejection.
    fn parse(body: Value) -> Result<Self, ApiError> {
        let mut fields = match body {
            Value::Object(map) => map,
            _ => {
                return Err(ApiError::validation(
                    "request body must be a JSON object",
                    vec![],
                ))
            }
        };

        let raw_start = match fields.remove("startDate") {
            Some(Value::String(s)) => s,
            Some(_) => {
                return Err(ApiError::validation(
                    "invalid start date",
                    vec!["startDate: must be a string".into()],
                ))
            }
            None => {
                return Err(ApiError::validation(
                    "missing required field",
                    vec!["startDate: required".into()],
                ))
            }
        };
        let start_date = NaiveDate::parse_from_str(&raw_start, "%Y-%m-%d").map_err(|_| {
            ApiError::validation(
                "invalid start date",
                vec![format!(
                    "startDate: '{raw_start}' is not a valid date (expected YYYY-MM-DD)"
                )],
            )
        })?;

        let notes = match fields.remove("notes") {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(_) => {
                return Err(ApiError::validation(
                    "invalid notes",
                    vec!["notes: must be a string".into()],
                ))
            }
        };

        Ok(NewCycle { start_date, notes })
    }
}

/// Starts a new cycle. Closing whatever cycle is still active and inserting
/// the new one happen in one transaction, and the partial unique index backs
/// that up against a concurrent start racing between the two statements.
async fn start_cycle(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<Value>,
) -> Result<Json<PregnancyCycle>, ApiError> {
    let NewCycle { start_date, notes } = NewCycle::parse(body)?;

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "UPDATE pregnancy_cycles \
         SET status = 'completed', end_date = now(), updated_at = now() \
         WHERE user_id = $1 AND status = 'active'",
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    let row = sqlx::query_as::<_, CycleRow>(&format!(
        "INSERT INTO pregnancy_cycles (user_id, start_date, notes) \
         VALUES ($1, $2, $3) RETURNING {SELECT_COLUMNS}"
    ))
    .bind(user_id)
    .bind(start_date)
    .bind(notes)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e, ACTIVE_CYCLE_CONSTRAINT) {
            ApiError::Conflict("Another cycle was started at the same time, retry".into())
        } else {
            ApiError::from(e)
        }
    })?;

    tx.commit().await?;

    Ok(Json(row.into_cycle()?))
}

async fn terminate_cycle(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PregnancyCycle>, ApiError> {
    let cycle = sqlx::query_as::<_, CycleRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM pregnancy_cycles WHERE id = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("Cycle not found".into()))?
    .into_cycle()?;

    if !cycle.status.can_transition_to(CycleStatus::Terminated) {
        return Err(ApiError::InvalidState(format!(
            "Cycle is {}, only an active cycle can be terminated",
            cycle.status.as_str()
        )));
    }

    // The status guard in the WHERE clause closes the check-then-act window.
    let row = sqlx::query_as::<_, CycleRow>(&format!(
        "UPDATE pregnancy_cycles \
         SET status = 'terminated', end_date = now(), updated_at = now() \
         WHERE id = $1 AND user_id = $2 AND status = 'active' RETURNING {SELECT_COLUMNS}"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::InvalidState("Cycle is no longer active".into()))?;

    Ok(Json(row.into_cycle()?))
}

async fn list_cycles(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<PregnancyCycle>>, ApiError> {
    let rows = sqlx::query_as::<_, CycleRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM pregnancy_cycles \
         WHERE user_id = $1 ORDER BY start_date DESC"
    ))
    .bind(user_id)
    .fetch_all(&state.pool)
    .await?;

    let cycles = rows
        .into_iter()
        .map(CycleRow::into_cycle)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(cycles))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_cycle_parses_start_date_and_notes() {
        let parsed =
            NewCycle::parse(json!({ "startDate": "2024-01-01", "notes": "first" })).unwrap();

        assert_eq!(
            parsed.start_date,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
        assert_eq!(parsed.notes.as_deref(), Some("first"));
    }

    #[test]
    fn notes_are_optional() {
        let parsed = NewCycle::parse(json!({ "startDate": "2024-06-01" })).unwrap();
        assert_eq!(parsed.notes, None);

        let parsed = NewCycle::parse(json!({ "startDate": "2024-06-01", "notes": null })).unwrap();
        assert_eq!(parsed.notes, None);
    }

    #[test]
    fn missing_start_date_is_a_validation_error() {
        assert!(matches!(
            NewCycle::parse(json!({ "notes": "no date" })),
            Err(ApiError::Validation { .. })
        ));
    }

    #[test]
    fn malformed_start_date_is_a_validation_error() {
        assert!(matches!(
            NewCycle::parse(json!({ "startDate": "01/06/2024" })),
            Err(ApiError::Validation { .. })
        ));
        assert!(matches!(
            NewCycle::parse(json!({ "startDate": 20240601 })),
            Err(ApiError::Validation { .. })
        ));
    }
}
