use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::types::Json;
use uuid::Uuid;

use crate::errors::ApiError;

/// Discriminator for the six health-entry shapes. The wire name is `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    BabyMovement,
    Contraction,
    WaterIntake,
    Sleep,
    Exercise,
    Medication,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::BabyMovement,
        Category::Contraction,
        Category::WaterIntake,
        Category::Sleep,
        Category::Exercise,
        Category::Medication,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::BabyMovement => "babyMovement",
            Category::Contraction => "contraction",
            Category::WaterIntake => "waterIntake",
            Category::Sleep => "sleep",
            Category::Exercise => "exercise",
            Category::Medication => "medication",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == raw)
            .ok_or_else(|| {
                ApiError::validation(
                    format!("unknown entry type '{raw}'"),
                    vec![
                        "type: must be one of babyMovement, contraction, waterIntake, sleep, exercise, medication"
                            .to_string(),
                    ],
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractionIntensity {
    #[serde(rename = "mild")]
    Mild,
    #[serde(rename = "moderate")]
    Moderate,
    #[serde(rename = "strong")]
    Strong,
    #[serde(rename = "very strong")]
    VeryStrong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaterType {
    Water,
    Juice,
    Tea,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SleepQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExerciseType {
    Walking,
    Swimming,
    Yoga,
    Pilates,
    Stretching,
    StrengthTraining,
    Cycling,
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BabyMovementEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kick_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContractionEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity: Option<ContractionIntensity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WaterIntakeEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<f64>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub drink_type: Option<WaterType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SleepEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<SleepQuality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interruptions: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bed_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wake_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExerciseEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exercise_type: Option<ExerciseType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calories: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub satisfaction: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MedicationEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medication_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dosage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taken: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side_effects: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prescribed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Tagged union of the six entry shapes. External tagging keeps the payload
/// nested under its category key in both the JSONB column and the wire JSON,
/// and `deny_unknown_fields` on the variant structs means a payload can never
/// carry a field belonging to a different category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventPayload {
    BabyMovement(BabyMovementEntry),
    Contraction(ContractionEntry),
    WaterIntake(WaterIntakeEntry),
    Sleep(SleepEntry),
    Exercise(ExerciseEntry),
    Medication(MedicationEntry),
}

impl EventPayload {
    pub fn category(&self) -> Category {
        match self {
            EventPayload::BabyMovement(_) => Category::BabyMovement,
            EventPayload::Contraction(_) => Category::Contraction,
            EventPayload::WaterIntake(_) => Category::WaterIntake,
            EventPayload::Sleep(_) => Category::Sleep,
            EventPayload::Exercise(_) => Category::Exercise,
            EventPayload::Medication(_) => Category::Medication,
        }
    }

    /// Builds a payload of the given category from loose JSON fields.
    /// Dispatches exhaustively so a field from another category, or a value
    /// of the wrong type, is a validation failure rather than silently kept.
    pub fn from_fields(category: Category, fields: Map<String, Value>) -> Result<Self, ApiError> {
        let value = Value::Object(fields);
        let result = match category {
            Category::BabyMovement => serde_json::from_value(value).map(EventPayload::BabyMovement),
            Category::Contraction => serde_json::from_value(value).map(EventPayload::Contraction),
            Category::WaterIntake => serde_json::from_value(value).map(EventPayload::WaterIntake),
            Category::Sleep => serde_json::from_value(value).map(EventPayload::Sleep),
            Category::Exercise => serde_json::from_value(value).map(EventPayload::Exercise),
            Category::Medication => serde_json::from_value(value).map(EventPayload::Medication),
        };

        result.map_err(|e| {
            ApiError::validation(
                format!("invalid {} entry", category.as_str()),
                vec![e.to_string()],
            )
        })
    }

    /// Merges a partial update into this payload, field by field. Fields not
    /// named in the patch keep their stored value. When the patch switches
    /// the category, the payload is rebuilt from the patch alone, since the
    /// old category's fields have no meaning under the new one.
    pub fn apply_patch(
        &self,
        category: Category,
        patch: Map<String, Value>,
    ) -> Result<Self, ApiError> {
        let mut fields = if category == self.category() {
            self.fields()
        } else {
            Map::new()
        };

        for (key, value) in patch {
            fields.insert(key, value);
        }

        Self::from_fields(category, fields)
    }

    /// The payload's own fields, without the category tag.
    fn fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(tagged)) => tagged
                .into_iter()
                .next()
                .and_then(|(_, inner)| match inner {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .unwrap_or_default(),
            _ => Map::new(),
        }
    }
}

/// A single logged health observation, as returned to clients. The payload
/// flattens into the body under its category key, next to `type` and `date`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub category: Category,
    pub date: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
pub struct HealthEventRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_date: DateTime<Utc>,
    pub payload: Json<EventPayload>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HealthEventRow {
    pub fn into_event(self) -> HealthEvent {
        let payload = self.payload.0;
        HealthEvent {
            id: self.id,
            user_id: self.user_id,
            category: payload.category(),
            date: self.event_date,
            payload,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    Active,
    Terminated,
    Completed,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::Active => "active",
            CycleStatus::Terminated => "terminated",
            CycleStatus::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(CycleStatus::Active),
            "terminated" => Some(CycleStatus::Terminated),
            "completed" => Some(CycleStatus::Completed),
            _ => None,
        }
    }

    /// Terminated and completed are terminal. Only an active cycle moves.
    pub fn can_transition_to(&self, target: CycleStatus) -> bool {
        matches!(
            (self, target),
            (CycleStatus::Active, CycleStatus::Terminated)
                | (CycleStatus::Active, CycleStatus::Completed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PregnancyCycle {
    pub id: Uuid,
    pub user_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<DateTime<Utc>>,
    pub status: CycleStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
pub struct CycleRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<DateTime<Utc>>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CycleRow {
    pub fn into_cycle(self) -> Result<PregnancyCycle, ApiError> {
        let status = CycleStatus::parse(&self.status).ok_or_else(|| {
            ApiError::Internal(format!(
                "unexpected cycle status '{}' in database",
                self.status
            ))
        })?;

        Ok(PregnancyCycle {
            id: self.id,
            user_id: self.user_id,
            start_date: self.start_date,
            end_date: self.end_date,
            status,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Parses an entry timestamp: RFC 3339, or a bare YYYY-MM-DD taken as
/// midnight UTC.
pub fn parse_event_date(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(dt) = d.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&dt));
        }
    }

    Err(ApiError::validation(
        "invalid date",
        vec![format!(
            "date: '{raw}' is not a valid date (expected RFC 3339 or YYYY-MM-DD)"
        )],
    ))
}

/// Parses a date-range bound. A bare date used as the end of a range is
/// widened to the last instant of that day, keeping the range inclusive.
pub fn parse_range_bound(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let time = if end_of_day {
            d.and_hms_micro_opt(23, 59, 59, 999_999)
        } else {
            d.and_hms_opt(0, 0, 0)
        };
        if let Some(dt) = time {
            return Ok(Utc.from_utc_datetime(&dt));
        }
    }

    Err(ApiError::validation(
        "invalid date range",
        vec![format!(
            "'{raw}' is not a valid date (expected RFC 3339 or YYYY-MM-DD)"
        )],
    ))
}
