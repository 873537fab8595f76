use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::question::AnswerValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attempt_status", rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
    Expired,
}

impl AttemptStatus {
    /// Terminal states admit no further transitions or answer writes.
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptStatus::Completed | AttemptStatus::Expired)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Expired => "expired",
        }
    }
}

/// One student's run at a test. At most one row exists per
/// (student_id, test_id); the row is never deleted once created.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attempt {
    pub id: Uuid,
    pub test_id: Uuid,
    pub student_id: Uuid,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub answers: JsonValue,
    pub marks_obtained: Option<i32>,
    pub percentage: Option<rust_decimal::Decimal>,
    pub graded: Option<JsonValue>,
    pub submitted_late: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Attempt {
    /// Decode the stored answers map (question id -> answer value).
    /// The column defaults to `{}` and is only written through
    /// validated paths, so decode failures are internal errors.
    pub fn answer_map(&self) -> crate::error::Result<BTreeMap<i32, AnswerValue>> {
        serde_json::from_value(self.answers.clone()).map_err(|e| {
            crate::error::Error::Internal(format!(
                "Corrupt answers on attempt {}: {}",
                self.id, e
            ))
        })
    }
}
