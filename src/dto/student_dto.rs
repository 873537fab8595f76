use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

use crate::models::attempt::{Attempt, AttemptStatus};
use crate::models::proctor_event::ProctorEventKind;
use crate::models::question::{AnswerValue, SanitizedQuestion};
use crate::models::score::ScoreResult;
use crate::models::test::TestDefinition;

/// A test as a student sees it: bank stripped of answer keys.
#[derive(Debug, Clone, Serialize)]
pub struct TestPreviewResponse {
    pub id: Uuid,
    pub title: String,
    pub instructions: Option<String>,
    pub class_name: String,
    pub duration_minutes: i32,
    pub total_marks: i32,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub questions: Vec<SanitizedQuestion>,
}

impl TestPreviewResponse {
    pub fn from_test(test: &TestDefinition) -> crate::error::Result<Self> {
        let questions = test
            .question_bank()?
            .iter()
            .map(SanitizedQuestion::from)
            .collect();
        Ok(Self {
            id: test.id,
            title: test.title.clone(),
            instructions: test.instructions.clone(),
            class_name: test.class_name.clone(),
            duration_minutes: test.duration_minutes,
            total_marks: test.total_marks,
            scheduled_start: test.scheduled_start,
            questions,
        })
    }
}

/// Fresh start and resume share this shape; `answers` carries whatever was
/// saved before so a reloaded browser can repopulate the form.
#[derive(Debug, Clone, Serialize)]
pub struct StartAttemptResponse {
    pub attempt_id: Uuid,
    pub test_id: Uuid,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub time_remaining_seconds: i64,
    pub answers: JsonValue,
    pub questions: Vec<SanitizedQuestion>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SaveAnswerRequest {
    #[validate(range(min = 1))]
    pub question_id: i32,
    pub answer: AnswerValue,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveAnswerResponse {
    pub saved: bool,
    pub question_id: i32,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SubmitAttemptRequest {
    /// Final answers to overlay on what autosave already captured.
    pub answers: Option<BTreeMap<i32, AnswerValue>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptStatusResponse {
    pub attempt_id: Uuid,
    pub test_id: Uuid,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub time_remaining_seconds: i64,
    pub questions_answered: usize,
    pub total_questions: usize,
    pub submitted_late: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptResultResponse {
    pub attempt_id: Uuid,
    pub test_id: Uuid,
    pub status: AttemptStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub submitted_late: bool,
    pub result: ScoreResult,
}

impl AttemptResultResponse {
    pub fn new(attempt: &Attempt, result: ScoreResult) -> Self {
        Self {
            attempt_id: attempt.id,
            test_id: attempt.test_id,
            status: attempt.status,
            completed_at: attempt.completed_at,
            submitted_late: attempt.submitted_late,
            result,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProctorEventRequest {
    pub event_type: ProctorEventKind,
    pub detail: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProctorEventResponse {
    pub recorded: bool,
    pub illegal_attempts: i32,
}
