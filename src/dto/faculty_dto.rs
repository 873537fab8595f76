use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::question::Question;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTestPayload {
    #[validate(length(min = 1))]
    pub title: String,
    pub instructions: Option<String>,
    #[validate(length(min = 1))]
    pub class_name: String,
    #[validate(range(min = 1, max = 600))]
    pub duration_minutes: i32,
    /// Optional declared total; must agree with the sum over the bank.
    pub total_marks: Option<i32>,
    pub scheduled_start: Option<DateTime<Utc>>,
    #[validate(length(min = 1))]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateTestPayload {
    #[validate(length(min = 1))]
    pub title: Option<String>,
    pub instructions: Option<String>,
    #[validate(length(min = 1))]
    pub class_name: Option<String>,
    #[validate(range(min = 1, max = 600))]
    pub duration_minutes: Option<i32>,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub questions: Option<Vec<Question>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ImportQuestionsPayload {
    #[validate(length(min = 1))]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TestListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}
