use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Output of the scoring engine for one attempt. Persisted on the attempt
/// row (marks/percentage as columns, breakdown as JSONB) so repeated
/// submissions can return the stored result without rescoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub total_marks: i32,
    pub marks_obtained: i32,
    pub percentage: Decimal,
    pub breakdown: Vec<QuestionScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionScore {
    pub question_id: i32,
    pub answered: bool,
    pub correct: bool,
    pub marks_awarded: i32,
    pub marks_available: i32,
}
