use serde::{Deserialize, Serialize};

/// A single question as stored inside a test's question bank.
///
/// The bank lives as a JSONB array on the tests row; ids are 1-based
/// ordinals assigned when the bank is created or extended and never
/// reused within a test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    #[serde(default)]
    pub id: i32,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: AnswerValue,
    #[serde(default = "default_marks")]
    pub marks: i32,
}

pub fn default_marks() -> i32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuestionType {
    /// Single-choice: exactly one option is correct.
    Mcq,
    /// Multi-select: a set of options is correct.
    Msq,
    /// Numerical answer typed in free text, no options.
    Nat,
}

impl QuestionType {
    pub fn expects_many(self) -> bool {
        matches!(self, QuestionType::Msq)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::Mcq => "MCQ",
            QuestionType::Msq => "MSQ",
            QuestionType::Nat => "NAT",
        }
    }
}

/// Answer payload for a question: a single string for MCQ/NAT, a set of
/// strings for MSQ. The same shape carries both the stored correct answer
/// and a student's submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    One(String),
    Many(Vec<String>),
}

impl AnswerValue {
    /// Whether this value has the shape the question type expects.
    /// Correctness is not judged here, only arity.
    pub fn conforms_to(&self, question_type: QuestionType) -> bool {
        match self {
            AnswerValue::One(_) => !question_type.expects_many(),
            AnswerValue::Many(_) => question_type.expects_many(),
        }
    }
}

/// Question view handed to students: everything except the answer key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizedQuestion {
    pub id: i32,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub options: Vec<String>,
    pub marks: i32,
}

impl From<&Question> for SanitizedQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            text: q.text.clone(),
            question_type: q.question_type,
            options: q.options.clone(),
            marks: q.marks,
        }
    }
}
