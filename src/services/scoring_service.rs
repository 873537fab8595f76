use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;

use crate::models::question::{AnswerValue, Question, QuestionType};
use crate::models::score::{QuestionScore, ScoreResult};

/// Pure scoring over a question bank and an answers map. No I/O, no
/// clock: the same inputs always produce the same result, which is what
/// makes idempotent submission cheap (losers of the submit/expire race
/// can discard their computation).
pub struct ScoringService;

impl ScoringService {
    pub fn score(questions: &[Question], answers: &BTreeMap<i32, AnswerValue>) -> ScoreResult {
        let mut total_marks: i32 = 0;
        let mut marks_obtained: i32 = 0;
        let mut breakdown: Vec<QuestionScore> = Vec::with_capacity(questions.len());

        for q in questions {
            total_marks += q.marks;
            let answer = answers.get(&q.id);
            let correct = answer.map(|a| Self::is_correct(q, a)).unwrap_or(false);
            let awarded = if correct { q.marks } else { 0 };
            marks_obtained += awarded;

            breakdown.push(QuestionScore {
                question_id: q.id,
                answered: answer.is_some(),
                correct,
                marks_awarded: awarded,
                marks_available: q.marks,
            });
        }

        ScoreResult {
            total_marks,
            marks_obtained,
            percentage: Self::percentage(marks_obtained, total_marks),
            breakdown,
        }
    }

    /// `obtained / total * 100` at a fixed two-decimal scale, so a freshly
    /// computed result serializes identically to one read back from the
    /// NUMERIC(5,2) column. A zero or negative total yields zero instead
    /// of a division error.
    pub fn percentage(obtained: i32, total: i32) -> Decimal {
        if total <= 0 {
            return Decimal::new(0, 2);
        }
        let mut pct =
            (Decimal::from(obtained) * Decimal::from(100) / Decimal::from(total)).round_dp(2);
        pct.rescale(2);
        pct
    }

    fn is_correct(question: &Question, answer: &AnswerValue) -> bool {
        match (question.question_type, &question.correct_answer, answer) {
            (QuestionType::Mcq, AnswerValue::One(key), AnswerValue::One(given)) => key == given,
            (QuestionType::Msq, AnswerValue::Many(key), AnswerValue::Many(given)) => {
                Self::set_eq(key, given)
            }
            (QuestionType::Nat, AnswerValue::One(key), AnswerValue::One(given)) => {
                Self::nat_matches(key, given)
            }
            // Shape mismatch scores zero, never errors.
            _ => false,
        }
    }

    /// Exact set equality, insensitive to order and duplicates.
    /// No partial credit for proper subsets.
    fn set_eq(a: &[String], b: &[String]) -> bool {
        let a: BTreeSet<&str> = a.iter().map(String::as_str).collect();
        let b: BTreeSet<&str> = b.iter().map(String::as_str).collect();
        a == b
    }

    /// Numeric equality when both sides parse as numbers ("2" == "2.0"),
    /// otherwise exact string equality. Both sides are trimmed first.
    fn nat_matches(expected: &str, given: &str) -> bool {
        let expected = expected.trim();
        let given = given.trim();
        match (expected.parse::<f64>(), given.parse::<f64>()) {
            (Ok(e), Ok(g)) => e == g,
            _ => expected == given,
        }
    }
}
