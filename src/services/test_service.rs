use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::dto::faculty_dto::{CreateTestPayload, ImportQuestionsPayload, UpdateTestPayload};
use crate::error::{Error, Result};
use crate::models::attempt::AttemptStatus;
use crate::models::question::{AnswerValue, Question, QuestionType};
use crate::models::test::TestDefinition;

/// Renumber a bank 1..n in submitted order. Ids are positional within a
/// test and never reused, which keeps the stored answers map stable.
pub fn assign_question_ids(questions: &mut [Question]) {
    assign_question_ids_from(questions, 1);
}

pub fn assign_question_ids_from(questions: &mut [Question], start: i32) {
    for (offset, question) in questions.iter_mut().enumerate() {
        question.id = start + offset as i32;
    }
}

pub fn bank_total_marks(questions: &[Question]) -> i32 {
    questions.iter().map(|q| q.marks).sum()
}

/// Authoring-time checks on a question bank. Runs after ids are assigned so
/// messages can point at the offending question.
pub fn validate_question_bank(questions: &[Question]) -> Result<()> {
    if questions.is_empty() {
        return Err(Error::BadRequest(
            "A test needs at least one question".to_string(),
        ));
    }
    for q in questions {
        if q.text.trim().is_empty() {
            return Err(Error::BadRequest(format!("Question {} has empty text", q.id)));
        }
        if q.marks < 1 {
            return Err(Error::BadRequest(format!(
                "Question {} must be worth at least one mark",
                q.id
            )));
        }
        if !q.correct_answer.conforms_to(q.question_type) {
            return Err(Error::BadRequest(format!(
                "Question {} answer key does not match its {} shape",
                q.id,
                q.question_type.as_str()
            )));
        }
        match q.question_type {
            QuestionType::Mcq | QuestionType::Msq => {
                if q.options.len() < 2 {
                    return Err(Error::BadRequest(format!(
                        "Question {} needs at least two options",
                        q.id
                    )));
                }
                if q.options.iter().any(|o| o.trim().is_empty()) {
                    return Err(Error::BadRequest(format!(
                        "Question {} has a blank option",
                        q.id
                    )));
                }
                let distinct: BTreeSet<&str> = q.options.iter().map(|s| s.as_str()).collect();
                if distinct.len() != q.options.len() {
                    return Err(Error::BadRequest(format!(
                        "Question {} has duplicate options",
                        q.id
                    )));
                }
                match &q.correct_answer {
                    AnswerValue::One(key) => {
                        if !q.options.contains(key) {
                            return Err(Error::BadRequest(format!(
                                "Question {} answer key is not one of its options",
                                q.id
                            )));
                        }
                    }
                    AnswerValue::Many(keys) => {
                        if keys.is_empty() {
                            return Err(Error::BadRequest(format!(
                                "Question {} needs at least one correct option",
                                q.id
                            )));
                        }
                        if keys.iter().any(|k| !q.options.contains(k)) {
                            return Err(Error::BadRequest(format!(
                                "Question {} answer key lists an unknown option",
                                q.id
                            )));
                        }
                    }
                }
            }
            QuestionType::Nat => {
                if !q.options.is_empty() {
                    return Err(Error::BadRequest(format!(
                        "Question {} is numerical and cannot have options",
                        q.id
                    )));
                }
                if let AnswerValue::One(key) = &q.correct_answer {
                    if key.trim().is_empty() {
                        return Err(Error::BadRequest(format!(
                            "Question {} needs an answer key",
                            q.id
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

/// A page of tests for the faculty dashboard.
#[derive(Debug, Serialize)]
pub struct PaginatedTests {
    pub tests: Vec<TestDefinition>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

/// Catalogue row for a student: the test plus where they stand on it.
/// The answer key never leaves the tests table here.
#[derive(Debug, Serialize, FromRow)]
pub struct AvailableTest {
    pub id: Uuid,
    pub title: String,
    pub instructions: Option<String>,
    pub class_name: String,
    pub duration_minutes: i32,
    pub total_marks: i32,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub question_count: i32,
    pub attempt_id: Option<Uuid>,
    pub attempt_status: Option<AttemptStatus>,
}

#[derive(Clone)]
pub struct TestService {
    pool: PgPool,
}

impl TestService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, test_id: Uuid) -> Result<TestDefinition> {
        sqlx::query_as::<_, TestDefinition>("SELECT * FROM tests WHERE id = $1")
            .bind(test_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Test not found".to_string()))
    }

    /// Fetch a test the given faculty member created. Tests owned by someone
    /// else are reported as missing rather than forbidden.
    pub async fn get_owned(&self, test_id: Uuid, faculty_id: Uuid) -> Result<TestDefinition> {
        let test = self.get(test_id).await?;
        if test.created_by != faculty_id {
            return Err(Error::NotFound("Test not found".to_string()));
        }
        Ok(test)
    }

    /// Fetch a test for a student preview. Tests assigned to another class
    /// are reported as missing.
    pub async fn get_for_student(&self, test_id: Uuid, student_id: Uuid) -> Result<TestDefinition> {
        let test = self.get(test_id).await?;
        let class_name: String =
            sqlx::query_scalar("SELECT class_name FROM students WHERE id = $1")
                .bind(student_id)
                .fetch_one(&self.pool)
                .await?;
        if test.class_name != class_name {
            return Err(Error::NotFound("Test not found".to_string()));
        }
        Ok(test)
    }

    async fn attempt_count(&self, test_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attempts WHERE test_id = $1")
            .bind(test_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Create a test with its full question bank. Ids are assigned here and
    /// `total_marks` is derived from the bank; a declared total that
    /// disagrees is rejected rather than silently overwritten.
    pub async fn create(&self, created_by: Uuid, payload: CreateTestPayload) -> Result<TestDefinition> {
        let mut questions = payload.questions;
        assign_question_ids(&mut questions);
        validate_question_bank(&questions)?;

        let total = bank_total_marks(&questions);
        if let Some(declared) = payload.total_marks {
            if declared != total {
                return Err(Error::BadRequest(format!(
                    "Declared total of {} does not match the question bank total of {}",
                    declared, total
                )));
            }
        }

        let test = sqlx::query_as::<_, TestDefinition>(
            r#"
            INSERT INTO tests (title, instructions, class_name, duration_minutes,
                               total_marks, scheduled_start, questions, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(&payload.title)
        .bind(&payload.instructions)
        .bind(&payload.class_name)
        .bind(payload.duration_minutes)
        .bind(total)
        .bind(payload.scheduled_start)
        .bind(serde_json::to_value(&questions)?)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            test_id = %test.id,
            class_name = %test.class_name,
            questions = questions.len(),
            total_marks = total,
            "Test created"
        );
        Ok(test)
    }

    pub async fn list_for_faculty(
        &self,
        faculty_id: Uuid,
        page: Option<i64>,
        per_page: Option<i64>,
    ) -> Result<PaginatedTests> {
        let page = page.unwrap_or(1).max(1);
        let per_page = per_page.unwrap_or(20).clamp(1, 100);

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tests WHERE created_by = $1")
            .bind(faculty_id)
            .fetch_one(&self.pool)
            .await?;

        let tests = sqlx::query_as::<_, TestDefinition>(
            r#"
            SELECT * FROM tests
            WHERE created_by = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(faculty_id)
        .bind(per_page)
        .bind((page - 1) * per_page)
        .fetch_all(&self.pool)
        .await?;

        Ok(PaginatedTests {
            tests,
            total,
            page,
            per_page,
            total_pages: (total + per_page - 1) / per_page,
        })
    }

    /// Tests a student can see: their class, window not yet over, joined
    /// with their own attempt so the UI can show resume/done states.
    pub async fn list_available_for_student(&self, student_id: Uuid) -> Result<Vec<AvailableTest>> {
        let tests = sqlx::query_as::<_, AvailableTest>(
            r#"
            SELECT t.id, t.title, t.instructions, t.class_name, t.duration_minutes,
                   t.total_marks, t.scheduled_start,
                   jsonb_array_length(t.questions) AS question_count,
                   a.id AS attempt_id, a.status AS attempt_status
            FROM tests t
            LEFT JOIN attempts a ON a.test_id = t.id AND a.student_id = $1
            WHERE t.class_name = (SELECT class_name FROM students WHERE id = $1)
              AND (t.scheduled_start IS NULL
                   OR t.scheduled_start + make_interval(mins => t.duration_minutes) > NOW())
            ORDER BY t.scheduled_start ASC NULLS LAST, t.created_at DESC
            "#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tests)
    }

    /// Partial update. The whole definition is frozen once anyone has
    /// started an attempt; scores must stay explainable against the test
    /// the student actually saw.
    pub async fn update(
        &self,
        test_id: Uuid,
        faculty_id: Uuid,
        payload: UpdateTestPayload,
    ) -> Result<TestDefinition> {
        self.get_owned(test_id, faculty_id).await?;

        if self.attempt_count(test_id).await? > 0 {
            return Err(Error::InvalidState(
                "This test already has attempts and can no longer be edited".to_string(),
            ));
        }

        let (questions_json, total) = match payload.questions {
            Some(mut questions) => {
                assign_question_ids(&mut questions);
                validate_question_bank(&questions)?;
                let total = bank_total_marks(&questions);
                (Some(serde_json::to_value(&questions)?), Some(total))
            }
            None => (None, None),
        };

        let test = sqlx::query_as::<_, TestDefinition>(
            r#"
            UPDATE tests
            SET title = COALESCE($2, title),
                instructions = COALESCE($3, instructions),
                class_name = COALESCE($4, class_name),
                duration_minutes = COALESCE($5, duration_minutes),
                scheduled_start = COALESCE($6, scheduled_start),
                questions = COALESCE($7, questions),
                total_marks = COALESCE($8, total_marks),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(test_id)
        .bind(&payload.title)
        .bind(&payload.instructions)
        .bind(&payload.class_name)
        .bind(payload.duration_minutes)
        .bind(payload.scheduled_start)
        .bind(questions_json)
        .bind(total)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(test_id = %test.id, "Test updated");
        Ok(test)
    }

    /// Append questions to an existing bank. New questions continue the id
    /// sequence so previously saved answers keep their keys.
    pub async fn import_questions(
        &self,
        test_id: Uuid,
        faculty_id: Uuid,
        payload: ImportQuestionsPayload,
    ) -> Result<TestDefinition> {
        let test = self.get_owned(test_id, faculty_id).await?;
        if self.attempt_count(test_id).await? > 0 {
            return Err(Error::InvalidState(
                "This test already has attempts; its questions can no longer change".to_string(),
            ));
        }

        let mut bank = test.question_bank()?;
        let next_id = bank.iter().map(|q| q.id).max().unwrap_or(0) + 1;

        let mut incoming = payload.questions;
        assign_question_ids_from(&mut incoming, next_id);
        bank.extend(incoming);
        validate_question_bank(&bank)?;

        let total = bank_total_marks(&bank);
        let test = sqlx::query_as::<_, TestDefinition>(
            r#"
            UPDATE tests
            SET questions = $2, total_marks = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(test_id)
        .bind(serde_json::to_value(&bank)?)
        .bind(total)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            test_id = %test.id,
            questions = bank.len(),
            total_marks = total,
            "Questions imported"
        );
        Ok(test)
    }

    /// Delete a test that nobody has attempted. Attempt history is kept by
    /// refusing the delete instead of cascading over it.
    pub async fn delete(&self, test_id: Uuid, faculty_id: Uuid) -> Result<()> {
        self.get_owned(test_id, faculty_id).await?;
        if self.attempt_count(test_id).await? > 0 {
            return Err(Error::InvalidState(
                "This test already has attempts and cannot be deleted".to_string(),
            ));
        }

        sqlx::query("DELETE FROM tests WHERE id = $1")
            .bind(test_id)
            .execute(&self.pool)
            .await?;
        tracing::info!(test_id = %test_id, "Test deleted");
        Ok(())
    }
}
