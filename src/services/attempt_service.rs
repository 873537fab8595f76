use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::{FromRow, PgPool};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::attempt::{Attempt, AttemptStatus};
use crate::models::proctor_event::{ProctorEvent, ProctorEventKind};
use crate::models::question::{AnswerValue, Question};
use crate::models::score::{QuestionScore, ScoreResult};
use crate::models::test::TestDefinition;
use crate::services::scoring_service::ScoringService;

/// Seconds past the nominal deadline during which an open attempt is still
/// writable. Covers a final submission that leaves the browser right at the
/// buzzer. Must stay below the sweep interval so overdue attempts cannot
/// linger a full extra cycle.
pub const SUBMIT_GRACE_SECONDS: i64 = 30;

pub fn deadline(started_at: DateTime<Utc>, duration_minutes: i32) -> DateTime<Utc> {
    started_at + Duration::minutes(duration_minutes as i64)
}

/// Seconds left on the clock, clamped at zero once the deadline has passed.
pub fn time_remaining_seconds(
    started_at: DateTime<Utc>,
    duration_minutes: i32,
    now: DateTime<Utc>,
) -> i64 {
    (deadline(started_at, duration_minutes) - now)
        .num_seconds()
        .max(0)
}

/// Whether `now` is beyond the deadline plus the submission grace. Past this
/// point the attempt is overdue and any read path may finalize it.
pub fn past_grace(started_at: DateTime<Utc>, duration_minutes: i32, now: DateTime<Utc>) -> bool {
    now > deadline(started_at, duration_minutes) + Duration::seconds(SUBMIT_GRACE_SECONDS)
}

/// A scheduled test only admits starts inside
/// `[scheduled_start, scheduled_start + duration]`, boundaries included.
/// Unscheduled tests are always open.
pub fn window_open(
    scheduled_start: Option<DateTime<Utc>>,
    duration_minutes: i32,
    now: DateTime<Utc>,
) -> bool {
    match scheduled_start {
        None => true,
        Some(start) => now >= start && now <= deadline(start, duration_minutes),
    }
}

/// Shape-check one submission entry against the question bank.
pub fn validate_answer(questions: &[Question], question_id: i32, answer: &AnswerValue) -> Result<()> {
    let Some(question) = questions.iter().find(|q| q.id == question_id) else {
        return Err(Error::NotFound(format!(
            "Question {} is not part of this test",
            question_id
        )));
    };
    if !answer.conforms_to(question.question_type) {
        return Err(Error::BadRequest(format!(
            "Answer for question {} does not match its {} shape",
            question_id,
            question.question_type.as_str()
        )));
    }
    Ok(())
}

/// Overlay a final submission payload onto previously saved answers.
/// Every incoming entry is validated; incoming values win per question.
pub fn merge_answers(
    questions: &[Question],
    stored: &mut BTreeMap<i32, AnswerValue>,
    incoming: &BTreeMap<i32, AnswerValue>,
) -> Result<()> {
    for (question_id, answer) in incoming {
        validate_answer(questions, *question_id, answer)?;
        stored.insert(*question_id, answer.clone());
    }
    Ok(())
}

/// Rebuild the score summary persisted on a terminal attempt, so repeated
/// submits and result reads return exactly what grading stored.
pub fn stored_score_result(attempt: &Attempt) -> Result<ScoreResult> {
    let graded = attempt.graded.clone().ok_or_else(|| {
        Error::Internal(format!(
            "Attempt {} is terminal but carries no grading",
            attempt.id
        ))
    })?;
    let breakdown: Vec<QuestionScore> = serde_json::from_value(graded)
        .map_err(|e| Error::Internal(format!("Corrupt grading on attempt {}: {}", attempt.id, e)))?;
    Ok(ScoreResult {
        total_marks: breakdown.iter().map(|b| b.marks_available).sum(),
        marks_obtained: attempt.marks_obtained.unwrap_or(0),
        percentage: attempt.percentage.unwrap_or(Decimal::new(0, 2)),
        breakdown,
    })
}

/// One attempt row joined with the student who owns it, for faculty views.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AttemptOverview {
    pub id: Uuid,
    pub student_id: Uuid,
    pub student_name: String,
    pub roll_no: String,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub marks_obtained: Option<i32>,
    pub percentage: Option<Decimal>,
    pub submitted_late: bool,
}

/// Drives the attempt lifecycle: starting, answer capture, submission,
/// expiry and result reads. Every write that finalizes an attempt is guarded
/// by a conditional update on `status = 'in_progress'`, so of any concurrent
/// submit/expire pair exactly one lands and the loser adopts its outcome.
#[derive(Clone)]
pub struct AttemptService {
    pool: PgPool,
}

impl AttemptService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_attempt(&self, attempt_id: Uuid) -> Result<Attempt> {
        sqlx::query_as::<_, Attempt>("SELECT * FROM attempts WHERE id = $1")
            .bind(attempt_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Attempt not found".to_string()))
    }

    /// Ownership check folded into the lookup: someone else's attempt id is
    /// indistinguishable from a missing one.
    async fn fetch_attempt_for_student(&self, attempt_id: Uuid, student_id: Uuid) -> Result<Attempt> {
        let attempt = self.fetch_attempt(attempt_id).await?;
        if attempt.student_id != student_id {
            return Err(Error::NotFound("Attempt not found".to_string()));
        }
        Ok(attempt)
    }

    async fn fetch_test(&self, test_id: Uuid) -> Result<TestDefinition> {
        sqlx::query_as::<_, TestDefinition>("SELECT * FROM tests WHERE id = $1")
            .bind(test_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Test not found".to_string()))
    }

    async fn find_attempt(&self, student_id: Uuid, test_id: Uuid) -> Result<Option<Attempt>> {
        let attempt = sqlx::query_as::<_, Attempt>(
            "SELECT * FROM attempts WHERE student_id = $1 AND test_id = $2",
        )
        .bind(student_id)
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    /// Start a test for a student, or resume their open attempt.
    ///
    /// The unique (student, test) constraint makes this race-safe: the insert
    /// uses `ON CONFLICT DO NOTHING` and a conflicting start re-reads the
    /// winner's row, so concurrent starts converge on one attempt.
    pub async fn start(&self, student_id: Uuid, test_id: Uuid) -> Result<(Attempt, TestDefinition)> {
        let test = self.fetch_test(test_id).await?;
        let now = Utc::now();

        let class_name: Option<String> =
            sqlx::query_scalar("SELECT class_name FROM students WHERE id = $1")
                .bind(student_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(class_name) = class_name else {
            return Err(Error::NotFound("Student not found".to_string()));
        };
        // Tests for another class are invisible, same as the preview path.
        if class_name != test.class_name {
            return Err(Error::NotFound("Test not found".to_string()));
        }
        if !window_open(test.scheduled_start, test.duration_minutes, now) {
            return Err(Error::NotAvailable(
                "This test is not open for attempts right now".to_string(),
            ));
        }

        if let Some(existing) = self.find_attempt(student_id, test_id).await? {
            let attempt = self.resume_or_reject(existing, &test, now).await?;
            return Ok((attempt, test));
        }

        let inserted = sqlx::query_as::<_, Attempt>(
            r#"
            INSERT INTO attempts (test_id, student_id, started_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (student_id, test_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(test_id)
        .bind(student_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(attempt) => {
                tracing::info!(
                    attempt_id = %attempt.id,
                    test_id = %test_id,
                    student_id = %student_id,
                    "Attempt started"
                );
                Ok((attempt, test))
            }
            None => {
                let existing = self.find_attempt(student_id, test_id).await?.ok_or_else(|| {
                    Error::Internal("Attempt insert conflicted but no row exists".to_string())
                })?;
                let attempt = self.resume_or_reject(existing, &test, now).await?;
                Ok((attempt, test))
            }
        }
    }

    /// Open attempts resume; overdue ones get expired on the spot; terminal
    /// ones refuse a second go.
    async fn resume_or_reject(
        &self,
        attempt: Attempt,
        test: &TestDefinition,
        now: DateTime<Utc>,
    ) -> Result<Attempt> {
        let attempt = self.finalize_if_overdue(attempt, test, now).await?;
        if attempt.status.is_terminal() {
            return Err(Error::AlreadyAttempted(
                "This test has already been attempted".to_string(),
            ));
        }
        Ok(attempt)
    }

    /// Lazy deadline enforcement on read paths: an open attempt past its
    /// grace is expired before the caller sees it.
    async fn finalize_if_overdue(
        &self,
        attempt: Attempt,
        test: &TestDefinition,
        now: DateTime<Utc>,
    ) -> Result<Attempt> {
        if attempt.status == AttemptStatus::InProgress
            && past_grace(attempt.started_at, test.duration_minutes, now)
        {
            let (expired, _) = self.expire(attempt.id).await?;
            return Ok(expired);
        }
        Ok(attempt)
    }

    /// Upsert one answer on an open attempt. Returns the server timestamp of
    /// the save, which the autosave UI echoes back.
    pub async fn record_answer(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        question_id: i32,
        answer: AnswerValue,
    ) -> Result<DateTime<Utc>> {
        let attempt = self.fetch_attempt_for_student(attempt_id, student_id).await?;
        let test = self.fetch_test(attempt.test_id).await?;
        let now = Utc::now();

        let attempt = self.finalize_if_overdue(attempt, &test, now).await?;
        if attempt.status != AttemptStatus::InProgress {
            return Err(Error::InvalidState(
                "This attempt is no longer in progress".to_string(),
            ));
        }

        let questions = test.question_bank()?;
        validate_answer(&questions, question_id, &answer)?;

        // Status guard again at write time; a sweep can land between the
        // read above and this update.
        let result = sqlx::query(
            r#"
            UPDATE attempts
            SET answers = jsonb_set(answers, ARRAY[$2::text], $3, true), updated_at = NOW()
            WHERE id = $1 AND status = 'in_progress'
            "#,
        )
        .bind(attempt_id)
        .bind(question_id.to_string())
        .bind(serde_json::to_value(&answer)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::InvalidState(
                "This attempt is no longer in progress".to_string(),
            ));
        }
        Ok(now)
    }

    /// Submit an attempt and grade it.
    ///
    /// A terminal attempt short-circuits to its stored result, so retries and
    /// double-clicks are harmless. An open attempt is always accepted, however
    /// late; past the grace it is merely flagged `submitted_late`. If an expiry
    /// finalizes the row first, the freshly computed score is discarded and the
    /// stored outcome returned instead.
    pub async fn submit(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        final_answers: Option<BTreeMap<i32, AnswerValue>>,
    ) -> Result<(Attempt, ScoreResult)> {
        let attempt = self.fetch_attempt_for_student(attempt_id, student_id).await?;
        if attempt.status.is_terminal() {
            let result = stored_score_result(&attempt)?;
            return Ok((attempt, result));
        }

        let test = self.fetch_test(attempt.test_id).await?;
        let questions = test.question_bank()?;
        let mut answers = attempt.answer_map()?;
        if let Some(incoming) = &final_answers {
            merge_answers(&questions, &mut answers, incoming)?;
        }

        let now = Utc::now();
        let late = past_grace(attempt.started_at, test.duration_minutes, now);
        let result = ScoringService::score(&questions, &answers);

        let updated = sqlx::query_as::<_, Attempt>(
            r#"
            UPDATE attempts
            SET status = 'completed', completed_at = $2, answers = $3,
                marks_obtained = $4, percentage = $5, graded = $6,
                submitted_late = $7, updated_at = NOW()
            WHERE id = $1 AND status = 'in_progress'
            RETURNING *
            "#,
        )
        .bind(attempt_id)
        .bind(now)
        .bind(serde_json::to_value(&answers)?)
        .bind(result.marks_obtained)
        .bind(result.percentage)
        .bind(serde_json::to_value(&result.breakdown)?)
        .bind(late)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(attempt) => {
                tracing::info!(
                    attempt_id = %attempt.id,
                    marks_obtained = result.marks_obtained,
                    total_marks = result.total_marks,
                    submitted_late = late,
                    "Attempt submitted"
                );
                Ok((attempt, result))
            }
            None => {
                let attempt = self.fetch_attempt(attempt_id).await?;
                let result = stored_score_result(&attempt)?;
                Ok((attempt, result))
            }
        }
    }

    /// Finalize an overdue attempt as expired, grading whatever answers were
    /// saved. `completed_at` is pinned to the nominal deadline, not the sweep
    /// time, so stored durations never exceed the test length. Idempotent:
    /// a terminal attempt just returns its stored outcome.
    pub async fn expire(&self, attempt_id: Uuid) -> Result<(Attempt, ScoreResult)> {
        let attempt = self.fetch_attempt(attempt_id).await?;
        if attempt.status.is_terminal() {
            let result = stored_score_result(&attempt)?;
            return Ok((attempt, result));
        }

        let test = self.fetch_test(attempt.test_id).await?;
        let questions = test.question_bank()?;
        let answers = attempt.answer_map()?;
        let result = ScoringService::score(&questions, &answers);
        let cutoff = deadline(attempt.started_at, test.duration_minutes);

        let updated = sqlx::query_as::<_, Attempt>(
            r#"
            UPDATE attempts
            SET status = 'expired', completed_at = $2,
                marks_obtained = $3, percentage = $4, graded = $5, updated_at = NOW()
            WHERE id = $1 AND status = 'in_progress'
            RETURNING *
            "#,
        )
        .bind(attempt_id)
        .bind(cutoff)
        .bind(result.marks_obtained)
        .bind(result.percentage)
        .bind(serde_json::to_value(&result.breakdown)?)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(attempt) => {
                tracing::info!(
                    attempt_id = %attempt.id,
                    marks_obtained = result.marks_obtained,
                    "Attempt expired"
                );
                Ok((attempt, result))
            }
            None => {
                let attempt = self.fetch_attempt(attempt_id).await?;
                let result = stored_score_result(&attempt)?;
                Ok((attempt, result))
            }
        }
    }

    /// Live view of an attempt for the test-taking UI. Reading an overdue
    /// attempt finalizes it first, so the clock never goes negative and a
    /// stale tab learns its fate on the next poll.
    pub async fn status(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
    ) -> Result<(Attempt, TestDefinition)> {
        let attempt = self.fetch_attempt_for_student(attempt_id, student_id).await?;
        let test = self.fetch_test(attempt.test_id).await?;
        let attempt = self.finalize_if_overdue(attempt, &test, Utc::now()).await?;
        Ok((attempt, test))
    }

    /// Graded outcome of a finished attempt. Open attempts within their
    /// deadline are not yet readable.
    pub async fn result(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
    ) -> Result<(Attempt, ScoreResult)> {
        let attempt = self.fetch_attempt_for_student(attempt_id, student_id).await?;
        let test = self.fetch_test(attempt.test_id).await?;
        let attempt = self.finalize_if_overdue(attempt, &test, Utc::now()).await?;
        if !attempt.status.is_terminal() {
            return Err(Error::NotReady(
                "This attempt has not been submitted yet".to_string(),
            ));
        }
        let result = stored_score_result(&attempt)?;
        Ok((attempt, result))
    }

    /// One pass of the expiry watchdog: finalize every open attempt whose
    /// deadline plus grace has passed. Returns how many were expired.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let overdue: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT a.id
            FROM attempts a
            JOIN tests t ON a.test_id = t.id
            WHERE a.status = 'in_progress'
              AND a.started_at + make_interval(mins => t.duration_minutes, secs => $2) < $1
            "#,
        )
        .bind(now)
        .bind(SUBMIT_GRACE_SECONDS as f64)
        .fetch_all(&self.pool)
        .await?;

        let mut expired = 0u64;
        for attempt_id in overdue {
            match self.expire(attempt_id).await {
                Ok(_) => expired += 1,
                Err(e) => {
                    tracing::error!(attempt_id = %attempt_id, error = ?e, "Failed to expire attempt")
                }
            }
        }
        if expired > 0 {
            tracing::info!(expired, "Expiry sweep finalized overdue attempts");
        }
        Ok(expired)
    }

    /// Append a proctoring event to an open attempt and bump the owning
    /// student's violation counter. Telemetry only: the attempt itself is
    /// never failed or closed because of it.
    pub async fn record_event(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        kind: ProctorEventKind,
        detail: Option<serde_json::Value>,
        ip_address: Option<IpNetwork>,
        user_agent: Option<String>,
    ) -> Result<i32> {
        let attempt = self.fetch_attempt_for_student(attempt_id, student_id).await?;
        if attempt.status != AttemptStatus::InProgress {
            return Err(Error::InvalidState(
                "This attempt is no longer in progress".to_string(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO proctor_events (attempt_id, event_type, detail, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(attempt_id)
        .bind(kind.as_str())
        .bind(detail)
        .bind(ip_address)
        .bind(user_agent)
        .execute(&self.pool)
        .await?;

        let illegal_attempts: i32 = sqlx::query_scalar(
            r#"
            UPDATE students SET illegal_attempts = illegal_attempts + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING illegal_attempts
            "#,
        )
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::warn!(
            attempt_id = %attempt_id,
            student_id = %student_id,
            event = kind.as_str(),
            illegal_attempts,
            "Proctor event recorded"
        );
        Ok(illegal_attempts)
    }

    /// Full proctoring trail of an attempt, oldest first. Faculty view.
    pub async fn list_events_for_faculty(
        &self,
        attempt_id: Uuid,
        faculty_id: Uuid,
    ) -> Result<Vec<ProctorEvent>> {
        let owner: Option<Uuid> = sqlx::query_scalar(
            "SELECT t.created_by FROM attempts a JOIN tests t ON t.id = a.test_id WHERE a.id = $1",
        )
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await?;
        match owner {
            Some(id) if id == faculty_id => {}
            _ => return Err(Error::NotFound("Attempt not found".to_string())),
        }
        let events = sqlx::query_as::<_, ProctorEvent>(
            "SELECT * FROM proctor_events WHERE attempt_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    /// All attempts on a test with the students who made them, newest first.
    pub async fn list_for_test(&self, test_id: Uuid) -> Result<Vec<AttemptOverview>> {
        let rows = sqlx::query_as::<_, AttemptOverview>(
            r#"
            SELECT a.id, a.student_id, s.name AS student_name, s.roll_no,
                   a.status, a.started_at, a.completed_at,
                   a.marks_obtained, a.percentage, a.submitted_late
            FROM attempts a
            JOIN students s ON a.student_id = s.id
            WHERE a.test_id = $1
            ORDER BY a.started_at DESC
            "#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
