use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::attempt::AttemptStatus;

/// One leaderboard line. Rank is dense by position: ties on marks are
/// broken by earlier submission.
#[derive(Debug, Serialize, FromRow)]
pub struct LeaderboardEntry {
    #[sqlx(default)]
    pub rank: i64,
    pub student_name: String,
    pub roll_no: String,
    pub marks_obtained: i32,
    pub percentage: Decimal,
    pub completed_at: DateTime<Utc>,
    pub submitted_late: bool,
}

/// Per-question outcome counts across all graded attempts of a test.
#[derive(Debug, Serialize, FromRow)]
pub struct QuestionStat {
    pub question_id: i32,
    pub graded: i64,
    pub answered: i64,
    pub correct: i64,
}

#[derive(Debug, Serialize)]
pub struct TestAnalytics {
    pub test_id: Uuid,
    pub total_attempts: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub expired: i64,
    pub late_submissions: i64,
    pub average_percentage: Option<Decimal>,
    pub highest_percentage: Option<Decimal>,
    pub lowest_percentage: Option<Decimal>,
    pub questions: Vec<QuestionStat>,
}

/// Everything the spreadsheet export needs for one attempt.
#[derive(Debug, FromRow)]
pub struct ResultExportRow {
    pub student_name: String,
    pub roll_no: String,
    pub class_name: String,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub marks_obtained: Option<i32>,
    pub percentage: Option<Decimal>,
    pub submitted_late: bool,
    pub proctor_events: i64,
}

#[derive(FromRow)]
struct AnalyticsRow {
    total_attempts: i64,
    in_progress: i64,
    completed: i64,
    expired: i64,
    late_submissions: i64,
    average_percentage: Option<Decimal>,
    highest_percentage: Option<Decimal>,
    lowest_percentage: Option<Decimal>,
}

/// Read-side reporting over finished attempts: standings and aggregates.
/// Only terminal attempts count; open ones are invisible here.
#[derive(Clone)]
pub struct ResultService {
    pool: PgPool,
}

impl ResultService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn assert_test_exists(&self, test_id: Uuid) -> Result<()> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tests WHERE id = $1)")
            .bind(test_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(Error::NotFound("Test not found".to_string()));
        }
        Ok(())
    }

    pub async fn leaderboard(&self, test_id: Uuid) -> Result<Vec<LeaderboardEntry>> {
        self.assert_test_exists(test_id).await?;

        let mut entries = sqlx::query_as::<_, LeaderboardEntry>(
            r#"
            SELECT s.name AS student_name, s.roll_no,
                   COALESCE(a.marks_obtained, 0) AS marks_obtained,
                   COALESCE(a.percentage, 0) AS percentage,
                   COALESCE(a.completed_at, a.started_at) AS completed_at,
                   a.submitted_late
            FROM attempts a
            JOIN students s ON a.student_id = s.id
            WHERE a.test_id = $1 AND a.status IN ('completed', 'expired')
            ORDER BY a.marks_obtained DESC NULLS LAST, a.completed_at ASC
            "#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        for (index, entry) in entries.iter_mut().enumerate() {
            entry.rank = index as i64 + 1;
        }
        Ok(entries)
    }

    pub async fn analytics(&self, test_id: Uuid) -> Result<TestAnalytics> {
        self.assert_test_exists(test_id).await?;

        let row = sqlx::query_as::<_, AnalyticsRow>(
            r#"
            SELECT COUNT(*) AS total_attempts,
                   COUNT(*) FILTER (WHERE status = 'in_progress') AS in_progress,
                   COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                   COUNT(*) FILTER (WHERE status = 'expired') AS expired,
                   COUNT(*) FILTER (WHERE submitted_late) AS late_submissions,
                   ROUND(AVG(percentage) FILTER (WHERE status IN ('completed', 'expired')), 2)
                       AS average_percentage,
                   MAX(percentage) FILTER (WHERE status IN ('completed', 'expired'))
                       AS highest_percentage,
                   MIN(percentage) FILTER (WHERE status IN ('completed', 'expired'))
                       AS lowest_percentage
            FROM attempts
            WHERE test_id = $1
            "#,
        )
        .bind(test_id)
        .fetch_one(&self.pool)
        .await?;

        // Unnest the stored grading so question difficulty falls out of a
        // single group-by instead of re-scoring every attempt.
        let questions = sqlx::query_as::<_, QuestionStat>(
            r#"
            SELECT (g->>'question_id')::int AS question_id,
                   COUNT(*) AS graded,
                   COUNT(*) FILTER (WHERE (g->>'answered')::bool) AS answered,
                   COUNT(*) FILTER (WHERE (g->>'correct')::bool) AS correct
            FROM attempts a
            CROSS JOIN LATERAL jsonb_array_elements(a.graded) AS g
            WHERE a.test_id = $1 AND a.status IN ('completed', 'expired')
            GROUP BY 1
            ORDER BY 1
            "#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(TestAnalytics {
            test_id,
            total_attempts: row.total_attempts,
            in_progress: row.in_progress,
            completed: row.completed,
            expired: row.expired,
            late_submissions: row.late_submissions,
            average_percentage: row.average_percentage,
            highest_percentage: row.highest_percentage,
            lowest_percentage: row.lowest_percentage,
            questions,
        })
    }

    /// Rows for the xlsx export, leaderboard order, open attempts included.
    pub async fn export_rows(&self, test_id: Uuid) -> Result<Vec<ResultExportRow>> {
        let rows = sqlx::query_as::<_, ResultExportRow>(
            r#"
            SELECT s.name AS student_name, s.roll_no, s.class_name,
                   a.status, a.started_at, a.completed_at,
                   a.marks_obtained, a.percentage, a.submitted_late,
                   COALESCE(pe.events, 0) AS proctor_events
            FROM attempts a
            JOIN students s ON a.student_id = s.id
            LEFT JOIN (
                SELECT attempt_id, COUNT(*) AS events
                FROM proctor_events
                GROUP BY attempt_id
            ) pe ON pe.attempt_id = a.id
            WHERE a.test_id = $1
            ORDER BY a.marks_obtained DESC NULLS LAST, a.completed_at ASC
            "#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
