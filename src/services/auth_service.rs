use sqlx::PgPool;

use crate::dto::auth_dto::{
    FacultyLoginRequest, RegisterFacultyRequest, RegisterStudentRequest, StudentLoginRequest,
};
use crate::error::{Error, Result};
use crate::models::faculty::Faculty;
use crate::models::student::Student;
use crate::utils::crypto::{hash_password, verify_password};
use crate::utils::jwt::issue_token;

/// Account registration and login for both roles. Students sign in with
/// their roll number, faculty with email; both get a role-tagged bearer
/// token.
#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
}

impl AuthService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn register_student(&self, payload: RegisterStudentRequest) -> Result<Student> {
        let taken: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM students WHERE roll_no = $1 OR email = $2")
                .bind(&payload.roll_no)
                .bind(&payload.email)
                .fetch_one(&self.pool)
                .await?;
        if taken > 0 {
            return Err(Error::BadRequest(
                "A student with this roll number or email already exists".to_string(),
            ));
        }

        let password_hash = hash_password(&payload.password)?;
        let student = sqlx::query_as::<_, Student>(
            r#"
            INSERT INTO students (roll_no, name, class_name, email, phone, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&payload.roll_no)
        .bind(&payload.name)
        .bind(&payload.class_name)
        .bind(&payload.email)
        .bind(&payload.phone)
        .bind(&password_hash)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            student_id = %student.id,
            class_name = %student.class_name,
            "Student registered"
        );
        Ok(student)
    }

    pub async fn login_student(&self, payload: StudentLoginRequest) -> Result<(Student, String)> {
        let student =
            sqlx::query_as::<_, Student>("SELECT * FROM students WHERE roll_no = $1")
                .bind(&payload.roll_no)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| Error::Unauthorized("Invalid credentials".to_string()))?;

        if !verify_password(&payload.password, &student.password_hash)? {
            return Err(Error::Unauthorized("Invalid credentials".to_string()));
        }

        let token = issue_token(student.id, "student")?;
        Ok((student, token))
    }

    pub async fn register_faculty(&self, payload: RegisterFacultyRequest) -> Result<Faculty> {
        let taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM faculty WHERE email = $1")
            .bind(&payload.email)
            .fetch_one(&self.pool)
            .await?;
        if taken > 0 {
            return Err(Error::BadRequest(
                "A faculty account with this email already exists".to_string(),
            ));
        }

        let password_hash = hash_password(&payload.password)?;
        let faculty = sqlx::query_as::<_, Faculty>(
            r#"
            INSERT INTO faculty (name, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(&payload.name)
        .bind(&payload.email)
        .bind(&password_hash)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(faculty_id = %faculty.id, "Faculty registered");
        Ok(faculty)
    }

    pub async fn login_faculty(&self, payload: FacultyLoginRequest) -> Result<(Faculty, String)> {
        let faculty = sqlx::query_as::<_, Faculty>("SELECT * FROM faculty WHERE email = $1")
            .bind(&payload.email)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::Unauthorized("Invalid credentials".to_string()))?;

        if !verify_password(&payload.password, &faculty.password_hash)? {
            return Err(Error::Unauthorized("Invalid credentials".to_string()));
        }

        let token = issue_token(faculty.id, "faculty")?;
        Ok((faculty, token))
    }
}
