use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use validator::Validate;

use crate::dto::auth_dto::{
    FacultyAuthResponse, FacultyLoginRequest, RegisterFacultyRequest, RegisterStudentRequest,
    StudentAuthResponse, StudentLoginRequest,
};
use crate::error::Result;
use crate::utils::jwt::issue_token;
use crate::AppState;

#[axum::debug_handler]
pub async fn register_student(
    State(state): State<AppState>,
    Json(payload): Json<RegisterStudentRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let student = state.auth_service.register_student(payload).await?;
    let token = issue_token(student.id, "student")?;
    Ok((
        StatusCode::CREATED,
        Json(StudentAuthResponse { token, student }),
    ))
}

#[axum::debug_handler]
pub async fn login_student(
    State(state): State<AppState>,
    Json(payload): Json<StudentLoginRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let (student, token) = state.auth_service.login_student(payload).await?;
    Ok(Json(StudentAuthResponse { token, student }))
}

#[axum::debug_handler]
pub async fn register_faculty(
    State(state): State<AppState>,
    Json(payload): Json<RegisterFacultyRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let faculty = state.auth_service.register_faculty(payload).await?;
    let token = issue_token(faculty.id, "faculty")?;
    Ok((
        StatusCode::CREATED,
        Json(FacultyAuthResponse { token, faculty }),
    ))
}

#[axum::debug_handler]
pub async fn login_faculty(
    State(state): State<AppState>,
    Json(payload): Json<FacultyLoginRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let (faculty, token) = state.auth_service.login_faculty(payload).await?;
    Ok(Json(FacultyAuthResponse { token, faculty }))
}
