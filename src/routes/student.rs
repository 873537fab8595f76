use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use sqlx::types::ipnetwork::IpNetwork;
use std::net::IpAddr;
use uuid::Uuid;
use validator::Validate;

use crate::dto::student_dto::{
    AttemptResultResponse, AttemptStatusResponse, ProctorEventRequest, ProctorEventResponse,
    SaveAnswerRequest, SaveAnswerResponse, StartAttemptResponse, SubmitAttemptRequest,
    TestPreviewResponse,
};
use crate::error::Result;
use crate::middleware::auth::Claims;
use crate::models::question::SanitizedQuestion;
use crate::services::attempt_service::time_remaining_seconds;
use crate::AppState;

#[axum::debug_handler]
pub async fn list_tests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let student_id = claims.subject_id()?;
    let tests = state
        .test_service
        .list_available_for_student(student_id)
        .await?;
    Ok(Json(tests))
}

#[axum::debug_handler]
pub async fn get_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let student_id = claims.subject_id()?;
    let test = state.test_service.get_for_student(test_id, student_id).await?;
    Ok(Json(TestPreviewResponse::from_test(&test)?))
}

#[axum::debug_handler]
pub async fn start_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let student_id = claims.subject_id()?;
    let (attempt, test) = state.attempt_service.start(student_id, test_id).await?;

    let bank = test.question_bank()?;
    let remaining = if attempt.status.is_terminal() {
        0
    } else {
        time_remaining_seconds(attempt.started_at, test.duration_minutes, Utc::now())
    };
    Ok(Json(StartAttemptResponse {
        attempt_id: attempt.id,
        test_id: test.id,
        status: attempt.status,
        started_at: attempt.started_at,
        time_remaining_seconds: remaining,
        answers: attempt.answers,
        questions: bank.iter().map(SanitizedQuestion::from).collect(),
    }))
}

#[axum::debug_handler]
pub async fn attempt_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let student_id = claims.subject_id()?;
    let (attempt, test) = state.attempt_service.status(attempt_id, student_id).await?;

    let remaining = if attempt.status.is_terminal() {
        0
    } else {
        time_remaining_seconds(attempt.started_at, test.duration_minutes, Utc::now())
    };
    let answered = attempt.answer_map()?.len();
    let total = test.question_bank()?.len();
    Ok(Json(AttemptStatusResponse {
        attempt_id: attempt.id,
        test_id: attempt.test_id,
        status: attempt.status,
        started_at: attempt.started_at,
        completed_at: attempt.completed_at,
        time_remaining_seconds: remaining,
        questions_answered: answered,
        total_questions: total,
        submitted_late: attempt.submitted_late,
    }))
}

#[axum::debug_handler]
pub async fn save_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let student_id = claims.subject_id()?;
    let saved_at = state
        .attempt_service
        .record_answer(attempt_id, student_id, payload.question_id, payload.answer)
        .await?;
    Ok(Json(SaveAnswerResponse {
        saved: true,
        question_id: payload.question_id,
        saved_at,
    }))
}

/// The body is optional: a bare POST submits whatever answers were saved
/// incrementally, while a body with `answers` merges them in first.
#[axum::debug_handler]
pub async fn submit_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    payload: Option<Json<SubmitAttemptRequest>>,
) -> Result<impl IntoResponse> {
    let student_id = claims.subject_id()?;
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let (attempt, result) = state
        .attempt_service
        .submit(attempt_id, student_id, payload.answers)
        .await?;
    Ok(Json(AttemptResultResponse::new(&attempt, result)))
}

#[axum::debug_handler]
pub async fn attempt_result(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let student_id = claims.subject_id()?;
    let (attempt, result) = state.attempt_service.result(attempt_id, student_id).await?;
    Ok(Json(AttemptResultResponse::new(&attempt, result)))
}

#[axum::debug_handler]
pub async fn report_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<ProctorEventRequest>,
) -> Result<impl IntoResponse> {
    let student_id = claims.subject_id()?;
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
        .map(IpNetwork::from);
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let illegal_attempts = state
        .attempt_service
        .record_event(
            attempt_id,
            student_id,
            payload.event_type,
            payload.detail,
            ip_address,
            user_agent,
        )
        .await?;
    Ok(Json(ProctorEventResponse {
        recorded: true,
        illegal_attempts,
    }))
}
