use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::faculty_dto::{
        CreateTestPayload, ImportQuestionsPayload, TestListQuery, UpdateTestPayload,
    },
    error::Result,
    middleware::auth::Claims,
    models::test::TestDefinition,
    services::export_service::ExportService,
    services::test_service::PaginatedTests,
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/faculty/tests",
    request_body = CreateTestPayload,
    responses(
        (status = 201, description = "Test created successfully", body = Json<TestDefinition>),
        (status = 400, description = "Invalid payload or question bank")
    )
)]
#[axum::debug_handler]
pub async fn create_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateTestPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let faculty_id = claims.subject_id()?;
    let test = state.test_service.create(faculty_id, payload).await?;
    Ok((StatusCode::CREATED, Json(test)))
}

#[utoipa::path(
    get,
    path = "/api/faculty/tests",
    params(
        ("page" = Option<i64>, Query, description = "Page number"),
        ("per_page" = Option<i64>, Query, description = "Items per page")
    ),
    responses(
        (status = 200, description = "Paginated list of own tests", body = Json<PaginatedTests>)
    )
)]
#[axum::debug_handler]
pub async fn list_tests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<TestListQuery>,
) -> Result<impl IntoResponse> {
    let faculty_id = claims.subject_id()?;
    let result = state
        .test_service
        .list_for_faculty(faculty_id, query.page, query.per_page)
        .await?;
    Ok(Json(result))
}

#[utoipa::path(
    get,
    path = "/api/faculty/tests/{id}",
    params(
        ("id" = Uuid, Path, description = "Test ID")
    ),
    responses(
        (status = 200, description = "Test found", body = Json<TestDefinition>),
        (status = 404, description = "Test not found")
    )
)]
#[axum::debug_handler]
pub async fn get_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let faculty_id = claims.subject_id()?;
    let test = state.test_service.get_owned(test_id, faculty_id).await?;
    Ok(Json(test))
}

#[utoipa::path(
    patch,
    path = "/api/faculty/tests/{id}",
    params(
        ("id" = Uuid, Path, description = "Test ID")
    ),
    request_body = UpdateTestPayload,
    responses(
        (status = 200, description = "Test updated successfully", body = Json<TestDefinition>),
        (status = 404, description = "Test not found"),
        (status = 409, description = "Test already has attempts")
    )
)]
#[axum::debug_handler]
pub async fn update_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<Uuid>,
    Json(payload): Json<UpdateTestPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let faculty_id = claims.subject_id()?;
    let test = state
        .test_service
        .update(test_id, faculty_id, payload)
        .await?;
    Ok(Json(test))
}

#[utoipa::path(
    delete,
    path = "/api/faculty/tests/{id}",
    params(
        ("id" = Uuid, Path, description = "Test ID")
    ),
    responses(
        (status = 204, description = "Test deleted successfully"),
        (status = 404, description = "Test not found"),
        (status = 409, description = "Test already has attempts")
    )
)]
#[axum::debug_handler]
pub async fn delete_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let faculty_id = claims.subject_id()?;
    state.test_service.delete(test_id, faculty_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn import_questions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<Uuid>,
    Json(payload): Json<ImportQuestionsPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let faculty_id = claims.subject_id()?;
    let test = state
        .test_service
        .import_questions(test_id, faculty_id, payload)
        .await?;
    Ok(Json(test))
}

#[axum::debug_handler]
pub async fn list_attempts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let faculty_id = claims.subject_id()?;
    state.test_service.get_owned(test_id, faculty_id).await?;
    let attempts = state.attempt_service.list_for_test(test_id).await?;
    Ok(Json(attempts))
}

#[axum::debug_handler]
pub async fn export_results(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let faculty_id = claims.subject_id()?;
    let test = state.test_service.get_owned(test_id, faculty_id).await?;
    let rows = state.result_service.export_rows(test_id).await?;

    let buffer = ExportService::generate_results_xlsx(&test, &rows)?;

    let filename = format!(
        "results_{}_{}.xlsx",
        test.title.replace(' ', "_"),
        Utc::now().format("%Y%m%d")
    );
    let disposition = format!("attachment; filename=\"{}\"", filename);

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string(),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        buffer,
    ))
}

#[axum::debug_handler]
pub async fn list_attempt_events(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let faculty_id = claims.subject_id()?;
    let events = state
        .attempt_service
        .list_events_for_faculty(attempt_id, faculty_id)
        .await?;
    Ok(Json(events))
}
