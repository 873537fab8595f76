pub mod auth;
pub mod faculty;
pub mod health;
pub mod student;

use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::get_config;
use crate::middleware::auth::{require_bearer_auth, require_faculty, require_student};
use crate::middleware::rate_limit::{new_rps_state, rps_middleware};
use crate::AppState;

/// The full application router, including auth and rate-limit layers, so
/// integration tests exercise the same stack the binary serves.
pub fn router(state: AppState) -> Router {
    let config = get_config();

    let base_routes = Router::new().route("/health", get(health::health));

    let auth_api = Router::new()
        .route("/api/auth/student/register", post(auth::register_student))
        .route("/api/auth/student/login", post(auth::login_student))
        .route("/api/auth/faculty/register", post(auth::register_faculty))
        .route("/api/auth/faculty/login", post(auth::login_faculty))
        .layer(from_fn_with_state(
            new_rps_state(config.public_rps),
            rps_middleware,
        ));

    let student_api = Router::new()
        .route("/api/student/tests", get(student::list_tests))
        .route("/api/student/tests/:id", get(student::get_test))
        .route("/api/student/tests/:id/start", post(student::start_attempt))
        .route("/api/student/attempts/:id", get(student::attempt_status))
        .route(
            "/api/student/attempts/:id/answer",
            patch(student::save_answer),
        )
        .route(
            "/api/student/attempts/:id/submit",
            post(student::submit_attempt),
        )
        .route(
            "/api/student/attempts/:id/result",
            get(student::attempt_result),
        )
        .route(
            "/api/student/attempts/:id/events",
            post(student::report_event),
        )
        .layer(from_fn(require_student))
        .layer(from_fn_with_state(
            new_rps_state(config.api_rps),
            rps_middleware,
        ));

    let faculty_api = Router::new()
        .route(
            "/api/faculty/tests",
            get(faculty::list_tests).post(faculty::create_test),
        )
        .route(
            "/api/faculty/tests/:id",
            get(faculty::get_test)
                .patch(faculty::update_test)
                .delete(faculty::delete_test),
        )
        .route(
            "/api/faculty/tests/:id/questions",
            post(faculty::import_questions),
        )
        .route(
            "/api/faculty/tests/:id/attempts",
            get(faculty::list_attempts),
        )
        .route(
            "/api/faculty/tests/:id/export",
            get(faculty::export_results),
        )
        .route(
            "/api/faculty/attempts/:id/events",
            get(faculty::list_attempt_events),
        )
        .layer(from_fn(require_faculty))
        .layer(from_fn_with_state(
            new_rps_state(config.api_rps),
            rps_middleware,
        ));

    let reports_api = Router::new()
        .route("/api/tests/:id/leaderboard", get(tests::leaderboard))
        .route("/api/tests/:id/analytics", get(tests::analytics))
        .layer(from_fn(require_bearer_auth))
        .layer(from_fn_with_state(
            new_rps_state(config.api_rps),
            rps_middleware,
        ));

    base_routes
        .merge(auth_api)
        .merge(student_api)
        .merge(faculty_api)
        .merge(reports_api)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
}
