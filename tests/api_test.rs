use std::env;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;
use uuid::Uuid;

/// Spin up the full router against the database named by TEST_DATABASE_URL.
/// Without that variable the test is a no-op so the suite stays green on
/// machines with no Postgres.
async fn setup_app() -> Option<(Router, sqlx::PgPool)> {
    dotenvy::dotenv().ok();
    let Ok(db_url) = env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping API test");
        return None;
    };

    env::set_var("DATABASE_URL", &db_url);
    env::set_var("SERVER_ADDRESS", "127.0.0.1:0");
    env::set_var("JWT_SECRET", "test_secret_key");
    env::set_var("TOKEN_TTL_HOURS", "1");
    env::set_var("PUBLIC_RPS", "1000");
    env::set_var("API_RPS", "1000");

    // Several tests share the process; only the first init wins.
    aptitude_backend::config::init_config().ok();

    let pool = aptitude_backend::database::pool::create_pool()
        .await
        .expect("pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");

    let state = aptitude_backend::AppState::new(pool.clone());
    Some((aptitude_backend::routes::router(state), pool))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<JsonValue>,
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 4 * 1024 * 1024).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<JsonValue>,
) -> (StatusCode, JsonValue) {
    let (status, bytes) = send(app, method, uri, token, body).await;
    let json = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null)
    };
    (status, json)
}

async fn register_student(app: &Router, tag: &str, class_name: &str) -> (String, Uuid) {
    let (status, body) = send_json(
        app,
        "POST",
        "/api/auth/student/register",
        None,
        Some(json!({
            "roll_no": format!("R-{}", tag),
            "name": format!("Student {}", tag),
            "class_name": class_name,
            "email": format!("s_{}@example.com", tag),
            "phone": null,
            "password": "correct horse 9"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register student: {}", body);
    assert!(body["student"].get("password_hash").is_none());
    let id = Uuid::parse_str(body["student"]["id"].as_str().unwrap()).unwrap();
    (body["token"].as_str().unwrap().to_string(), id)
}

async fn register_faculty(app: &Router, tag: &str) -> String {
    let (status, body) = send_json(
        app,
        "POST",
        "/api/auth/faculty/register",
        None,
        Some(json!({
            "name": format!("Faculty {}", tag),
            "email": format!("f_{}@example.com", tag),
            "password": "correct horse 9"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register faculty: {}", body);
    body["token"].as_str().unwrap().to_string()
}

fn three_question_bank() -> JsonValue {
    json!([
        {
            "text": "Which option is second?",
            "type": "MCQ",
            "options": ["A", "B", "C", "D"],
            "correct_answer": "B",
            "marks": 2
        },
        {
            "text": "Pick the vowels",
            "type": "MSQ",
            "options": ["A", "B", "C", "E"],
            "correct_answer": ["A", "E"],
            "marks": 4
        },
        {
            "text": "6 * 7 = ?",
            "type": "NAT",
            "correct_answer": "42",
            "marks": 4
        }
    ])
}

async fn create_test(
    app: &Router,
    faculty_token: &str,
    class_name: &str,
    duration_minutes: i32,
    scheduled_start: Option<String>,
) -> Uuid {
    let (status, body) = send_json(
        app,
        "POST",
        "/api/faculty/tests",
        Some(faculty_token),
        Some(json!({
            "title": format!("Aptitude {}", class_name),
            "instructions": "Answer everything",
            "class_name": class_name,
            "duration_minutes": duration_minutes,
            "scheduled_start": scheduled_start,
            "questions": three_question_bank()
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create test: {}", body);
    assert_eq!(body["total_marks"], 10);
    Uuid::parse_str(body["id"].as_str().unwrap()).unwrap()
}

fn short_tag() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[tokio::test]
async fn full_test_lifecycle_end_to_end() {
    let Some((app, _pool)) = setup_app().await else {
        return;
    };
    let tag = short_tag();
    let class_name = format!("CS-{}", tag);

    let (status, body) = send_json(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (student_token, _student_id) = register_student(&app, &tag, &class_name).await;
    let faculty_token = register_faculty(&app, &tag).await;

    // Duplicate roll number is rejected.
    let (status, _) = send_json(
        &app,
        "POST",
        "/api/auth/student/register",
        None,
        Some(json!({
            "roll_no": format!("R-{}", tag),
            "name": "Someone Else",
            "class_name": class_name,
            "email": format!("dup_{}@example.com", tag),
            "phone": null,
            "password": "correct horse 9"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Login round-trip, wrong password first.
    let (status, _) = send_json(
        &app,
        "POST",
        "/api/auth/student/login",
        None,
        Some(json!({"roll_no": format!("R-{}", tag), "password": "wrong"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/auth/student/login",
        None,
        Some(json!({"roll_no": format!("R-{}", tag), "password": "correct horse 9"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].as_str().is_some());

    // Role gates: students cannot author tests, anonymous users see 401.
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/faculty/tests",
        Some(&student_token),
        Some(json!({"title": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
    let (status, body) = send_json(&app, "GET", "/api/student/tests", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "missing_authorization");

    let test_id = create_test(&app, &faculty_token, &class_name, 30, None).await;

    // Faculty sees the test in their paginated list.
    let (status, body) = send_json(
        &app,
        "GET",
        "/api/faculty/tests?page=1&per_page=10",
        Some(&faculty_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["total"].as_i64().unwrap() >= 1);

    // Student list carries the question count and no attempt yet.
    let (status, body) = send_json(&app, "GET", "/api/student/tests", Some(&student_token), None).await;
    assert_eq!(status, StatusCode::OK);
    let listed = body
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["id"] == json!(test_id.to_string()))
        .expect("test visible to its class")
        .clone();
    assert_eq!(listed["question_count"], 3);
    assert!(listed["attempt_id"].is_null());

    // Preview never leaks the answer key.
    let (status, body) = send_json(
        &app,
        "GET",
        &format!("/api/student/tests/{}", test_id),
        Some(&student_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["questions"].as_array().unwrap().len(), 3);
    for q in body["questions"].as_array().unwrap() {
        assert!(q.get("correct_answer").is_none());
    }

    // Start is idempotent: the second call resumes the same attempt.
    let (status, started) = send_json(
        &app,
        "POST",
        &format!("/api/student/tests/{}/start", test_id),
        Some(&student_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "start: {}", started);
    assert_eq!(started["status"], "in_progress");
    let attempt_id = Uuid::parse_str(started["attempt_id"].as_str().unwrap()).unwrap();
    let remaining = started["time_remaining_seconds"].as_i64().unwrap();
    assert!(remaining > 0 && remaining <= 30 * 60);
    for q in started["questions"].as_array().unwrap() {
        assert!(q.get("correct_answer").is_none());
    }

    let (status, resumed) = send_json(
        &app,
        "POST",
        &format!("/api/student/tests/{}/start", test_id),
        Some(&student_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resumed["attempt_id"], started["attempt_id"]);

    // Incremental answers: save, overwrite, reject unknown ids and wrong shapes.
    let answer_uri = format!("/api/student/attempts/{}/answer", attempt_id);
    let (status, body) = send_json(
        &app,
        "PATCH",
        &answer_uri,
        Some(&student_token),
        Some(json!({"question_id": 1, "answer": "A"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "save answer: {}", body);
    assert_eq!(body["saved"], true);
    let (status, _) = send_json(
        &app,
        "PATCH",
        &answer_uri,
        Some(&student_token),
        Some(json!({"question_id": 1, "answer": "B"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send_json(
        &app,
        "PATCH",
        &answer_uri,
        Some(&student_token),
        Some(json!({"question_id": 2, "answer": ["A", "E"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send_json(
        &app,
        "PATCH",
        &answer_uri,
        Some(&student_token),
        Some(json!({"question_id": 99, "answer": "B"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send_json(
        &app,
        "PATCH",
        &answer_uri,
        Some(&student_token),
        Some(json!({"question_id": 1, "answer": ["B"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Live progress reflects the two saved answers.
    let (status, body) = send_json(
        &app,
        "GET",
        &format!("/api/student/attempts/{}", attempt_id),
        Some(&student_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "in_progress");
    assert_eq!(body["questions_answered"], 2);
    assert_eq!(body["total_questions"], 3);

    // Result before submission is not ready.
    let (status, _) = send_json(
        &app,
        "GET",
        &format!("/api/student/attempts/{}/result", attempt_id),
        Some(&student_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Submit with a final answer sheet; NAT answer arrives only here.
    let submit_uri = format!("/api/student/attempts/{}/submit", attempt_id);
    let (status, submitted) = send_json(
        &app,
        "POST",
        &submit_uri,
        Some(&student_token),
        Some(json!({"answers": {"1": "B", "2": ["E", "A"], "3": " 42 "}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "submit: {}", submitted);
    assert_eq!(submitted["status"], "completed");
    assert_eq!(submitted["submitted_late"], false);
    assert_eq!(submitted["result"]["total_marks"], 10);
    assert_eq!(submitted["result"]["marks_obtained"], 10);
    assert_eq!(submitted["result"]["percentage"], "100.00");
    let breakdown = submitted["result"]["breakdown"].as_array().unwrap();
    assert_eq!(breakdown.len(), 3);
    for (index, entry) in breakdown.iter().enumerate() {
        assert_eq!(entry["question_id"], index as i64 + 1);
        assert_eq!(entry["correct"], true);
    }

    // A second submit (empty body) returns the stored outcome unchanged.
    let (status, resubmitted) = send_json(&app, "POST", &submit_uri, Some(&student_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resubmitted["result"], submitted["result"]);
    assert_eq!(resubmitted["completed_at"], submitted["completed_at"]);

    // Terminal attempts accept no more answers or proctor events.
    let (status, _) = send_json(
        &app,
        "PATCH",
        &answer_uri,
        Some(&student_token),
        Some(json!({"question_id": 1, "answer": "A"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = send_json(
        &app,
        "POST",
        &format!("/api/student/attempts/{}/events", attempt_id),
        Some(&student_token),
        Some(json!({"event_type": "tab_switch", "detail": null})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send_json(
        &app,
        "GET",
        &format!("/api/student/attempts/{}/result", attempt_id),
        Some(&student_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["marks_obtained"], 10);

    // The student list now shows the completed attempt.
    let (_, body) = send_json(&app, "GET", "/api/student/tests", Some(&student_token), None).await;
    let listed = body
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["id"] == json!(test_id.to_string()))
        .unwrap()
        .clone();
    assert_eq!(listed["attempt_status"], "completed");

    // Reports are visible to both roles.
    for token in [&student_token, &faculty_token] {
        let (status, body) = send_json(
            &app,
            "GET",
            &format!("/api/tests/{}/leaderboard", test_id),
            Some(token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["rank"], 1);
        assert_eq!(entries[0]["marks_obtained"], 10);
        assert_eq!(entries[0]["submitted_late"], false);
    }
    let (status, body) = send_json(
        &app,
        "GET",
        &format!("/api/tests/{}/analytics", test_id),
        Some(&faculty_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_attempts"], 1);
    assert_eq!(body["completed"], 1);
    assert_eq!(body["expired"], 0);
    assert_eq!(body["average_percentage"], "100.00");
    let stats = body["questions"].as_array().unwrap();
    assert_eq!(stats.len(), 3);
    assert_eq!(stats[0]["question_id"], 1);
    assert_eq!(stats[0]["correct"], 1);

    // Faculty oversight: attempts list, empty proctor trail, xlsx export.
    let (status, body) = send_json(
        &app,
        "GET",
        &format!("/api/faculty/tests/{}/attempts", test_id),
        Some(&faculty_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let attempts = body.as_array().unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0]["status"], "completed");
    assert!(attempts[0]["student_name"].as_str().is_some());

    let (status, body) = send_json(
        &app,
        "GET",
        &format!("/api/faculty/attempts/{}/events", attempt_id),
        Some(&faculty_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 0);

    let (status, bytes) = send(
        &app,
        "GET",
        &format!("/api/faculty/tests/{}/export", test_id),
        Some(&faculty_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(bytes.len() > 2);
    assert_eq!(&bytes[..2], b"PK", "export should be a zip container");

    // Once attempted, the whole definition freezes.
    let (status, _) = send_json(
        &app,
        "PATCH",
        &format!("/api/faculty/tests/{}", test_id),
        Some(&faculty_token),
        Some(json!({"title": "Renamed after attempts"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = send_json(
        &app,
        "PATCH",
        &format!("/api/faculty/tests/{}", test_id),
        Some(&faculty_token),
        Some(json!({"duration_minutes": 45})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = send_json(
        &app,
        "POST",
        &format!("/api/faculty/tests/{}/questions", test_id),
        Some(&faculty_token),
        Some(json!({"questions": [{"text": "extra", "type": "NAT", "correct_answer": "1"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = send_json(
        &app,
        "DELETE",
        &format!("/api/faculty/tests/{}", test_id),
        Some(&faculty_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn scheduling_window_and_class_gating() {
    let Some((app, _pool)) = setup_app().await else {
        return;
    };
    let tag = short_tag();
    let class_name = format!("CS-{}", tag);
    let (student_token, _) = register_student(&app, &tag, &class_name).await;
    let faculty_token = register_faculty(&app, &tag).await;

    // Not yet open.
    let future_start = (Utc::now() + Duration::hours(1)).to_rfc3339();
    let early_id = create_test(&app, &faculty_token, &class_name, 30, Some(future_start)).await;
    let (status, _) = send_json(
        &app,
        "POST",
        &format!("/api/student/tests/{}/start", early_id),
        Some(&student_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Window already closed: started three minutes ago, one minute long.
    let past_start = (Utc::now() - Duration::minutes(3)).to_rfc3339();
    let late_id = create_test(&app, &faculty_token, &class_name, 1, Some(past_start)).await;
    let (status, _) = send_json(
        &app,
        "POST",
        &format!("/api/student/tests/{}/start", late_id),
        Some(&student_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Tests for another class are invisible to this student.
    let other_id = create_test(&app, &faculty_token, &format!("EE-{}", tag), 30, None).await;
    let (status, _) = send_json(
        &app,
        "GET",
        &format!("/api/student/tests/{}", other_id),
        Some(&student_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send_json(
        &app,
        "POST",
        &format!("/api/student/tests/{}/start", other_id),
        Some(&student_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Another faculty account cannot see or edit the first one's test.
    let other_faculty = register_faculty(&app, &format!("x{}", &tag[..7])).await;
    let (status, _) = send_json(
        &app,
        "GET",
        &format!("/api/faculty/tests/{}", other_id),
        Some(&other_faculty),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn overdue_attempts_expire_and_late_submissions_are_flagged() {
    let Some((app, pool)) = setup_app().await else {
        return;
    };
    let tag = short_tag();
    let class_name = format!("CS-{}", tag);
    let (student_token, _) = register_student(&app, &tag, &class_name).await;
    let late_tag = format!("l{}", &tag[..7]);
    let (late_token, _) = register_student(&app, &late_tag, &class_name).await;
    let faculty_token = register_faculty(&app, &tag).await;
    let test_id = create_test(&app, &faculty_token, &class_name, 1, None).await;

    // First student starts, reports proctor events, then goes overdue.
    let (status, started) = send_json(
        &app,
        "POST",
        &format!("/api/student/tests/{}/start", test_id),
        Some(&student_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let attempt_id = Uuid::parse_str(started["attempt_id"].as_str().unwrap()).unwrap();

    let events_uri = format!("/api/student/attempts/{}/events", attempt_id);
    let (status, body) = send_json(
        &app,
        "POST",
        &events_uri,
        Some(&student_token),
        Some(json!({"event_type": "tab_switch", "detail": {"count": 1}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "event: {}", body);
    assert_eq!(body["illegal_attempts"], 1);
    let (_, body) = send_json(
        &app,
        "POST",
        &events_uri,
        Some(&student_token),
        Some(json!({"event_type": "fullscreen_exit", "detail": null})),
    )
    .await;
    assert_eq!(body["illegal_attempts"], 2);

    // Push the attempt past deadline + grace, then read it: the read path
    // finalizes it as expired with completed_at pinned to the deadline.
    sqlx::query("UPDATE attempts SET started_at = started_at - interval '3 minutes' WHERE id = $1")
        .bind(attempt_id)
        .execute(&pool)
        .await
        .expect("backdate attempt");

    let (status, body) = send_json(
        &app,
        "GET",
        &format!("/api/student/attempts/{}", attempt_id),
        Some(&student_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "expired");
    assert_eq!(body["time_remaining_seconds"], 0);
    let started_at: DateTime<Utc> = body["started_at"].as_str().unwrap().parse().unwrap();
    let completed_at: DateTime<Utc> = body["completed_at"].as_str().unwrap().parse().unwrap();
    assert_eq!(completed_at, started_at + Duration::minutes(1));

    // The expired attempt still carries a scored (empty) result.
    let (status, body) = send_json(
        &app,
        "GET",
        &format!("/api/student/attempts/{}/result", attempt_id),
        Some(&student_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "expired");
    assert_eq!(body["result"]["marks_obtained"], 0);
    assert_eq!(body["result"]["percentage"], "0.00");

    // Submitting after expiry just returns the stored outcome.
    let (status, body) = send_json(
        &app,
        "POST",
        &format!("/api/student/attempts/{}/submit", attempt_id),
        Some(&student_token),
        Some(json!({"answers": {"1": "B"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "expired");
    assert_eq!(body["result"]["marks_obtained"], 0);

    // Second student submits past grace without any intervening read:
    // accepted, scored, flagged late.
    let (status, started) = send_json(
        &app,
        "POST",
        &format!("/api/student/tests/{}/start", test_id),
        Some(&late_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let late_attempt = Uuid::parse_str(started["attempt_id"].as_str().unwrap()).unwrap();
    sqlx::query("UPDATE attempts SET started_at = started_at - interval '3 minutes' WHERE id = $1")
        .bind(late_attempt)
        .execute(&pool)
        .await
        .expect("backdate attempt");

    let (status, body) = send_json(
        &app,
        "POST",
        &format!("/api/student/attempts/{}/submit", late_attempt),
        Some(&late_token),
        Some(json!({"answers": {"1": "B", "2": ["A", "E"], "3": "42"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "late submit: {}", body);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["submitted_late"], true);
    assert_eq!(body["result"]["marks_obtained"], 10);

    // Both terminal attempts show up in analytics with one late flag.
    let (_, body) = send_json(
        &app,
        "GET",
        &format!("/api/tests/{}/analytics", test_id),
        Some(&faculty_token),
        None,
    )
    .await;
    assert_eq!(body["total_attempts"], 2);
    assert_eq!(body["completed"], 1);
    assert_eq!(body["expired"], 1);
    assert_eq!(body["late_submissions"], 1);

    // Leaderboard ranks the scored late submission above the expired blank.
    let (status, body) = send_json(
        &app,
        "GET",
        &format!("/api/tests/{}/leaderboard", test_id),
        Some(&faculty_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let standings = body.as_array().unwrap();
    assert_eq!(standings.len(), 2);
    assert_eq!(standings[0]["rank"], 1);
    assert_eq!(standings[0]["marks_obtained"], 10);
    assert_eq!(standings[0]["submitted_late"], true);
    assert_eq!(standings[1]["rank"], 2);
    assert_eq!(standings[1]["marks_obtained"], 0);

    // The proctor trail survives expiry, in order, and the export counts it.
    let (status, body) = send_json(
        &app,
        "GET",
        &format!("/api/faculty/attempts/{}/events", attempt_id),
        Some(&faculty_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let events = body.as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event_type"], "tab_switch");
    assert_eq!(events[1]["event_type"], "fullscreen_exit");
}

#[tokio::test]
async fn racing_submit_and_expire_settle_on_one_outcome() {
    let Some((app, pool)) = setup_app().await else {
        return;
    };
    let tag = short_tag();
    let class_name = format!("CS-{}", tag);
    let (student_token, student_id) = register_student(&app, &tag, &class_name).await;
    let faculty_token = register_faculty(&app, &tag).await;
    let test_id = create_test(&app, &faculty_token, &class_name, 30, None).await;

    let (status, started) = send_json(
        &app,
        "POST",
        &format!("/api/student/tests/{}/start", test_id),
        Some(&student_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let attempt_id = Uuid::parse_str(started["attempt_id"].as_str().unwrap()).unwrap();

    // Drive the two finalizers head to head at the service layer. Exactly
    // one conditional update lands; the loser adopts the stored outcome.
    use aptitude_backend::models::question::AnswerValue;
    use aptitude_backend::services::attempt_service::AttemptService;
    use std::collections::BTreeMap;

    let service = AttemptService::new(pool.clone());
    let answers = BTreeMap::from([(1, AnswerValue::One("B".to_string()))]);
    let (submitted, expired) = tokio::join!(
        service.submit(attempt_id, student_id, Some(answers)),
        service.expire(attempt_id)
    );
    let (submit_attempt, submit_result) = submitted.expect("submit settles");
    let (expire_attempt, expire_result) = expired.expect("expire settles");

    assert!(submit_attempt.status.is_terminal());
    assert_eq!(submit_attempt.status, expire_attempt.status);
    assert_eq!(submit_attempt.completed_at, expire_attempt.completed_at);
    assert_eq!(submit_result, expire_result);
}

#[tokio::test]
async fn concurrent_submissions_settle_once() {
    let Some((app, _pool)) = setup_app().await else {
        return;
    };
    let tag = short_tag();
    let class_name = format!("CS-{}", tag);
    let (student_token, _) = register_student(&app, &tag, &class_name).await;
    let faculty_token = register_faculty(&app, &tag).await;
    let test_id = create_test(&app, &faculty_token, &class_name, 30, None).await;

    let (status, started) = send_json(
        &app,
        "POST",
        &format!("/api/student/tests/{}/start", test_id),
        Some(&student_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let attempt_id = started["attempt_id"].as_str().unwrap().to_string();
    let submit_uri = format!("/api/student/attempts/{}/submit", attempt_id);

    let first = send_json(
        &app,
        "POST",
        &submit_uri,
        Some(&student_token),
        Some(json!({"answers": {"1": "B", "2": ["A", "E"], "3": "42"}})),
    );
    let second = send_json(
        &app,
        "POST",
        &submit_uri,
        Some(&student_token),
        Some(json!({"answers": {"1": "A"}})),
    );
    let ((status_a, body_a), (status_b, body_b)) = tokio::join!(first, second);

    // Exactly one write wins; both callers see the same stored outcome.
    assert_eq!(status_a, StatusCode::OK);
    assert_eq!(status_b, StatusCode::OK);
    assert_eq!(body_a["status"], "completed");
    assert_eq!(body_a["result"], body_b["result"]);
    assert_eq!(body_a["completed_at"], body_b["completed_at"]);
}
