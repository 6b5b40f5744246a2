// tests/dashboard_tests.rs
//
// Educator-facing aggregates: the overview dashboard, per-course analytics,
// the student roster and the enrollment status override.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use lms_backend::{
    config::Config,
    routes,
    services::{
        notify::{EmailKind, Notifier, NotifyError},
        payments::{PaymentError, PaymentProvider, ProviderOrder},
    },
    state::AppState,
};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

struct StubNotifier;

#[async_trait]
impl Notifier for StubNotifier {
    async fn send(
        &self,
        _kind: EmailKind,
        _to: &str,
        _data: serde_json::Value,
    ) -> Result<(), NotifyError> {
        Ok(())
    }
}

struct StubPayments;

#[async_trait]
impl PaymentProvider for StubPayments {
    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        _receipt: &str,
    ) -> Result<ProviderOrder, PaymentError> {
        Ok(ProviderOrder {
            id: "order_stub_1".to_string(),
            amount,
            currency: currency.to_string(),
            status: "created".to_string(),
        })
    }

    async fn fetch_order(&self, order_id: &str) -> Result<serde_json::Value, PaymentError> {
        Ok(serde_json::json!({ "id": order_id, "status": "paid" }))
    }
}

async fn spawn_app() -> (String, SqlitePool) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "dashboard_test_secret".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        port: 0,
        frontend_origins: vec!["http://localhost:5173".to_string()],
        notify_endpoint: None,
        notify_from: "no-reply@test.local".to_string(),
        payment_key_id: None,
        payment_key_secret: None,
        payment_api_base: "http://127.0.0.1:1".to_string(),
        payment_currency: "INR".to_string(),
    };

    let state = AppState {
        pool: pool.clone(),
        config,
        notifier: Arc::new(StubNotifier),
        payments: Arc::new(StubPayments),
    };

    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (address, pool)
}

async fn register_user(
    client: &reqwest::Client,
    address: &str,
    pool: &SqlitePool,
    name: &str,
    role: &str,
) -> (String, String) {
    let email = format!(
        "{}_{}@example.com",
        name.to_lowercase().replace(' ', "_"),
        &uuid::Uuid::new_v4().to_string()[..8]
    );

    client
        .post(format!("{}/api/auth/register/send-otp", address))
        .json(&serde_json::json!({ "name": name, "email": email }))
        .send()
        .await
        .expect("send-otp failed");

    let otp = sqlx::query_scalar::<_, String>(
        "SELECT code FROM otp_codes WHERE email = ? AND used = 0 ORDER BY id DESC LIMIT 1",
    )
    .bind(&email)
    .fetch_one(pool)
    .await
    .expect("no pending code");

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "name": name,
            "email": email,
            "password": "password123",
            "role": role,
            "otp": otp,
        }))
        .send()
        .await
        .expect("register failed");
    assert_eq!(response.status().as_u16(), 201);

    let body: serde_json::Value = response.json().await.unwrap();
    (body["token"].as_str().unwrap().to_string(), email)
}

async fn user_id(pool: &SqlitePool, email: &str) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Creates a two-lecture course with the given pricing.
async fn create_course(
    client: &reqwest::Client,
    address: &str,
    token: &str,
    title: &str,
    price: f64,
    discount: i64,
    is_published: bool,
) -> i64 {
    let response = client
        .post(format!("{}/api/courses", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "title": title,
            "price": price,
            "discount": discount,
            "is_published": is_published,
            "content": [{
                "chapter_id": "ch1",
                "chapter_title": "Basics",
                "chapter_order": 1,
                "chapter_content": [
                    {
                        "lecture_id": "l1",
                        "lecture_title": "Intro",
                        "lecture_duration": 8.0,
                        "lecture_url": "https://videos.example.com/intro.mp4",
                        "lecture_order": 1
                    },
                    {
                        "lecture_id": "l2",
                        "lecture_title": "Outro",
                        "lecture_duration": 9.0,
                        "lecture_url": "https://videos.example.com/outro.mp4",
                        "lecture_order": 2
                    }
                ]
            }],
        }))
        .send()
        .await
        .expect("create course failed");
    assert_eq!(response.status().as_u16(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    body["course"]["id"].as_i64().unwrap()
}

async fn enroll(client: &reqwest::Client, address: &str, token: &str, course_id: i64) {
    let response = client
        .post(format!("{}/api/courses/{}/enroll", address, course_id))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
}

async fn complete_lecture(
    client: &reqwest::Client,
    address: &str,
    token: &str,
    course_id: i64,
    lecture_id: &str,
) {
    let response = client
        .put(format!(
            "{}/api/courses/{}/progress/{}",
            address, course_id, lecture_id
        ))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn overview_aggregates_across_the_educators_courses() {
    // Arrange: three courses, three enrollments from two distinct students
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (educator, _) = register_user(&client, &address, &pool, "Board Educator", "educator").await;
    let (alice, alice_email) =
        register_user(&client, &address, &pool, "Alice Learner", "student").await;
    let (bob, _) = register_user(&client, &address, &pool, "Bob Learner", "student").await;

    let free_id = create_course(&client, &address, &educator, "Free Course", 0.0, 0, true).await;
    let paid_id = create_course(&client, &address, &educator, "Paid Course", 100.0, 10, true).await;
    create_course(&client, &address, &educator, "Draft Course", 50.0, 0, false).await;

    enroll(&client, &address, &alice, free_id).await;
    enroll(&client, &address, &bob, free_id).await;

    // Seed the paid enrollment directly; pricing is covered by the payment tests
    let alice_id = user_id(&pool, &alice_email).await;
    let now = chrono::Utc::now();
    sqlx::query(
        "INSERT INTO enrollments (student_id, course_id, enrolled_at, last_accessed) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(alice_id)
    .bind(paid_id)
    .bind(now)
    .bind(now)
    .execute(&pool)
    .await
    .unwrap();

    // Act
    let response = client
        .get(format!("{}/api/dashboard", address))
        .header("Authorization", format!("Bearer {}", educator))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let dashboard = &body["dashboard"];

    assert_eq!(dashboard["total_courses"], 3);
    assert_eq!(dashboard["total_enrollments"], 3);
    assert_eq!(dashboard["unique_students"], 2);
    // One paid enrollment at 100 minus 10 percent
    assert_eq!(dashboard["total_revenue"], 90.0);

    let top = dashboard["top_courses"].as_array().unwrap();
    assert_eq!(top[0]["course_id"].as_i64().unwrap(), free_id);
    assert_eq!(top[0]["enrolled_count"], 2);

    assert_eq!(dashboard["recent_enrollments"].as_array().unwrap().len(), 3);

    let monthly = dashboard["monthly_enrollments"].as_array().unwrap();
    assert_eq!(monthly.len(), 6);
    let current_month = chrono::Utc::now().format("%Y-%m").to_string();
    assert_eq!(monthly[5]["month"], current_month.as_str());
    assert_eq!(monthly[5]["count"], 3);
}

#[tokio::test]
async fn dashboard_is_educator_only() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (student, _) = register_user(&client, &address, &pool, "Nosy Student", "student").await;

    let response = client
        .get(format!("{}/api/dashboard", address))
        .header("Authorization", format!("Bearer {}", student))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = client
        .get(format!("{}/api/dashboard", address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn course_analytics_reports_funnel_chapters_and_ratings() {
    // Arrange: one finished student, one halfway, one idle
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (educator, _) =
        register_user(&client, &address, &pool, "Funnel Educator", "educator").await;
    let (done, _) = register_user(&client, &address, &pool, "Done Student", "student").await;
    let (halfway, _) = register_user(&client, &address, &pool, "Halfway Student", "student").await;
    let (idle, _) = register_user(&client, &address, &pool, "Idle Student", "student").await;

    let course_id =
        create_course(&client, &address, &educator, "Funnel Course", 0.0, 0, true).await;

    enroll(&client, &address, &done, course_id).await;
    complete_lecture(&client, &address, &done, course_id, "l1").await;
    complete_lecture(&client, &address, &done, course_id, "l2").await;
    client
        .post(format!("{}/api/courses/{}/rate", address, course_id))
        .header("Authorization", format!("Bearer {}", done))
        .json(&serde_json::json!({ "rating": 5 }))
        .send()
        .await
        .unwrap();

    enroll(&client, &address, &halfway, course_id).await;
    complete_lecture(&client, &address, &halfway, course_id, "l1").await;
    client
        .post(format!("{}/api/courses/{}/rate", address, course_id))
        .header("Authorization", format!("Bearer {}", halfway))
        .json(&serde_json::json!({ "rating": 4 }))
        .send()
        .await
        .unwrap();

    enroll(&client, &address, &idle, course_id).await;

    // Act
    let response = client
        .get(format!("{}/api/dashboard/courses/{}", address, course_id))
        .header("Authorization", format!("Bearer {}", educator))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let analytics = &body["analytics"];

    assert_eq!(analytics["enrolled_count"], 3);
    assert_eq!(analytics["finished"], 1);
    assert_eq!(analytics["in_progress"], 1);
    assert_eq!(analytics["not_started"], 1);
    // (100 + 50 + 0) / 3
    assert_eq!(analytics["average_completion"], 50.0);

    let chapters = analytics["chapters"].as_array().unwrap();
    assert_eq!(chapters.len(), 1);
    assert_eq!(chapters[0]["lecture_count"], 2);
    assert_eq!(chapters[0]["completed_count"], 1);

    assert_eq!(analytics["rating_breakdown"]["5"], 1);
    assert_eq!(analytics["rating_breakdown"]["4"], 1);
    assert_eq!(analytics["rating_breakdown"]["3"], 0);

    assert_eq!(analytics["status_counts"]["active"], 3);
}

#[tokio::test]
async fn analytics_are_scoped_to_the_owner() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (owner, _) = register_user(&client, &address, &pool, "Own Educator", "educator").await;
    let (other, _) = register_user(&client, &address, &pool, "Rival Educator", "educator").await;
    let course_id = create_course(&client, &address, &owner, "Scoped Course", 0.0, 0, true).await;

    let response = client
        .get(format!("{}/api/dashboard/courses/{}", address, course_id))
        .header("Authorization", format!("Bearer {}", other))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = client
        .get(format!(
            "{}/api/dashboard/courses/{}/students",
            address, course_id
        ))
        .header("Authorization", format!("Bearer {}", other))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn roster_shows_per_student_progress() {
    // Arrange
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (educator, _) =
        register_user(&client, &address, &pool, "Roster Educator", "educator").await;
    let (walker, walker_email) =
        register_user(&client, &address, &pool, "Walker Student", "student").await;
    let (sitter, sitter_email) =
        register_user(&client, &address, &pool, "Sitter Student", "student").await;

    let course_id =
        create_course(&client, &address, &educator, "Roster Course", 0.0, 0, true).await;
    enroll(&client, &address, &walker, course_id).await;
    enroll(&client, &address, &sitter, course_id).await;
    complete_lecture(&client, &address, &walker, course_id, "l1").await;

    // Act
    let response = client
        .get(format!(
            "{}/api/dashboard/courses/{}/students",
            address, course_id
        ))
        .header("Authorization", format!("Bearer {}", educator))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let students = body["students"].as_array().unwrap();
    assert_eq!(students.len(), 2);

    let walker_row = students
        .iter()
        .find(|s| s["email"] == walker_email.as_str())
        .unwrap();
    assert_eq!(walker_row["progress"]["completed_lectures"], 1);
    assert_eq!(walker_row["progress"]["total_lectures"], 2);
    assert_eq!(walker_row["progress"]["percentage"], 50);
    assert_eq!(walker_row["status"], "active");

    let sitter_row = students
        .iter()
        .find(|s| s["email"] == sitter_email.as_str())
        .unwrap();
    assert_eq!(sitter_row["progress"]["percentage"], 0);
}

#[tokio::test]
async fn educator_wide_roster_lists_enrollments_newest_first() {
    // Arrange
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (educator, _) =
        register_user(&client, &address, &pool, "Roster Educator", "educator").await;
    let (other, _) = register_user(&client, &address, &pool, "Roster Outsider", "educator").await;
    let (student_a, email_a) =
        register_user(&client, &address, &pool, "Roster Alice", "student").await;
    let (student_b, email_b) = register_user(&client, &address, &pool, "Roster Bob", "student").await;

    let course_one = create_course(&client, &address, &educator, "Course One", 0.0, 0, true).await;
    let course_two = create_course(&client, &address, &educator, "Course Two", 0.0, 0, true).await;

    enroll(&client, &address, &student_a, course_one).await;
    enroll(&client, &address, &student_a, course_two).await;
    enroll(&client, &address, &student_b, course_two).await;

    // Space the enrollments out so the ordering is unambiguous, and flag the
    // oldest one as fully completed.
    let alice_id = user_id(&pool, &email_a).await;
    sqlx::query("UPDATE enrollments SET enrolled_at = ? WHERE student_id = ? AND course_id = ?")
        .bind(chrono::Utc::now() - chrono::Duration::days(2))
        .bind(alice_id)
        .bind(course_one)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("UPDATE enrollments SET enrolled_at = ? WHERE student_id = ? AND course_id = ?")
        .bind(chrono::Utc::now() - chrono::Duration::days(1))
        .bind(alice_id)
        .bind(course_two)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "UPDATE enrollments SET assignment_completed = 1, certificate_earned = 1, \
         status = 'completed' WHERE student_id = ? AND course_id = ?",
    )
    .bind(alice_id)
    .bind(course_one)
    .execute(&pool)
    .await
    .unwrap();

    // Act
    let response = client
        .get(format!("{}/api/dashboard/enrolled-students", address))
        .header("Authorization", format!("Bearer {}", educator))
        .send()
        .await
        .unwrap();

    // Assert: all three enrollments, newest first, with per-row flags
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let students = body["students"].as_array().unwrap();
    assert_eq!(students.len(), 3);

    assert_eq!(students[0]["student_email"], email_b);
    assert_eq!(students[0]["course_title"], "Course Two");
    assert_eq!(students[0]["assignment_completed"], false);
    assert_eq!(students[0]["certificate_earned"], false);

    assert_eq!(students[1]["student_email"], email_a);
    assert_eq!(students[1]["course_title"], "Course Two");

    assert_eq!(students[2]["student_email"], email_a);
    assert_eq!(students[2]["course_title"], "Course One");
    assert_eq!(students[2]["assignment_completed"], true);
    assert_eq!(students[2]["certificate_earned"], true);
    assert_eq!(students[2]["status"], "completed");
    assert!(students[2]["enrollment_id"].as_i64().unwrap() > 0);

    // Another educator sees none of them
    let response = client
        .get(format!("{}/api/dashboard/enrolled-students", address))
        .header("Authorization", format!("Bearer {}", other))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["students"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn educators_can_override_enrollment_status() {
    // Arrange
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (owner, _) = register_user(&client, &address, &pool, "Status Educator", "educator").await;
    let (other, _) = register_user(&client, &address, &pool, "Status Rival", "educator").await;
    let (student, _) = register_user(&client, &address, &pool, "Status Student", "student").await;

    let course_id = create_course(&client, &address, &owner, "Status Course", 0.0, 0, true).await;
    enroll(&client, &address, &student, course_id).await;

    let enrollment_id = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM enrollments WHERE course_id = ?",
    )
    .bind(course_id)
    .fetch_one(&pool)
    .await
    .unwrap();

    // 1. Only the allowed lifecycle values go through
    let response = client
        .put(format!("{}/api/enrollments/{}/status", address, enrollment_id))
        .header("Authorization", format!("Bearer {}", owner))
        .json(&serde_json::json!({ "status": "paused" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // 2. Only the owner of the course may touch the enrollment
    let response = client
        .put(format!("{}/api/enrollments/{}/status", address, enrollment_id))
        .header("Authorization", format!("Bearer {}", other))
        .json(&serde_json::json!({ "status": "cancelled" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    // 3. The owner can, and the row is updated
    let response = client
        .put(format!("{}/api/enrollments/{}/status", address, enrollment_id))
        .header("Authorization", format!("Bearer {}", owner))
        .json(&serde_json::json!({ "status": "cancelled" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let status = sqlx::query_scalar::<_, String>("SELECT status FROM enrollments WHERE id = ?")
        .bind(enrollment_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "cancelled");

    // 4. Unknown enrollment ids fall out as 404
    let response = client
        .put(format!("{}/api/enrollments/{}/status", address, 99999))
        .header("Authorization", format!("Bearer {}", owner))
        .json(&serde_json::json!({ "status": "active" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}
