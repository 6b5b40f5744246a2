// src/routes.rs

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
};
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{
        assignments, auth, certificates, courses, dashboard, email, enrollments, payments, users,
    },
    state::AppState,
    utils::jwt::{auth_middleware, educator_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, courses, assignments, certificates, ...).
/// * Applies global middleware (Trace, CORS) and rate limiting on the two
///   OTP-sending routes.
/// * Injects shared state (pool, config, notifier, payment provider).
///
/// The rate limiter keys on peer addresses, so the router must be served
/// with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .frontend_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let governor_conf = GovernorConfigBuilder::default()
        .per_second(2)
        .burst_size(5)
        .finish()
        .unwrap();

    let governor_conf = Arc::new(governor_conf);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/register/verify-otp", post(auth::verify_registration_otp))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/password/verify-otp", post(auth::verify_password_otp))
        .route("/password/reset", post(auth::reset_password))
        // OTP senders trigger outbound email; keep them rate limited.
        .merge(
            Router::new()
                .route("/register/send-otp", post(auth::send_registration_otp))
                .route("/password/send-otp", post(auth::send_password_otp))
                .layer(GovernorLayer::new(governor_conf)),
        )
        .merge(
            Router::new()
                .route("/me", get(auth::me))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let course_routes = Router::new()
        // Public catalog reads
        .route("/", get(courses::list_courses))
        .route("/{id}", get(courses::get_course))
        // Student routes
        .merge(
            Router::new()
                .route("/enrolled/mine", get(enrollments::my_enrollments))
                .route("/{id}/enroll", post(enrollments::enroll))
                .route(
                    "/{id}/progress/{lecture_id}",
                    put(enrollments::update_progress),
                )
                .route("/{id}/rate", post(enrollments::rate_course))
                .route("/{id}/assignments", get(assignments::list_assignments))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        )
        // Educator routes: auth first, then the role check
        .merge(
            Router::new()
                .route("/", post(courses::create_course))
                .route("/educator/mine", get(courses::my_courses))
                .route(
                    "/{id}",
                    put(courses::update_course).delete(courses::delete_course),
                )
                .route("/{id}/assignments", post(assignments::create_assignment))
                .layer(middleware::from_fn(educator_middleware))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let assignment_routes = Router::new()
        .route("/{id}", get(assignments::get_assignment))
        .route("/{id}/submit", post(assignments::submit_assignment))
        .route("/{id}/certificate", post(certificates::issue_certificate))
        .merge(
            Router::new()
                .route(
                    "/{id}",
                    put(assignments::update_assignment).delete(assignments::delete_assignment),
                )
                .layer(middleware::from_fn(educator_middleware)),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let certificate_routes = Router::new()
        .route("/", get(certificates::my_certificates))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let enrollment_routes = Router::new()
        .route("/{id}/status", put(enrollments::update_enrollment_status))
        .layer(middleware::from_fn(educator_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let user_routes = Router::new()
        .route(
            "/profile",
            get(users::get_profile).put(users::update_profile),
        )
        .route("/password", put(users::change_password))
        .route("/account", delete(users::delete_account))
        .route("/stats", get(users::get_stats))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let payment_routes = Router::new()
        .route("/order", post(payments::create_order))
        .route("/verify", post(payments::verify_payment))
        .route("/status/{order_id}", get(payments::order_status))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let dashboard_routes = Router::new()
        .route("/", get(dashboard::overview))
        .route("/enrolled-students", get(dashboard::enrolled_students))
        .route("/courses/{id}", get(dashboard::course_analytics))
        .route("/courses/{id}/students", get(dashboard::course_students))
        .layer(middleware::from_fn(educator_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let email_routes = Router::new()
        .route("/status", get(email::email_status))
        .merge(
            Router::new()
                .route("/test", post(email::send_test_email))
                .layer(middleware::from_fn(educator_middleware))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/courses", course_routes)
        .nest("/api/assignments", assignment_routes)
        .nest("/api/certificates", certificate_routes)
        .nest("/api/enrollments", enrollment_routes)
        .nest("/api/users", user_routes)
        .nest("/api/payments", payment_routes)
        .nest("/api/dashboard", dashboard_routes)
        .nest("/api/email", email_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
