// src/routes.rs

use axum::{
    Router,
    http::{Method, header},
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{handlers::quiz, state::AppState};

/// Assembles the application router.
///
/// Every route is public; usernames are taken at face value.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let quiz_routes = Router::new()
        .route("/active", get(quiz::list_active_quizzes))
        .route("/{quiz_id}/questions", get(quiz::get_quiz_questions))
        .route("/{quiz_id}/leaderboard", get(quiz::get_leaderboard));

    Router::new()
        .route("/questions", get(quiz::get_questions))
        .route("/responses", post(quiz::submit_responses))
        .route("/quizzes", post(quiz::create_quiz))
        .nest("/quizzes", quiz_routes)
        // Global middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
