// src/handlers/quiz.rs

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    config::{DEFAULT_LIST_LIMIT, DEFAULT_QUESTION_COUNT},
    error::AppError,
    models::dto::{
        ActiveQuizzesResponse, CreateQuizRequest, LeaderboardResponse, LimitParams,
        MAX_QUESTION_COUNT, QuestionsParams, QuestionsResponse, QuizSummary, ResponsesRequest,
        ResponsesResponse, to_question_responses,
    },
    services::{question_bank::QuestionBank, quiz_service::QuizService},
    utils::params::{non_blank, parse_bool_param, parse_limit_param, parse_positive_param},
};

const UNLINKED_WARNING: &str =
    "responses are not linked to leaderboard unless both quiz_id and username are provided";

fn question_count_param(value: Option<&str>) -> Result<usize, AppError> {
    let count = parse_positive_param("question_count", value, DEFAULT_QUESTION_COUNT as i64)?;
    if count > MAX_QUESTION_COUNT {
        return Err(AppError::BadRequest(format!(
            "question_count must be at most {MAX_QUESTION_COUNT}"
        )));
    }
    Ok(count as usize)
}

/// Serves a quiz's questions, creating the quiz first when needed.
async fn serve_questions(
    service: &QuizService,
    bank: &QuestionBank,
    quiz_id: Option<&str>,
    params: &QuestionsParams,
) -> Result<QuestionsResponse, AppError> {
    let question_count = question_count_param(params.question_count.as_deref())?;
    let create_if_missing = parse_bool_param(params.create_if_missing.as_deref());

    let quiz_id = match quiz_id {
        Some(id) => id.to_string(),
        None => service.create_quiz(question_count).await?.quiz_id,
    };

    let (metadata, questions) = service
        .get_quiz_questions(&quiz_id, create_if_missing, question_count)
        .await?;
    bank.add_questions(&questions);

    let attempt_scores = match non_blank(params.username.as_deref()) {
        Some(username) => Some(
            service
                .get_attempt_scores(&metadata.quiz_id, username)
                .await?,
        ),
        None => None,
    };

    Ok(QuestionsResponse {
        quiz_id: metadata.quiz_id,
        question_count: questions.len(),
        questions: to_question_responses(&questions, attempt_scores.as_ref()),
    })
}

/// `GET /questions`. Without a quiz id a brand new quiz is created.
pub async fn get_questions(
    State(service): State<Arc<QuizService>>,
    State(bank): State<Arc<QuestionBank>>,
    Query(params): Query<QuestionsParams>,
) -> Result<impl IntoResponse, AppError> {
    let quiz_id = non_blank(params.quiz_id.as_deref()).map(str::to_string);
    let response = serve_questions(&service, &bank, quiz_id.as_deref(), &params).await?;
    Ok(Json(response))
}

/// `GET /quizzes/{quiz_id}/questions`
pub async fn get_quiz_questions(
    State(service): State<Arc<QuizService>>,
    State(bank): State<Arc<QuestionBank>>,
    Path(quiz_id): Path<String>,
    Query(params): Query<QuestionsParams>,
) -> Result<impl IntoResponse, AppError> {
    let response = serve_questions(&service, &bank, Some(&quiz_id), &params).await?;
    Ok(Json(response))
}

/// `POST /responses`
///
/// With both `quiz_id` and `username` the answers are recorded and count toward
/// the leaderboard. Otherwise they are only scored and a warning is attached.
pub async fn submit_responses(
    State(service): State<Arc<QuizService>>,
    State(bank): State<Arc<QuestionBank>>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: ResponsesRequest = serde_json::from_slice(&body)?;
    payload.validate()?;

    let responses = payload.responses.unwrap_or_default();
    let quiz_id = non_blank(payload.quiz_id.as_deref());
    let username = non_blank(payload.username.as_deref());

    let response = match (quiz_id, username) {
        (Some(quiz_id), Some(username)) => ResponsesResponse {
            results: service.submit_responses(quiz_id, username, &responses).await?,
            warnings: Vec::new(),
        },
        (Some(quiz_id), None) => ResponsesResponse {
            results: service.evaluate_responses_for_quiz(quiz_id, &responses).await?,
            warnings: vec![UNLINKED_WARNING.to_string()],
        },
        (None, _) => ResponsesResponse {
            results: bank.evaluate_responses(&responses),
            warnings: vec![UNLINKED_WARNING.to_string()],
        },
    };

    Ok(Json(response))
}

/// `POST /quizzes`. An empty body creates a quiz of the default size.
pub async fn create_quiz(
    State(service): State<Arc<QuizService>>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload = if body.iter().all(u8::is_ascii_whitespace) {
        CreateQuizRequest::default()
    } else {
        serde_json::from_slice::<CreateQuizRequest>(&body)?
    };
    payload.validate()?;

    let question_count = payload.question_count.unwrap_or(0) as usize;
    let metadata = service.create_quiz(question_count).await?;

    Ok((StatusCode::CREATED, Json(QuizSummary::from(metadata))))
}

/// `GET /quizzes/active`
pub async fn list_active_quizzes(
    State(service): State<Arc<QuizService>>,
    Query(params): Query<LimitParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = parse_positive_param("limit", params.limit.as_deref(), DEFAULT_LIST_LIMIT)?;
    let quizzes = service.list_active_quizzes(limit).await?;

    Ok(Json(ActiveQuizzesResponse {
        quizzes: quizzes.into_iter().map(QuizSummary::from).collect(),
    }))
}

/// `GET /quizzes/{quiz_id}/leaderboard`
pub async fn get_leaderboard(
    State(service): State<Arc<QuizService>>,
    Path(quiz_id): Path<String>,
    Query(params): Query<LimitParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = parse_limit_param(params.limit.as_deref(), DEFAULT_LIST_LIMIT)?;
    let leaderboard = service.get_leaderboard(&quiz_id, limit).await?;

    Ok(Json(LeaderboardResponse {
        quiz_id: quiz_id.trim().to_string(),
        leaderboard,
    }))
}
