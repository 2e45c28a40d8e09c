// src/models/dto.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{
    attempt::{AttemptScores, LeaderboardEntry},
    quiz::{Question, QuizMetadata, QuizOption, ResponseResult, SubmittedResponse},
};

/// Upper bound on how many questions a single quiz may request from the provider.
pub const MAX_QUESTION_COUNT: i64 = 50;

/// Query parameters shared by the question listing endpoints.
/// Kept as raw strings so malformed numbers can be reported as 400s.
#[derive(Debug, Default, Deserialize)]
pub struct QuestionsParams {
    pub quiz_id: Option<String>,
    pub username: Option<String>,
    pub create_if_missing: Option<String>,
    pub question_count: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<String>,
}

/// Question as served to clients, with the caller's attempt state attached.
#[derive(Debug, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub question_id: String,
    pub question: String,
    pub options: Vec<QuizOption>,
    /// Exposed on purpose: the user client scores locally and persists asynchronously.
    pub correct_index: usize,
    pub attempt_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_score: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuestionsResponse {
    pub quiz_id: String,
    pub question_count: usize,
    pub questions: Vec<QuestionResponse>,
}

/// DTO for submitting answers.
#[derive(Debug, Deserialize, Validate)]
pub struct ResponsesRequest {
    #[validate(length(max = 128))]
    pub quiz_id: Option<String>,

    #[validate(length(max = 64))]
    pub username: Option<String>,

    #[validate(required(message = "responses is required"), length(max = 500))]
    pub responses: Option<Vec<SubmittedResponse>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResponsesResponse {
    pub results: Vec<ResponseResult>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
}

/// DTO for creating a quiz. An absent or zero count falls back to the default.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(range(min = 0, max = 50))]
    #[serde(default)]
    pub question_count: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuizSummary {
    pub quiz_id: String,
    pub question_count: i64,
    pub created_at: DateTime<Utc>,
}

impl From<QuizMetadata> for QuizSummary {
    fn from(metadata: QuizMetadata) -> Self {
        Self {
            quiz_id: metadata.quiz_id,
            question_count: metadata.question_count,
            created_at: metadata.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActiveQuizzesResponse {
    pub quizzes: Vec<QuizSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    pub quiz_id: String,
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// Attaches the caller's previous scores (if any) to each question.
pub fn to_question_responses(
    questions: &[Question],
    attempt_scores: Option<&AttemptScores>,
) -> Vec<QuestionResponse> {
    questions
        .iter()
        .map(|question| {
            let attempt_score =
                attempt_scores.and_then(|scores| scores.get(&question.question_id).copied());
            let attempt_status = if attempt_score.is_some() {
                "already_attempted"
            } else {
                "not_attempted"
            };

            QuestionResponse {
                question_id: question.question_id.clone(),
                question: question.prompt.clone(),
                options: question.options.clone(),
                correct_index: question.correct_index,
                attempt_status: attempt_status.to_string(),
                attempt_score,
            }
        })
        .collect()
}
