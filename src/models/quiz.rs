// src/models/quiz.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents a row of the 'quizzes' table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizMetadata {
    pub quiz_id: String,
    pub question_count: i64,
    pub created_at: DateTime<Utc>,
}

/// One labelled answer option (e.g. `{"letter": "A", "text": "Paris"}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOption {
    pub letter: String,
    pub text: String,
}

/// A stored question, including the answer key.
///
/// `question_id` is derived from the prompt and the ordered option texts, so the
/// same content always hashes to the same id.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub question_id: String,
    pub prompt: String,
    pub options: Vec<QuizOption>,
    pub correct_index: usize,
}

/// One answer in a submission batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedResponse {
    pub question_id: String,
    #[serde(default)]
    pub answer: String,
}

/// Per-item outcome of a submission. Always returned inline, never raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Correct,
    Incorrect,
    InvalidQuestion,
    InvalidLetter,
    AlreadyAnswered,
}

impl ResponseStatus {
    /// True for statuses that produced a new attempt row.
    pub fn is_new_answer(self) -> bool {
        matches!(self, ResponseStatus::Correct | ResponseStatus::Incorrect)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseResult {
    pub question_id: String,
    pub status: ResponseStatus,

    /// Previously persisted score, attached only to `already_answered` results.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub attempt_score: Option<f64>,
}

impl ResponseResult {
    pub fn new(question_id: impl Into<String>, status: ResponseStatus) -> Self {
        Self {
            question_id: question_id.into(),
            status,
            attempt_score: None,
        }
    }

    pub fn already_answered(question_id: impl Into<String>, previous_score: f64) -> Self {
        Self {
            question_id: question_id.into(),
            status: ResponseStatus::AlreadyAnswered,
            attempt_score: Some(previous_score),
        }
    }
}
