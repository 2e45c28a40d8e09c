//! Durable storage interfaces consumed by the quiz service.
//!
//! The quiz catalog (metadata + ordered questions) and the attempt log are kept
//! behind separate traits so the service can be exercised against fakes.

pub mod sqlite;

use async_trait::async_trait;

use crate::{
    error::QuizResult,
    models::{
        attempt::{AttemptScores, LeaderboardEntry},
        quiz::{Question, QuizMetadata, ResponseResult, SubmittedResponse},
    },
};

pub use sqlite::SqliteStore;

/// Quiz catalog: quiz metadata and the ordered question list of each quiz.
#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Creates or wholesale replaces a quiz. Replacing also erases every attempt
    /// recorded against that quiz id.
    async fn create_quiz(&self, metadata: &QuizMetadata, questions: &[Question]) -> QuizResult<()>;

    /// Fails with `QuizNotFound` for an unknown id.
    async fn get_quiz_metadata(&self, quiz_id: &str) -> QuizResult<QuizMetadata>;

    /// Questions in quiz order. Fails with `QuizNotFound` for an unknown id.
    async fn get_quiz_questions(&self, quiz_id: &str) -> QuizResult<Vec<Question>>;

    async fn quiz_exists(&self, quiz_id: &str) -> QuizResult<bool>;

    /// Most recently created quizzes first.
    async fn list_recent_quizzes(&self, limit: i64) -> QuizResult<Vec<QuizMetadata>>;
}

/// Attempt log: the source of truth for scores and leaderboards.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Records a batch of answers atomically. Each (quiz, question, user) is
    /// written at most once; later submissions report `already_answered`
    /// with the first persisted score.
    async fn submit_responses(
        &self,
        quiz_id: &str,
        username_normalized: &str,
        responses: &[SubmittedResponse],
    ) -> QuizResult<Vec<ResponseResult>>;

    /// Full ranked leaderboard. Fails with `QuizNotFound` for an unknown id.
    async fn leaderboard(&self, quiz_id: &str) -> QuizResult<Vec<LeaderboardEntry>>;

    async fn attempt_scores(
        &self,
        quiz_id: &str,
        username_normalized: &str,
    ) -> QuizResult<AttemptScores>;
}
