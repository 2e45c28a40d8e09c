// src/services/quiz_service.rs

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;

use crate::{
    config::DEFAULT_QUESTION_COUNT,
    error::{QuizError, QuizResult},
    models::{
        attempt::{AttemptScores, LeaderboardEntry},
        quiz::{Question, QuizMetadata, ResponseResult, ResponseStatus, SubmittedResponse},
    },
    services::{
        cache::{QuizCache, apply_limit},
        opentdb::QuestionFetcher,
        question_bank::build_questions,
        scoring,
    },
    store::{AttemptRepository, QuizRepository},
};

const QUIZ_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const QUIZ_ID_LENGTH: usize = 10;

/// Store reads retried when a submission keeps overlapping a cache fill. The
/// last read is served uncached.
const MAX_FILL_ATTEMPTS: usize = 3;

/// Trims and lower-cases a username; empty results are rejected.
pub fn normalize_username(username: &str) -> QuizResult<String> {
    let normalized = username.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(QuizError::InvalidUsername);
    }
    Ok(normalized)
}

/// Random quiz id of the form `qz_xxxxxxxxxx`.
pub fn generate_quiz_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..QUIZ_ID_LENGTH)
        .map(|_| QUIZ_ID_ALPHABET[rng.gen_range(0..QUIZ_ID_ALPHABET.len())] as char)
        .collect();
    format!("qz_{suffix}")
}

/// Orchestrates the quiz catalog, the attempt store, the question provider and
/// the read cache. One instance is shared by all request handlers.
pub struct QuizService {
    quizzes: Arc<dyn QuizRepository>,
    attempts: Arc<dyn AttemptRepository>,
    fetcher: Option<Arc<dyn QuestionFetcher>>,
    cache: QuizCache,
}

impl QuizService {
    pub fn new(
        quizzes: Arc<dyn QuizRepository>,
        attempts: Arc<dyn AttemptRepository>,
        fetcher: Option<Arc<dyn QuestionFetcher>>,
    ) -> Self {
        Self {
            quizzes,
            attempts,
            fetcher,
            cache: QuizCache::new(),
        }
    }

    pub fn cache(&self) -> &QuizCache {
        &self.cache
    }

    /// Creates a quiz under a freshly generated id.
    pub async fn create_quiz(&self, question_count: usize) -> QuizResult<QuizMetadata> {
        let quiz_id = generate_quiz_id();
        self.create_quiz_with_id(&quiz_id, question_count).await
    }

    /// Resolves quiz metadata, creating the quiz when asked to and it is missing.
    pub async fn ensure_quiz(
        &self,
        quiz_id: &str,
        create_if_missing: bool,
        question_count: usize,
    ) -> QuizResult<QuizMetadata> {
        let quiz_id = quiz_id.trim();
        if quiz_id.is_empty() {
            return Err(QuizError::QuizNotFound);
        }

        if let Some(metadata) = self.cache.metadata(quiz_id) {
            return Ok(metadata);
        }

        match self.quizzes.get_quiz_metadata(quiz_id).await {
            Ok(metadata) => {
                self.cache.set_metadata(metadata.clone());
                Ok(metadata)
            }
            Err(QuizError::QuizNotFound) if create_if_missing => {
                self.create_quiz_with_id(quiz_id, question_count).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_quiz_questions(
        &self,
        quiz_id: &str,
        create_if_missing: bool,
        question_count: usize,
    ) -> QuizResult<(QuizMetadata, Arc<Vec<Question>>)> {
        if let Some(cached) = self.cache.quiz(quiz_id.trim()) {
            return Ok(cached);
        }

        let metadata = self.ensure_quiz(quiz_id, create_if_missing, question_count).await?;
        if let Some(cached) = self.cache.quiz(&metadata.quiz_id) {
            return Ok(cached);
        }

        let questions = Arc::new(self.quizzes.get_quiz_questions(&metadata.quiz_id).await?);
        self.cache.set_quiz(metadata.clone(), Arc::clone(&questions));
        Ok((metadata, questions))
    }

    /// Scores answers against a quiz's question set without persisting them.
    pub async fn evaluate_responses_for_quiz(
        &self,
        quiz_id: &str,
        responses: &[SubmittedResponse],
    ) -> QuizResult<Vec<ResponseResult>> {
        let (_, questions) = self.get_quiz_questions(quiz_id, false, 0).await?;
        let lookup: HashMap<&str, &Question> = questions
            .iter()
            .map(|q| (q.question_id.as_str(), q))
            .collect();

        Ok(responses
            .iter()
            .map(|response| {
                let status = match lookup.get(response.question_id.as_str()) {
                    Some(question) => scoring::evaluate_question(question, &response.answer).status(),
                    None => ResponseStatus::InvalidQuestion,
                };
                ResponseResult::new(response.question_id.clone(), status)
            })
            .collect())
    }

    /// Records answers durably and patches any cached leaderboard/score view.
    pub async fn submit_responses(
        &self,
        quiz_id: &str,
        username: &str,
        responses: &[SubmittedResponse],
    ) -> QuizResult<Vec<ResponseResult>> {
        let metadata = self.ensure_quiz(quiz_id, false, 0).await?;
        let username = normalize_username(username)?;

        // Registered before the write so concurrent cache fills can see it.
        let pending = self.cache.begin_write(&metadata.quiz_id);
        let results = self
            .attempts
            .submit_responses(&metadata.quiz_id, &username, responses)
            .await?;
        pending.finish(&username, &results, Utc::now());

        tracing::info!(
            quiz_id = %metadata.quiz_id,
            username = %username,
            submitted = responses.len(),
            accepted = results.iter().filter(|r| r.status.is_new_answer()).count(),
            "responses submitted"
        );
        Ok(results)
    }

    /// `limit <= 0` returns the whole leaderboard.
    pub async fn get_leaderboard(&self, quiz_id: &str, limit: i64) -> QuizResult<Vec<LeaderboardEntry>> {
        let metadata = self.ensure_quiz(quiz_id, false, 0).await?;
        let quiz_id = metadata.quiz_id.as_str();

        let mut attempt = 1;
        loop {
            if let Some(entries) = self.cache.leaderboard(quiz_id, limit) {
                return Ok(entries);
            }

            let seen = self.cache.write_stamp(quiz_id);
            let entries = self.attempts.leaderboard(quiz_id).await?;
            let limited = apply_limit(&entries, limit).to_vec();
            if self.cache.install_leaderboard(quiz_id, entries, seen) || attempt == MAX_FILL_ATTEMPTS {
                return Ok(limited);
            }
            tracing::debug!(quiz_id, attempt, "leaderboard fill overlapped a submission; re-reading");
            attempt += 1;
        }
    }

    pub async fn get_attempt_scores(&self, quiz_id: &str, username: &str) -> QuizResult<AttemptScores> {
        let metadata = self.ensure_quiz(quiz_id, false, 0).await?;
        let username = normalize_username(username)?;
        let quiz_id = metadata.quiz_id.as_str();

        let mut attempt = 1;
        loop {
            if let Some(scores) = self.cache.attempt_scores(quiz_id, &username) {
                return Ok(scores);
            }

            let seen = self.cache.write_stamp(quiz_id);
            let scores = self.attempts.attempt_scores(quiz_id, &username).await?;
            if self
                .cache
                .install_attempt_scores(quiz_id, &username, scores.clone(), seen)
                || attempt == MAX_FILL_ATTEMPTS
            {
                return Ok(scores);
            }
            attempt += 1;
        }
    }

    pub async fn list_active_quizzes(&self, limit: i64) -> QuizResult<Vec<QuizMetadata>> {
        self.quizzes.list_recent_quizzes(limit).await
    }

    async fn create_quiz_with_id(&self, quiz_id: &str, question_count: usize) -> QuizResult<QuizMetadata> {
        let fetcher = self.fetcher.as_ref().ok_or(QuizError::FetcherUnavailable)?;

        if let Some(metadata) = self.cache.metadata(quiz_id) {
            return Ok(metadata);
        }

        match self.quizzes.get_quiz_metadata(quiz_id).await {
            Ok(existing) => {
                self.cache.set_metadata(existing.clone());
                return Ok(existing);
            }
            Err(QuizError::QuizNotFound) => {}
            Err(e) => return Err(e),
        }

        let question_count = if question_count == 0 {
            DEFAULT_QUESTION_COUNT
        } else {
            question_count
        };
        let raw = fetcher.fetch(question_count).await.inspect_err(|e| {
            tracing::warn!(quiz_id, error = %e, "question fetch failed; quiz not created");
        })?;

        let questions = build_questions(&raw);
        let metadata = QuizMetadata {
            quiz_id: quiz_id.to_string(),
            question_count: questions.len() as i64,
            created_at: Utc::now(),
        };

        if let Err(e) = self.quizzes.create_quiz(&metadata, &questions).await {
            // Lost a creation race: serve whichever quiz won.
            return match self.quizzes.get_quiz_metadata(quiz_id).await {
                Ok(existing) => {
                    self.cache.set_metadata(existing.clone());
                    Ok(existing)
                }
                Err(_) => Err(e),
            };
        }

        self.cache.reset_quiz(quiz_id);
        self.cache.set_quiz(metadata.clone(), Arc::new(questions));
        tracing::info!(quiz_id, question_count = metadata.question_count, "quiz created");
        Ok(metadata)
    }
}
