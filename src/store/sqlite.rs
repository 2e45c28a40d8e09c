// src/store/sqlite.rs

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

use crate::{
    config::DEFAULT_LIST_LIMIT,
    error::{QuizError, QuizResult},
    models::{
        attempt::{AttemptScores, LeaderboardEntry},
        quiz::{Question, QuizMetadata, QuizOption, ResponseResult, ResponseStatus, SubmittedResponse},
    },
    services::{question_bank::make_question_id, scoring},
    store::{AttemptRepository, QuizRepository},
    utils::time::{from_unix_nanos, to_unix_nanos},
};

/// No foreign keys: quiz overwrite/reset is fully driven by application transactions.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS quizzes (
        quiz_id TEXT PRIMARY KEY,
        created_at_unix INTEGER NOT NULL,
        question_count INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS questions (
        question_id TEXT PRIMARY KEY,
        prompt TEXT NOT NULL,
        options_json TEXT NOT NULL,
        correct_index INTEGER NOT NULL,
        option_count INTEGER NOT NULL,
        source TEXT NOT NULL,
        created_at_unix INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS quiz_questions (
        quiz_id TEXT NOT NULL,
        question_id TEXT NOT NULL,
        position INTEGER NOT NULL,
        PRIMARY KEY (quiz_id, position),
        UNIQUE (quiz_id, question_id)
    )
    "#,
    // REAL leaves room for partial credit without a migration.
    r#"
    CREATE TABLE IF NOT EXISTS attempts (
        quiz_id TEXT NOT NULL,
        question_id TEXT NOT NULL,
        username_norm TEXT NOT NULL,
        answer_letter TEXT NOT NULL,
        score REAL NOT NULL,
        submitted_at_unix INTEGER NOT NULL,
        PRIMARY KEY (quiz_id, question_id, username_norm)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_quizzes_created_at ON quizzes(created_at_unix DESC)",
    "CREATE INDEX IF NOT EXISTS idx_attempts_quiz_user ON attempts(quiz_id, username_norm)",
    "CREATE INDEX IF NOT EXISTS idx_attempts_quiz_submitted_at ON attempts(quiz_id, submitted_at_unix)",
];

/// Answer key of one question, as needed for scoring.
struct AnswerKey {
    correct_index: usize,
    option_count: usize,
}

/// SQLite-backed quiz catalog and attempt store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `database_url` and applies the schema.
    pub async fn connect(database_url: &str) -> QuizResult<Self> {
        let mut options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));
        if !database_url.contains(":memory:") {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // One connection serializes writers; SQLite allows a single writer anyway.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> QuizResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> QuizResult<()> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn to_index(value: i64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

#[async_trait]
impl QuizRepository for SqliteStore {
    async fn create_quiz(&self, metadata: &QuizMetadata, questions: &[Question]) -> QuizResult<()> {
        if metadata.quiz_id.is_empty() {
            return Err(QuizError::MissingQuizId);
        }

        let question_count = if metadata.question_count <= 0 {
            questions.len() as i64
        } else {
            metadata.question_count
        };
        let created_at_unix = to_unix_nanos(metadata.created_at);

        let mut tx = self.pool.begin().await?;

        // Question identities may change on overwrite, so prior attempts are void.
        sqlx::query("DELETE FROM quiz_questions WHERE quiz_id = ?")
            .bind(&metadata.quiz_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM attempts WHERE quiz_id = ?")
            .bind(&metadata.quiz_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT OR REPLACE INTO quizzes (quiz_id, created_at_unix, question_count) VALUES (?, ?, ?)",
        )
        .bind(&metadata.quiz_id)
        .bind(created_at_unix)
        .bind(question_count)
        .execute(&mut *tx)
        .await?;

        for (position, question) in questions.iter().enumerate() {
            let question_id = if question.question_id.is_empty() {
                make_question_id(question)
            } else {
                question.question_id.clone()
            };
            let options_json = serde_json::to_string(&question.options)?;

            sqlx::query(
                r#"
                INSERT INTO questions (question_id, prompt, options_json, correct_index, option_count, source, created_at_unix)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(question_id) DO UPDATE SET
                    prompt = excluded.prompt,
                    options_json = excluded.options_json,
                    correct_index = excluded.correct_index,
                    option_count = excluded.option_count,
                    source = excluded.source
                "#,
            )
            .bind(&question_id)
            .bind(&question.prompt)
            .bind(options_json)
            .bind(question.correct_index as i64)
            .bind(question.options.len() as i64)
            .bind("opentdb")
            .bind(created_at_unix)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO quiz_questions (quiz_id, question_id, position) VALUES (?, ?, ?)")
                .bind(&metadata.quiz_id)
                .bind(&question_id)
                .bind(position as i64)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_quiz_metadata(&self, quiz_id: &str) -> QuizResult<QuizMetadata> {
        let row: Option<(String, i64, i64)> = sqlx::query_as(
            "SELECT quiz_id, question_count, created_at_unix FROM quizzes WHERE quiz_id = ?",
        )
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?;

        let (quiz_id, question_count, created_at_unix) = row.ok_or(QuizError::QuizNotFound)?;
        Ok(QuizMetadata {
            quiz_id,
            question_count,
            created_at: from_unix_nanos(created_at_unix),
        })
    }

    async fn get_quiz_questions(&self, quiz_id: &str) -> QuizResult<Vec<Question>> {
        let rows: Vec<(String, String, String, i64)> = sqlx::query_as(
            r#"
            SELECT q.question_id, q.prompt, q.options_json, q.correct_index
            FROM quiz_questions qq
            JOIN questions q ON q.question_id = qq.question_id
            WHERE qq.quiz_id = ?
            ORDER BY qq.position ASC
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() && !self.quiz_exists(quiz_id).await? {
            return Err(QuizError::QuizNotFound);
        }

        rows.into_iter()
            .map(|(question_id, prompt, options_json, correct_index)| {
                let options: Vec<QuizOption> = serde_json::from_str(&options_json)?;
                Ok(Question {
                    question_id,
                    prompt,
                    options,
                    correct_index: to_index(correct_index),
                })
            })
            .collect()
    }

    async fn quiz_exists(&self, quiz_id: &str) -> QuizResult<bool> {
        let found: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM quizzes WHERE quiz_id = ? LIMIT 1")
            .bind(quiz_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn list_recent_quizzes(&self, limit: i64) -> QuizResult<Vec<QuizMetadata>> {
        let limit = if limit <= 0 { DEFAULT_LIST_LIMIT } else { limit };

        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT quiz_id, question_count, created_at_unix
            FROM quizzes
            ORDER BY created_at_unix DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(quiz_id, question_count, created_at_unix)| QuizMetadata {
                quiz_id,
                question_count,
                created_at: from_unix_nanos(created_at_unix),
            })
            .collect())
    }
}

#[async_trait]
impl AttemptRepository for SqliteStore {
    /// Runs as one transaction: the answer keys are loaded and every attempt is
    /// inserted under the same unit of work, so concurrent submits for one key
    /// resolve on the primary key with `INSERT OR IGNORE` and any failure rolls
    /// the whole batch back. Dropping the future before commit also rolls back.
    async fn submit_responses(
        &self,
        quiz_id: &str,
        username_normalized: &str,
        responses: &[SubmittedResponse],
    ) -> QuizResult<Vec<ResponseResult>> {
        let mut tx = self.pool.begin().await?;

        let keys: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT q.question_id, q.correct_index, q.option_count
            FROM quiz_questions qq
            JOIN questions q ON q.question_id = qq.question_id
            WHERE qq.quiz_id = ?
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&mut *tx)
        .await?;

        let answer_keys: HashMap<String, AnswerKey> = keys
            .into_iter()
            .map(|(question_id, correct_index, option_count)| {
                (
                    question_id,
                    AnswerKey {
                        correct_index: to_index(correct_index),
                        option_count: to_index(option_count),
                    },
                )
            })
            .collect();

        if answer_keys.is_empty() {
            return Err(QuizError::QuizNotFound);
        }

        let submitted_at_unix = to_unix_nanos(Utc::now());
        let mut results = Vec::with_capacity(responses.len());

        for response in responses {
            let Some(key) = answer_keys.get(&response.question_id) else {
                results.push(ResponseResult::new(
                    response.question_id.clone(),
                    ResponseStatus::InvalidQuestion,
                ));
                continue;
            };

            let verdict = scoring::evaluate(key.correct_index, key.option_count, &response.answer);
            let Some(score) = verdict.score() else {
                results.push(ResponseResult::new(
                    response.question_id.clone(),
                    ResponseStatus::InvalidLetter,
                ));
                continue;
            };
            let letter = scoring::normalize_letter(&response.answer)
                .map(String::from)
                .unwrap_or_default();

            let inserted = sqlx::query(
                r#"
                INSERT OR IGNORE INTO attempts (quiz_id, question_id, username_norm, answer_letter, score, submitted_at_unix)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(quiz_id)
            .bind(&response.question_id)
            .bind(username_normalized)
            .bind(letter)
            .bind(score)
            .bind(submitted_at_unix)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if inserted > 0 {
                results.push(ResponseResult::new(response.question_id.clone(), verdict.status()));
                continue;
            }

            // First write wins: report the persisted score, never the new letter.
            let (previous_score,): (f64,) = sqlx::query_as(
                r#"
                SELECT score FROM attempts
                WHERE quiz_id = ? AND question_id = ? AND username_norm = ?
                LIMIT 1
                "#,
            )
            .bind(quiz_id)
            .bind(&response.question_id)
            .bind(username_normalized)
            .fetch_one(&mut *tx)
            .await?;

            results.push(ResponseResult::already_answered(
                response.question_id.clone(),
                previous_score,
            ));
        }

        tx.commit().await?;

        tracing::debug!(
            quiz_id,
            username = username_normalized,
            accepted = results.iter().filter(|r| r.status.is_new_answer()).count(),
            "attempts recorded"
        );
        Ok(results)
    }

    async fn leaderboard(&self, quiz_id: &str) -> QuizResult<Vec<LeaderboardEntry>> {
        if !self.quiz_exists(quiz_id).await? {
            return Err(QuizError::QuizNotFound);
        }

        // Ordering must match LeaderboardEntry::rank_cmp.
        let rows: Vec<(String, f64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT
                username_norm,
                CAST(SUM(score) AS REAL) AS total_score,
                COUNT(*) AS answered_count,
                CAST(MAX(submitted_at_unix) AS INTEGER) AS last_submission
            FROM attempts
            WHERE quiz_id = ?
            GROUP BY username_norm
            ORDER BY total_score DESC, last_submission ASC, username_norm ASC
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(username, total_score, answered_count, last_submission)| LeaderboardEntry {
                username,
                total_score,
                answered_count,
                last_submission_at: from_unix_nanos(last_submission),
            })
            .collect())
    }

    async fn attempt_scores(
        &self,
        quiz_id: &str,
        username_normalized: &str,
    ) -> QuizResult<AttemptScores> {
        let rows: Vec<(String, f64)> = sqlx::query_as(
            "SELECT question_id, score FROM attempts WHERE quiz_id = ? AND username_norm = ?",
        )
        .bind(quiz_id)
        .bind(username_normalized)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }
}

