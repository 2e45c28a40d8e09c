// src/services/opentdb.rs
//
// Open Trivia DB client. Payload text is requested RFC 3986 encoded and decoded
// by the question builder.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::{
    config::DEFAULT_QUESTION_COUNT,
    error::{QuizError, QuizResult},
};

/// Question payload as returned by the provider (fields still percent-encoded).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawQuestion {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub category: String,
    pub question: String,
    pub correct_answer: String,
    #[serde(default)]
    pub incorrect_answers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    response_code: i64,
    #[serde(default)]
    results: Vec<RawQuestion>,
}

/// Source of fresh trivia questions. Any error is fatal to quiz creation.
#[async_trait]
pub trait QuestionFetcher: Send + Sync {
    async fn fetch(&self, amount: usize) -> QuizResult<Vec<RawQuestion>>;
}

#[derive(Debug, Clone)]
pub struct OpenTdbClient {
    http: reqwest::Client,
    base_url: Url,
}

impl OpenTdbClient {
    pub fn new(base_url: Url, timeout: Duration) -> QuizResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    fn request_url(&self, amount: usize) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("amount", &amount.to_string())
            .append_pair("encode", "url3986");
        url
    }
}

#[async_trait]
impl QuestionFetcher for OpenTdbClient {
    async fn fetch(&self, amount: usize) -> QuizResult<Vec<RawQuestion>> {
        let amount = if amount == 0 { DEFAULT_QUESTION_COUNT } else { amount };

        let response = self.http.get(self.request_url(amount)).send().await?;
        if !response.status().is_success() {
            return Err(QuizError::Provider(format!(
                "opentdb returned status {}",
                response.status().as_u16()
            )));
        }

        let payload: ApiResponse = response.json().await?;
        if payload.response_code != 0 {
            return Err(QuizError::Provider(format!(
                "opentdb response_code={}",
                payload.response_code
            )));
        }

        Ok(payload.results)
    }
}

/// Wraps a fetcher and logs every outbound call.
pub struct LoggedFetcher<F> {
    inner: F,
}

impl<F> LoggedFetcher<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<F: QuestionFetcher> QuestionFetcher for LoggedFetcher<F> {
    async fn fetch(&self, amount: usize) -> QuizResult<Vec<RawQuestion>> {
        let start = Instant::now();
        tracing::info!(provider = "opentdb", amount, "outbound request");

        match self.inner.fetch(amount).await {
            Ok(questions) => {
                tracing::info!(
                    provider = "opentdb",
                    amount,
                    received = questions.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "outbound success"
                );
                Ok(questions)
            }
            Err(e) => {
                tracing::warn!(
                    provider = "opentdb",
                    amount,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    error = %e,
                    "outbound error"
                );
                Err(e)
            }
        }
    }
}
