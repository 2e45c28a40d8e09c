// src/services/cache.rs
//
// Process-local read cache owned by one QuizService. Entries are filled lazily on
// read and only patched on write; there is no eviction. A fill whose store
// read overlapped a submission is discarded, so a patch is never lost.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};

use crate::models::{
    attempt::{AttemptScores, LeaderboardEntry},
    quiz::{Question, QuizMetadata, ResponseResult, ResponseStatus},
};

/// Returns the first `limit` entries; `limit <= 0` or past the end means all of them.
pub fn apply_limit(entries: &[LeaderboardEntry], limit: i64) -> &[LeaderboardEntry] {
    match usize::try_from(limit) {
        Ok(limit) if limit > 0 && limit < entries.len() => &entries[..limit],
        _ => entries,
    }
}

/// A leaderboard kept in rank order, with a username index for O(1) lookup.
#[derive(Debug, Clone, Default)]
pub struct RankedLeaderboard {
    ordered: Vec<LeaderboardEntry>,
    index_by_user: HashMap<String, usize>,
}

impl RankedLeaderboard {
    /// `entries` must already be in rank order (as returned by the attempt store).
    pub fn new(entries: Vec<LeaderboardEntry>) -> Self {
        let index_by_user = entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (entry.username.clone(), idx))
            .collect();
        Self {
            ordered: entries,
            index_by_user,
        }
    }

    pub fn entries(&self) -> &[LeaderboardEntry] {
        &self.ordered
    }

    pub fn position(&self, username: &str) -> Option<usize> {
        self.index_by_user.get(username).copied()
    }

    /// Folds one submission's results into the user's row and restores rank order.
    /// Returns false when the results carry no new answers.
    pub fn record_submission(
        &mut self,
        username: &str,
        results: &[ResponseResult],
        now: DateTime<Utc>,
    ) -> bool {
        // Binary scoring today: correct=1, incorrect=0.
        let mut new_answers = 0i64;
        let mut score_delta = 0.0;
        for result in results {
            match result.status {
                ResponseStatus::Correct => {
                    new_answers += 1;
                    score_delta += 1.0;
                }
                ResponseStatus::Incorrect => new_answers += 1,
                _ => {}
            }
        }
        if new_answers == 0 {
            return false;
        }

        let idx = match self.position(username) {
            Some(idx) => {
                let entry = &mut self.ordered[idx];
                entry.total_score += score_delta;
                entry.answered_count += new_answers;
                entry.last_submission_at = now;
                idx
            }
            None => {
                self.ordered.push(LeaderboardEntry {
                    username: username.to_string(),
                    total_score: score_delta,
                    answered_count: new_answers,
                    last_submission_at: now,
                });
                let idx = self.ordered.len() - 1;
                self.index_by_user.insert(username.to_string(), idx);
                idx
            }
        };

        self.bubble(idx);
        true
    }

    /// Only the row at `idx` changed, so walking it into place restores the
    /// total order in O(distance moved).
    fn bubble(&mut self, mut idx: usize) {
        while idx > 0 && self.ordered[idx].ranks_before(&self.ordered[idx - 1]) {
            self.swap(idx, idx - 1);
            idx -= 1;
        }

        while idx + 1 < self.ordered.len() && self.ordered[idx + 1].ranks_before(&self.ordered[idx]) {
            self.swap(idx, idx + 1);
            idx += 1;
        }
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.ordered.swap(i, j);
        self.index_by_user.insert(self.ordered[i].username.clone(), i);
        self.index_by_user.insert(self.ordered[j].username.clone(), j);
    }
}

/// Applies a submission's results to a user's cached per-question scores.
pub fn patch_attempt_scores(scores: &mut AttemptScores, results: &[ResponseResult]) {
    for result in results {
        match result.status {
            ResponseStatus::Correct => {
                scores.insert(result.question_id.clone(), 1.0);
            }
            ResponseStatus::Incorrect => {
                scores.insert(result.question_id.clone(), 0.0);
            }
            ResponseStatus::AlreadyAnswered => {
                if let Some(previous) = result.attempt_score {
                    scores.insert(result.question_id.clone(), previous);
                }
            }
            ResponseStatus::InvalidQuestion | ResponseStatus::InvalidLetter => {}
        }
    }
}

/// Per-quiz write bookkeeping. `generation` moves whenever a submission starts
/// or ends (or the quiz is reset); `in_flight` counts submissions between the
/// two. A store read may only be installed if neither moved while it ran.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteStamp {
    generation: u64,
    in_flight: u32,
}

impl WriteStamp {
    fn is_quiet(&self) -> bool {
        self.in_flight == 0
    }
}

/// Each map is sharded; a write guard on a quiz's leaderboard entry is the
/// critical section for its repair. Guards are never held across an await.
#[derive(Debug, Default)]
pub struct QuizCache {
    metadata: DashMap<String, QuizMetadata>,
    questions: DashMap<String, Arc<Vec<Question>>>,
    leaderboards: DashMap<String, RankedLeaderboard>,
    attempt_scores: DashMap<(String, String), AttemptScores>,
    writes: DashMap<String, WriteStamp>,
}

impl QuizCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(&self, quiz_id: &str) -> Option<QuizMetadata> {
        self.metadata.get(quiz_id).map(|m| m.value().clone())
    }

    pub fn set_metadata(&self, metadata: QuizMetadata) {
        self.metadata.insert(metadata.quiz_id.clone(), metadata);
    }

    /// Metadata and questions together; a hit requires both.
    pub fn quiz(&self, quiz_id: &str) -> Option<(QuizMetadata, Arc<Vec<Question>>)> {
        let metadata = self.metadata(quiz_id)?;
        let questions = self.questions.get(quiz_id).map(|q| Arc::clone(q.value()))?;
        Some((metadata, questions))
    }

    pub fn set_quiz(&self, metadata: QuizMetadata, questions: Arc<Vec<Question>>) {
        self.questions.insert(metadata.quiz_id.clone(), questions);
        self.set_metadata(metadata);
    }

    /// Drops derived state for a quiz whose question set was (re)written.
    /// Fills that were already reading the old state are invalidated too.
    pub fn reset_quiz(&self, quiz_id: &str) {
        self.writes.entry(quiz_id.to_string()).or_default().generation += 1;
        self.leaderboards.remove(quiz_id);
        self.attempt_scores.retain(|(cached_quiz, _), _| cached_quiz != quiz_id);
    }

    /// Taken before a store read whose result will be offered to an `install_*` call.
    pub fn write_stamp(&self, quiz_id: &str) -> WriteStamp {
        self.writes.get(quiz_id).map(|s| *s).unwrap_or_default()
    }

    fn is_unchanged_since(&self, quiz_id: &str, seen: WriteStamp) -> bool {
        let current = self.write_stamp(quiz_id);
        current == seen && current.is_quiet()
    }

    pub fn leaderboard(&self, quiz_id: &str, limit: i64) -> Option<Vec<LeaderboardEntry>> {
        self.leaderboards
            .get(quiz_id)
            .map(|board| apply_limit(board.entries(), limit).to_vec())
    }

    /// Caches a store aggregate unless a board is already present or a
    /// submission overlapped the read. Returns whether it was installed.
    pub fn install_leaderboard(
        &self,
        quiz_id: &str,
        entries: Vec<LeaderboardEntry>,
        seen: WriteStamp,
    ) -> bool {
        match self.leaderboards.entry(quiz_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                if !self.is_unchanged_since(quiz_id, seen) {
                    return false;
                }
                slot.insert(RankedLeaderboard::new(entries));
                true
            }
        }
    }

    pub fn has_leaderboard(&self, quiz_id: &str) -> bool {
        self.leaderboards.contains_key(quiz_id)
    }

    pub fn attempt_scores(&self, quiz_id: &str, username: &str) -> Option<AttemptScores> {
        self.attempt_scores
            .get(&(quiz_id.to_string(), username.to_string()))
            .map(|s| s.value().clone())
    }

    /// Same rules as `install_leaderboard`, for one user's score map.
    pub fn install_attempt_scores(
        &self,
        quiz_id: &str,
        username: &str,
        scores: AttemptScores,
        seen: WriteStamp,
    ) -> bool {
        match self
            .attempt_scores
            .entry((quiz_id.to_string(), username.to_string()))
        {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                if !self.is_unchanged_since(quiz_id, seen) {
                    return false;
                }
                slot.insert(scores);
                true
            }
        }
    }

    /// Marks a submission as in flight for `quiz_id`. Must be taken before the
    /// store write starts; dropping the returned guard (on error or
    /// cancellation) releases it without patching.
    pub fn begin_write(&self, quiz_id: &str) -> PendingWrite<'_> {
        {
            let mut stamp = self.writes.entry(quiz_id.to_string()).or_default();
            stamp.generation += 1;
            stamp.in_flight += 1;
        }
        PendingWrite {
            cache: self,
            quiz_id: quiz_id.to_string(),
        }
    }
}

/// An in-flight submission against one quiz.
#[derive(Debug)]
pub struct PendingWrite<'a> {
    cache: &'a QuizCache,
    quiz_id: String,
}

impl PendingWrite<'_> {
    /// Patches whatever is already materialized for this quiz and user, then
    /// releases the write. Nothing is created here; missing entries are
    /// rebuilt on the next read.
    pub fn finish(self, username: &str, results: &[ResponseResult], now: DateTime<Utc>) {
        if let Some(mut board) = self.cache.leaderboards.get_mut(&self.quiz_id) {
            board.record_submission(username, results, now);
        }

        let key = (self.quiz_id.clone(), username.to_string());
        if let Some(mut scores) = self.cache.attempt_scores.get_mut(&key) {
            patch_attempt_scores(&mut scores, results);
        }
    }
}

impl Drop for PendingWrite<'_> {
    fn drop(&mut self) {
        let mut stamp = self.cache.writes.entry(self.quiz_id.clone()).or_default();
        stamp.generation += 1;
        stamp.in_flight = stamp.in_flight.saturating_sub(1);
    }
}
