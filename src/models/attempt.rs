// src/models/attempt.rs

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scores of one user's attempts in one quiz, keyed by question id.
pub type AttemptScores = HashMap<String, f64>;

/// Aggregated per-user standing in a quiz.
/// Derived from the 'attempts' table; never persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub username: String,
    pub total_score: f64,
    pub answered_count: i64,
    pub last_submission_at: DateTime<Utc>,
}

impl LeaderboardEntry {
    /// Ranking order shared by the SQL aggregation and the in-memory cache:
    /// higher score first, then earlier last submission, then username.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .total_score
            .total_cmp(&self.total_score)
            .then_with(|| self.last_submission_at.cmp(&other.last_submission_at))
            .then_with(|| self.username.cmp(&other.username))
    }

    pub fn ranks_before(&self, other: &Self) -> bool {
        self.rank_cmp(other) == Ordering::Less
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(username: &str, score: f64, ts: i64) -> LeaderboardEntry {
        LeaderboardEntry {
            username: username.to_string(),
            total_score: score,
            answered_count: score as i64,
            last_submission_at: DateTime::from_timestamp(ts, 0).unwrap(),
        }
    }

    #[test]
    fn ties_break_on_time_then_username() {
        let mut entries = vec![
            entry("dave", 1.0, 500),
            entry("bob", 2.0, 400),
            entry("carol", 1.0, 500),
            entry("alice", 2.0, 200),
        ];
        entries.sort_by(LeaderboardEntry::rank_cmp);

        let names: Vec<&str> = entries.iter().map(|e| e.username.as_str()).collect();
        assert_eq!(names, ["alice", "bob", "carol", "dave"]);
    }

    #[test]
    fn identical_entries_do_not_rank_before_each_other() {
        let a = entry("alice", 1.0, 10);
        assert!(!a.ranks_before(&a.clone()));
    }
}
