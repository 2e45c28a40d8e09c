// src/services/scoring.rs
//
// Letter validation and verdicts. Shared by the durable submission path and the
// in-memory evaluators, so both score identically.

use crate::{
    error::{QuizError, QuizResult},
    models::quiz::{Question, ResponseStatus},
};

/// Correctness judgement for a single submitted letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Correct,
    Incorrect,
    InvalidLetter,
}

impl Verdict {
    /// Score persisted for an accepted answer; `None` when nothing is written.
    pub fn score(self) -> Option<f64> {
        match self {
            Verdict::Correct => Some(1.0),
            Verdict::Incorrect => Some(0.0),
            Verdict::InvalidLetter => None,
        }
    }

    pub fn status(self) -> ResponseStatus {
        match self {
            Verdict::Correct => ResponseStatus::Correct,
            Verdict::Incorrect => ResponseStatus::Incorrect,
            Verdict::InvalidLetter => ResponseStatus::InvalidLetter,
        }
    }
}

/// Trims and upper-cases the answer; yields the letter only if exactly one character remains.
pub fn normalize_letter(answer: &str) -> Option<char> {
    let normalized = answer.trim().to_uppercase();
    let mut chars = normalized.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) => Some(letter),
        _ => None,
    }
}

/// Maps a raw answer to a zero-based option index within `option_count` options.
pub fn letter_index(answer: &str, option_count: usize) -> QuizResult<usize> {
    let letter = normalize_letter(answer).ok_or(QuizError::InvalidLetter)?;
    if !letter.is_ascii_uppercase() {
        return Err(QuizError::InvalidLetter);
    }

    let index = (letter as u8 - b'A') as usize;
    if index >= option_count {
        return Err(QuizError::InvalidLetter);
    }
    Ok(index)
}

/// Scores an answer against an answer key.
pub fn evaluate(correct_index: usize, option_count: usize, answer: &str) -> Verdict {
    match letter_index(answer, option_count) {
        Ok(index) if index == correct_index => Verdict::Correct,
        Ok(_) => Verdict::Incorrect,
        Err(_) => Verdict::InvalidLetter,
    }
}

pub fn evaluate_question(question: &Question, answer: &str) -> Verdict {
    evaluate(question.correct_index, question.options.len(), answer)
}
