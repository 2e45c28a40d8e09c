// src/services/question_bank.rs

use dashmap::DashMap;
use percent_encoding::percent_decode_str;
use rand::{Rng, seq::SliceRandom};
use sha2::{Digest, Sha256};

use crate::{
    models::quiz::{Question, QuizOption, ResponseResult, ResponseStatus, SubmittedResponse},
    services::{opentdb::RawQuestion, scoring},
};

/// Builds stored questions from provider payloads, shuffling option order.
pub fn build_questions(raw: &[RawQuestion]) -> Vec<Question> {
    build_questions_with_rng(raw, &mut rand::thread_rng())
}

pub fn build_questions_with_rng<R: Rng + ?Sized>(raw: &[RawQuestion], rng: &mut R) -> Vec<Question> {
    raw.iter()
        .map(|item| {
            let mut question = build_question(item, rng);
            question.question_id = make_question_id(&question);
            question
        })
        .collect()
}

/// One option per letter A through Z.
const MAX_OPTIONS: usize = 26;

fn build_question<R: Rng + ?Sized>(raw: &RawQuestion, rng: &mut R) -> Question {
    // Extra incorrect answers past the letter range are dropped.
    let mut choices: Vec<(String, bool)> = raw
        .incorrect_answers
        .iter()
        .take(MAX_OPTIONS - 1)
        .map(|text| (decode_text(text), false))
        .collect();
    choices.push((decode_text(&raw.correct_answer), true));
    choices.shuffle(rng);

    let mut correct_index = 0;
    let options = choices
        .into_iter()
        .enumerate()
        .map(|(idx, (text, is_correct))| {
            if is_correct {
                correct_index = idx;
            }
            QuizOption {
                letter: option_letter(idx),
                text,
            }
        })
        .collect();

    Question {
        question_id: String::new(),
        prompt: decode_text(&raw.question),
        options,
        correct_index,
    }
}

/// Content hash over the prompt and the ordered option texts.
///
/// Reordering options yields a different id for otherwise identical content.
pub fn make_question_id(question: &Question) -> String {
    let mut hasher = Sha256::new();
    hasher.update(question.prompt.as_bytes());
    for option in &question.options {
        hasher.update(b"|");
        hasher.update(option.text.as_bytes());
    }
    format!("q_{}", hex::encode(hasher.finalize()))
}

fn option_letter(idx: usize) -> String {
    debug_assert!(idx < MAX_OPTIONS);
    char::from(b'A' + idx as u8).to_string()
}

fn decode_text(text: &str) -> String {
    percent_decode_str(text).decode_utf8_lossy().into_owned()
}

/// Process-wide question lookup used to score answers when no quiz context exists.
#[derive(Debug, Default)]
pub struct QuestionBank {
    questions: DashMap<String, Question>,
}

impl QuestionBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers already-built questions, filling in missing ids.
    pub fn add_questions(&self, questions: &[Question]) {
        for question in questions {
            let mut question = question.clone();
            if question.question_id.is_empty() {
                question.question_id = make_question_id(&question);
            }
            self.questions.insert(question.question_id.clone(), question);
        }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Scores responses without persisting anything.
    pub fn evaluate_responses(&self, responses: &[SubmittedResponse]) -> Vec<ResponseResult> {
        responses
            .iter()
            .map(|response| {
                let status = match self.questions.get(&response.question_id) {
                    Some(question) => scoring::evaluate_question(&question, &response.answer).status(),
                    None => ResponseStatus::InvalidQuestion,
                };
                ResponseResult::new(response.question_id.clone(), status)
            })
            .collect()
    }
}
