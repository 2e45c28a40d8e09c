use std::sync::Arc;

use axum::extract::FromRef;

use crate::services::{question_bank::QuestionBank, quiz_service::QuizService};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<QuizService>,
    pub bank: Arc<QuestionBank>,
}

impl AppState {
    pub fn new(service: QuizService) -> Self {
        Self {
            service: Arc::new(service),
            bank: Arc::new(QuestionBank::new()),
        }
    }
}

impl FromRef<AppState> for Arc<QuizService> {
    fn from_ref(state: &AppState) -> Self {
        state.service.clone()
    }
}

impl FromRef<AppState> for Arc<QuestionBank> {
    fn from_ref(state: &AppState) -> Self {
        state.bank.clone()
    }
}
