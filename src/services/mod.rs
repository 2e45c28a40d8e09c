// src/services/mod.rs

pub mod cache;
pub mod opentdb;
pub mod question_bank;
pub mod quiz_service;
pub mod scoring;
