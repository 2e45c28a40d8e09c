// src/models/mod.rs

pub mod attempt;
pub mod dto;
pub mod quiz;
