// src/utils/mod.rs

pub mod params;
pub mod time;
