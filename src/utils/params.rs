// src/utils/params.rs
//
// Query-string helpers. Values arrive as raw strings so that malformed numbers
// surface as 400s with a readable message instead of an extractor rejection.

use crate::{config::parse_flag, error::AppError};

/// Missing or blank values count as "not set".
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub fn parse_bool_param(value: Option<&str>) -> bool {
    value.map(parse_flag).unwrap_or(false)
}

/// Parses a strictly positive integer, falling back to `default` when absent.
pub fn parse_positive_param(key: &str, value: Option<&str>, default: i64) -> Result<i64, AppError> {
    let Some(value) = non_blank(value) else {
        return Ok(default);
    };

    match value.parse::<i64>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(AppError::BadRequest(format!("{key} must be a positive integer"))),
    }
}

/// Leaderboard limits accept any integer; `<= 0` means the whole leaderboard.
pub fn parse_limit_param(value: Option<&str>, default: i64) -> Result<i64, AppError> {
    let Some(value) = non_blank(value) else {
        return Ok(default);
    };

    value
        .parse::<i64>()
        .map_err(|_| AppError::BadRequest("limit must be an integer".to_string()))
}
