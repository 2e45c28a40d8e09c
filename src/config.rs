// src/config.rs

use std::env;
use std::net::SocketAddr;

use dotenvy::dotenv;
use url::Url;

/// Default number of questions fetched when a caller does not ask for a count.
pub const DEFAULT_QUESTION_COUNT: usize = 10;

/// Default size of leaderboard and active-quiz listings.
pub const DEFAULT_LIST_LIMIT: i64 = 10;

pub const DEFAULT_OPENTDB_URL: &str = "https://opentdb.com/api.php";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub rust_log: String,
    pub opentdb_url: Url,
    pub opentdb_timeout_secs: u64,
    /// Logs every outbound provider call when set.
    pub debug: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://quiz.db?mode=rwc".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .expect("BIND_ADDR must be a socket address like 0.0.0.0:8080");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let opentdb_url = env::var("OPENTDB_URL")
            .unwrap_or_else(|_| DEFAULT_OPENTDB_URL.to_string());
        let opentdb_url = Url::parse(&opentdb_url).expect("OPENTDB_URL must be a valid URL");

        let opentdb_timeout_secs = env::var("OPENTDB_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        let debug = env::var("QUIZ_DEBUG")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        Self {
            database_url,
            bind_addr,
            rust_log,
            opentdb_url,
            opentdb_timeout_secs,
            debug,
        }
    }
}

/// Accepts `1`, `true` and `yes` (any case) as an enabled flag.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}
