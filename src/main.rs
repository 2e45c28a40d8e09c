// src/main.rs

use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use quiz_arena::{
    config::Config,
    routes,
    services::{
        opentdb::{LoggedFetcher, OpenTdbClient, QuestionFetcher},
        quiz_service::QuizService,
    },
    state::AppState,
    store::SqliteStore,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file (if present)
    dotenv().ok();

    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "quiz-arena.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Open the store with retry; the schema is applied on connect.
    let mut retry_count = 0;
    let store = loop {
        match SqliteStore::connect(&config.database_url).await {
            Ok(store) => break Arc::new(store),
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    tracing::error!("Failed to open database after 5 retries: {}", e);
                    return Err(e.into());
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };
    tracing::info!(database_url = %config.database_url, "Database ready");

    let client = OpenTdbClient::new(
        config.opentdb_url.clone(),
        Duration::from_secs(config.opentdb_timeout_secs),
    )?;
    let fetcher: Arc<dyn QuestionFetcher> = if config.debug {
        Arc::new(LoggedFetcher::new(client))
    } else {
        Arc::new(client)
    };

    let service = QuizService::new(store.clone(), store, Some(fetcher));
    let state = AppState::new(service);

    let app = routes::create_router(state);

    tracing::info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;

    axum::serve(listener, app).await?;
    Ok(())
}
