use anyhow::Result;
use std::sync::Arc;
use subwatch::{
    config::Config,
    extract::ExtractionClient,
    jobs::{JobRegistry, ScanMailboxJobHandler, WorkerConfig, WorkerSupervisor},
    mailbox::MailboxClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Create database connection pool
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(config.database_url())
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    // External clients shared by every scan job this worker runs
    let mailbox = Arc::new(MailboxClient::from_config(&config));
    let extractor = Arc::new(ExtractionClient::from_config(&config));

    // Create job registry and register handlers
    let mut registry = JobRegistry::new();
    registry.register(ScanMailboxJobHandler::new(mailbox, extractor));

    // Create worker configuration
    let worker_config = WorkerConfig {
        concurrency: std::env::var("WORKER_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(2),
        poll_interval_ms: std::env::var("WORKER_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1000),
        visibility_timeout_secs: std::env::var("WORKER_VISIBILITY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(900),
        base_backoff_secs: std::env::var("WORKER_BASE_BACKOFF_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30),
    };

    // Create and run supervisor
    let supervisor = WorkerSupervisor::new(pool, registry, worker_config);
    supervisor.run().await
}
