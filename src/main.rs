//! Binary entrypoint: wires the Postgres-backed collaborators into a
//! `VerificationEngine` and serves the HTTP boundary: a `PgPool`-owning
//! bootstrap extended with an axum listener per §6's "caller surface" note.

use offramp_verify::config::EngineConfig;
use offramp_verify::engine::VerificationEngine;
use offramp_verify::http_api;
use offramp_verify::logging;
use offramp_verify::notify::http::HttpNotifySink;
use offramp_verify::provider::http::HttpProviderClient;
use offramp_verify::provider::retry::RetryingProviderClient;
use offramp_verify::store::postgres::PostgresTxStore;
use offramp_verify::{audit::postgres::PostgresAuditLog, clock::TokioClock};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_tracing();

    let config = EngineConfig::from_env();
    config.validate()?;

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;

    let provider_endpoint =
        std::env::var("PROVIDER_ENDPOINT").unwrap_or_else(|_| "http://localhost:9000".into());
    let provider_admin_id = std::env::var("PROVIDER_ADMIN_ID").unwrap_or_default();
    let provider_admin_secret = std::env::var("PROVIDER_ADMIN_SECRET").unwrap_or_default();
    let email_endpoint =
        std::env::var("EMAIL_ENDPOINT").unwrap_or_else(|_| "http://localhost:9100".into());
    let email_api_key = std::env::var("EMAIL_API_KEY").unwrap_or_default();
    let engine_id = std::env::var("ENGINE_ID").unwrap_or_else(|_| {
        format!("engine-{}", uuid::Uuid::new_v4())
    });
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());

    let inner_provider =
        HttpProviderClient::new(provider_endpoint, provider_admin_id, provider_admin_secret, config.provider_timeout);
    let provider = Arc::new(RetryingProviderClient::new(
        inner_provider,
        config.retry_initial,
        config.retry_multiplier,
        config.retry_cap,
        config.retry_max_attempts,
    ));

    let store = Arc::new(PostgresTxStore::new(pool.clone()));
    let audit = Arc::new(PostgresAuditLog::new(pool.clone()));
    let notify = Arc::new(HttpNotifySink::new(
        email_endpoint,
        email_api_key,
        "offramp-verify",
        config.webhook_timeout,
    ));
    let clock = Arc::new(TokioClock::new());

    let engine = Arc::new(VerificationEngine::new(
        clock, store, provider, notify, audit, config, engine_id,
    ));

    engine.start().await?;
    info!("verification engine started");

    let router = http_api::router(engine.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "listening");

    let serve = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal());
    if let Err(e) = serve.await {
        error!(error = %e, "http server exited with error");
    }

    engine.stop().await?;
    info!("verification engine stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
    }
}
