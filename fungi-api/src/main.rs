use anyhow::Context;
use fungi_api::{app, AppState};
use fungi_core::DocumentStore;
use fungi_ledger::SeatLedger;
use fungi_store::app_config::{Backend, Config};
use fungi_store::{DbClient, MemoryStore, PgStore, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fungi_api=debug,fungi_ledger=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Fungi API on port {}", config.server.port);

    let store: Arc<dyn DocumentStore> = match config.store.backend {
        Backend::Memory => {
            tracing::warn!("Using the in-memory store, nothing survives a restart");
            Arc::new(MemoryStore::with_attempts(config.store.transaction_attempts))
        }
        Backend::Postgres => {
            let database = config
                .database
                .as_ref()
                .context("store.backend is postgres but [database] is not configured")?;
            let db = DbClient::new(&database.url, database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            Arc::new(PgStore::new(db.pool.clone(), config.store.transaction_attempts))
        }
    };

    let ledger = SeatLedger::new(store, config.business_rules.clone());
    let mut state = AppState::new(ledger);

    if let Some(redis) = &config.redis {
        let client = RedisClient::new(&redis.url)
            .await
            .context("Failed to connect to Redis")?;
        state = state.with_rate_limit(Arc::new(client), redis.requests_per_minute);
        tracing::info!("Rate limiting at {} requests per minute", redis.requests_per_minute);
    }

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
