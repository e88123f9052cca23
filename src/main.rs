//! Order Outbox service binary.
//!
//! Serves the HTTP API and runs the outbox relay in the same process.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use order_outbox::adapters::http::{order_router, OrderApiState};
use order_outbox::adapters::postgres::{run_migrations, PostgresStore};
use order_outbox::adapters::publishers::{LogPublisher, RedisStreamPublisher};
use order_outbox::application::OutboxRelay;
use order_outbox::config::{AppConfig, LogFormat, PublisherConfig, PublisherKind};
use order_outbox::ports::EventPublisher;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config)?;

    let pool = config.database.connect().await?;
    if config.database.run_migrations {
        run_migrations(&pool).await?;
        tracing::info!("Database migrations applied");
    }
    let store = PostgresStore::new(pool);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let relay_task = if config.relay.enabled {
        let publisher = build_publisher(&config.publisher).await?;
        let relay = OutboxRelay::with_config(
            Arc::new(store.clone()),
            publisher,
            config.relay.to_relay_config(),
        );
        Some(tokio::spawn(async move { relay.run(shutdown_rx).await }))
    } else {
        tracing::info!("Outbox relay disabled for this process");
        None
    };

    let app = order_router(OrderApiState::from_store(store))
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, environment = ?config.server.environment, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped, waiting for relay");
    // Ignored when the relay is disabled and the receiver is gone.
    let _ = shutdown_tx.send(true);
    if let Some(task) = relay_task {
        match tokio::time::timeout(config.server.shutdown_grace(), task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Relay task failed"),
            Err(_) => tracing::warn!("Relay did not stop within the grace period"),
        }
    }

    Ok(())
}

fn init_tracing(config: &AppConfig) -> Result<(), BoxError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.server.log_level))?;

    match config.server.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?,
    }

    Ok(())
}

async fn build_publisher(config: &PublisherConfig) -> Result<Arc<dyn EventPublisher>, BoxError> {
    match config.kind {
        PublisherKind::Log => {
            tracing::info!("Publishing outbox events to the log");
            Ok(Arc::new(LogPublisher::new().with_payload(config.log_payload)))
        }
        PublisherKind::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or("publisher.redis_url is required for the redis publisher")?;
            let publisher = RedisStreamPublisher::connect(url, config.redis_stream_config()).await?;
            tracing::info!(stream = %config.stream, "Publishing outbox events to Redis stream");
            Ok(Arc::new(publisher))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
