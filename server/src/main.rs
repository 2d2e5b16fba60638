//! Fest registration HTTP server.
//!
//! Serves the registration API, the payment webhook and participant lookup,
//! exports Prometheus metrics on a separate listener and runs the ticket
//! backfill sweep until shutdown.

use anyhow::Context;
use axum::{Router, routing::get};
use fest_postgres::PostgresParticipantStore;
use fest_runtime::metrics::MetricsServer;
use fest_server::{Config, HttpTicketIssuer, RazorpayGateway, build_services};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fest=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting fest registration server");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        port = config.server.port,
        metrics_port = config.server.metrics_port,
        max_events = config.rules.max_events_per_participant,
        "Configuration loaded"
    );

    // Database
    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .min_connections(config.postgres.min_connections)
        .acquire_timeout(config.postgres.connect_timeout)
        .connect(&config.postgres.url)
        .await
        .context("Failed to connect to database")?;
    let store = PostgresParticipantStore::from_pool(pool)
        .with_max_active(config.rules.max_events_per_participant);
    store.run_migrations().await?;
    info!("Database connected and migrated");

    // Metrics
    let metrics_addr: SocketAddr = format!("{}:{}", config.server.metrics_host, config.server.metrics_port)
        .parse()
        .context("Invalid metrics address")?;
    let mut metrics = MetricsServer::new(metrics_addr);
    metrics.start()?;
    let metrics = Arc::new(metrics);

    // Collaborators and services
    let gateway = RazorpayGateway::new(
        config.razorpay.key_id.clone(),
        config.razorpay.key_secret.clone(),
        config.razorpay.base_url.clone(),
        OUTBOUND_TIMEOUT,
    )?;
    let issuer = HttpTicketIssuer::new(config.tickets.service_url.clone(), OUTBOUND_TIMEOUT)?;
    let services = build_services(&config, Arc::new(store), Arc::new(gateway), Arc::new(issuer));

    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    let backfill_handle = tokio::spawn(
        Arc::clone(&services.backfill).run(config.backfill.interval, shutdown_tx.subscribe()),
    );

    let metrics_app = Router::new().route(
        "/metrics",
        get(move || {
            let metrics = Arc::clone(&metrics);
            async move { metrics.render().unwrap_or_default() }
        }),
    );
    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr).await?;
    let mut metrics_shutdown = shutdown_tx.subscribe();
    let metrics_handle = tokio::spawn(async move {
        let served = axum::serve(metrics_listener, metrics_app)
            .with_graceful_shutdown(async move {
                let _ = metrics_shutdown.recv().await;
            })
            .await;
        if let Err(e) = served {
            error!(error = %e, "Metrics server error");
        }
    });
    info!(address = %metrics_addr, "Prometheus metrics available at /metrics");

    // HTTP API
    let webhook_tasks = Arc::clone(&services.app_state.tasks);
    let app = fest_web::router(services.app_state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, stopping background tasks");
    let _ = shutdown_tx.send(());
    let drained = tokio::time::timeout(config.server.shutdown_timeout, async {
        let webhooks = webhook_tasks.drain().await;
        info!(count = webhooks, "Pending webhooks applied");
        let _ = backfill_handle.await;
        let _ = metrics_handle.await;
    })
    .await;
    if drained.is_err() {
        warn!(timeout_secs = config.server.shutdown_timeout.as_secs(), "Background tasks did not stop in time");
    }

    info!("Server stopped");
    Ok(())
}

/// Waits for Ctrl+C (SIGINT) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
