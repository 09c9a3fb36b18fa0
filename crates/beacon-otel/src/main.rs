//! Beacon OTLP intake binary entry point.
//!
//! Serves the OTLP/HTTP receivers under `/otel` on the configured address.

use std::future::Future;
use std::sync::Arc;

use beacon_otel::{
    ingest::{otlp_http_router, OtlpHttpState},
    project_id::VerboseIdCodec,
    router::Sinks,
    IntakeConfig,
};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beacon_otel=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting beacon-otel");

    let config = IntakeConfig::load()?;
    tracing::info!(
        http_addr = %config.server.http_addr,
        errors_topic = %config.queue.errors_topic,
        logs_topic = %config.queue.logs_topic,
        "Configuration loaded"
    );

    let codec = Arc::new(VerboseIdCodec::new(&config.verbose_id)?);
    let sinks = Sinks::from_config(&config.queue);
    let state = OtlpHttpState::new(sinks, codec, &config.server);

    let app = axum::Router::new()
        .nest("/otel", otlp_http_router(state))
        .layer(TraceLayer::new_for_http());

    let http_addr = config.server.http_addr;
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!(http = %http_addr, "Server starting");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "HTTP server error");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolve when the process is asked to stop.
async fn shutdown_signal() {
    let ctrl_c = wait_for(signal::ctrl_c(), "Ctrl+C");

    #[cfg(unix)]
    let terminate = wait_for(
        async {
            signal::unix::signal(signal::unix::SignalKind::terminate())?
                .recv()
                .await;
            Ok::<(), std::io::Error>(())
        },
        "SIGTERM",
    );

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}

/// Wait on a signal handler. A handler that fails to install never resolves.
async fn wait_for<F>(handler: F, name: &'static str)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = handler.await {
        tracing::error!(error = %e, signal = name, "Failed to install signal handler");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn failed_handler_never_resolves() {
        let failed = async { Err::<(), _>(std::io::Error::other("no signals here")) };

        let result = tokio::time::timeout(Duration::from_millis(50), wait_for(failed, "test"))
            .await;

        assert!(result.is_err(), "a failed handler must not trigger shutdown");
    }

    #[tokio::test]
    async fn delivered_signal_resolves() {
        let delivered = async { Ok::<(), std::io::Error>(()) };

        let result = tokio::time::timeout(Duration::from_millis(50), wait_for(delivered, "test"))
            .await;

        assert!(result.is_ok());
    }
}
