//! Server entry point.

use api::config::{Config, LogFormat};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Configuration and tracing
    let config = Config::from_env()?;
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Start the saga services and the outbox dispatcher
    let state = api::create_state(&config, metrics_handle).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = {
        let outbox = state.services.outbox();
        let interval = config.outbox_dispatch_interval;
        tokio::spawn(async move { outbox.run(interval, shutdown_rx).await })
    };

    // 4. Serve
    let addr = config.addr();
    tracing::info!(%addr, "starting fulfillment server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, api::create_app(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 5. Drain the outbox, then stop the handlers
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("outbox dispatcher already stopped");
    }
    dispatcher.await?;
    state.bus.close().await;

    tracing::info!("server shut down gracefully");
    Ok(())
}
