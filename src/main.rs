mod config;
mod context;
mod error;
mod metrics;
mod models;
mod ratelimit;
mod sandbox;
mod service;
mod validation;

use std::{
    net::SocketAddr,
    sync::Arc,
};

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::{
    config::{LogFormat, LoggingConfig, ServiceConfig},
    service::RunCodeService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = ServiceConfig::from_env().context("failed to build service config")?;
    init_tracing(&cfg.logging);

    let bind_addr = cfg.bind_addr;
    let service = Arc::new(
        RunCodeService::from_config(&cfg)
            .await
            .context("failed to build run-code service")?,
    );
    tracing::info!(
        route = %cfg.route,
        development = cfg.development,
        backends = %service.describe(),
        max_code_size = cfg.limits.max_code_size,
        max_output_size = cfg.limits.max_output_size,
        timeout_ms = cfg.limits.max_execution_time.as_millis() as u64,
        "run-code service configured"
    );

    let app = service::router(service, &cfg.route);

    let listener = TcpListener::bind(bind_addr)
        .await
        .context("failed to bind listener")?;

    tracing::info!(addr = %bind_addr, "run-code service listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("run-code server error")?;

    tracing::info!("run-code service stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},hyper=warn,tower_http=warn", logging.level))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining in-flight requests");
}
