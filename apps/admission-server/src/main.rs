#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod app;
mod config;
mod logging;
mod tls;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// Policy admission server
#[derive(Parser, Debug)]
#[command(name = "admission-server", version, about)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

async fn shutdown_signal(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "failed to listen for shutdown signal"),
    }
    cancel.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::load(cli.config.as_deref())?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    logging::init(&config.logging)?;

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.bind_addr))?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let router = app::build_router(&config, cancel.clone())?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    match &config.tls {
        Some(tls_config) => {
            let server_tls = tls::server_config(tls_config)?;
            tracing::info!(%addr, client_auth = ?tls_config.client_auth, "HTTPS server bound");
            tls::serve(listener, server_tls, tls_config.client_auth, router, cancel).await;
        }
        None => {
            tracing::info!(%addr, "HTTP server bound");
            let shutdown = async move {
                cancel.cancelled().await;
                tracing::info!("HTTP server shutting down gracefully (cancellation)");
            };
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
                .context("HTTP server failed")?;
        }
    }
    Ok(())
}
