// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP trigger service
//!
//! Serves the provisioning routes and `/metrics`, with the record-change hook
//! registered on the record store. On SIGINT/SIGTERM the listener stops and
//! outstanding background runs get a bounded grace period.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use provisioner_core::application::ProvisioningServices;
use provisioner_core::domain::provisioner_config::ProvisionerConfigManifest;
use provisioner_core::presentation::api;

use crate::metrics;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Bind address (overrides server.bind_address)
    #[arg(long, env = "PROVISIONER_HOST")]
    pub host: Option<String>,

    /// HTTP port (overrides server.port)
    #[arg(long, env = "PROVISIONER_PORT")]
    pub port: Option<u16>,

    /// Seconds to wait for in-flight provisioning runs at shutdown
    #[arg(long, default_value = "30")]
    pub shutdown_grace: u64,
}

pub async fn execute(args: ServeArgs, config_path: Option<PathBuf>) -> Result<()> {
    let manifest = ProvisionerConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    manifest.validate().context("Configuration validation failed")?;
    info!("Configuration loaded: {}", manifest.metadata.name);

    let config = manifest.spec;
    let handle = metrics::init_metrics()?;
    let services = ProvisioningServices::from_config(&config)
        .await
        .context("Failed to initialize provisioning services")?;

    let app = api::app(services.trigger.clone(), services.events.clone()).merge(metrics::router(handle));

    let host = args.host.unwrap_or(config.server.bind_address);
    let port = args.port.unwrap_or(config.server.port);
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Provisioner listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Provisioner shutting down");
    services.shutdown(Duration::from_secs(args.shutdown_grace)).await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
