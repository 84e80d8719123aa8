// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Provision one client from the command line
//!
//! Loads the configuration, builds the provisioning services and runs the
//! trigger for a single client, rendering progress events as a progress bar.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use provisioner_core::application::{ProvisioningServices, TriggerOptions};
use provisioner_core::domain::client::{ClientRecord, WriteContext};
use provisioner_core::domain::deployment::DeploymentProvider;
use provisioner_core::domain::events::{ProgressSink, ProvisioningProgress};
use provisioner_core::domain::provisioner_config::ProvisionerConfigManifest;
use provisioner_core::domain::provisioning::{ClientId, ProvisioningResult, ProvisioningStatus};
use provisioner_core::domain::repository::ClientRecordRepository;

#[derive(Args, Debug)]
pub struct ProvisionArgs {
    /// Client record ID
    #[arg(value_name = "CLIENT_ID")]
    pub client_id: String,

    /// Deployment provider (vercel, forge); defaults to the record's provider, then the configured default
    #[arg(short, long, value_parser = parse_provider)]
    pub provider: Option<DeploymentProvider>,

    /// Environment override (KEY=VALUE); may be repeated
    #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Seed the record store with a client record (YAML or JSON) before provisioning
    #[arg(long, value_name = "FILE")]
    pub record: Option<PathBuf>,

    /// Log every progress event
    #[arg(short, long)]
    pub verbose: bool,

    /// Wait for the background DNS propagation check before exiting
    #[arg(long)]
    pub verify_dns: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: ProvisionArgs, config_path: Option<PathBuf>) -> Result<()> {
    let manifest = ProvisionerConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    manifest.validate().context("Configuration validation failed")?;

    let mut config = manifest.spec;
    config.provisioning.verify_dns &= args.verify_dns;
    let dns_grace = config.provisioning.dns_verification_delay + Duration::from_secs(30);

    let services = ProvisioningServices::from_config(&config)
        .await
        .context("Failed to initialize provisioning services")?;

    if let Some(path) = &args.record {
        let record = load_record(path)?;
        info!(client_id = %record.id, "Seeding client record from {:?}", path);
        // Provisioner-tagged so the change hook does not start a second run
        services
            .records
            .save(&record, WriteContext::provisioner())
            .await
            .context("Failed to seed client record")?;
    }

    let progress = Arc::new(BarProgressSink::new(args.json));
    let mut options = TriggerOptions::default()
        .verbose(args.verbose)
        .with_progress_sink(progress.clone());
    options.provider = args.provider;
    options.environment_overrides = args.env.into_iter().collect();

    let client_id = ClientId::new(args.client_id);
    let result = services.trigger.provision_client(&client_id, options).await;
    progress.finish();

    let grace = if args.verify_dns { dns_grace } else { Duration::from_secs(2) };
    services.shutdown(grace).await;

    let result = result.with_context(|| format!("Provisioning of client {} was rejected", client_id))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    if !result.success {
        anyhow::bail!("Provisioning failed for client {}", client_id);
    }
    Ok(())
}

fn load_record(path: &Path) -> Result<ClientRecord> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let record = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)?,
        _ => serde_yaml::from_str(&content)?,
    };
    Ok(record)
}

fn print_result(result: &ProvisioningResult) {
    println!();
    if result.success {
        println!("{}", format!("✓ Client {} provisioned on {}", result.client_id, result.provider).green());
        if let Some(url) = &result.deployment_url {
            println!("  Site:    {}", url.bold());
        }
        if let Some(url) = &result.admin_url {
            println!("  Admin:   {}", url);
        }
        if let Some(url) = &result.preview_url {
            println!("  Preview: {}", url.dimmed());
        }
    } else {
        println!("{}", format!("✗ Provisioning failed for client {}", result.client_id).red());
        if let Some(error) = &result.error {
            println!("  Error: {}", error);
        }
        println!();
        println!("{}", "Run log:".bold());
        for line in &result.logs {
            println!("  {}", line.dimmed());
        }
    }

    let seconds = result.duration().num_milliseconds() as f64 / 1000.0;
    println!("  Duration: {:.1}s", seconds);
}

/// Renders progress events as a single progress bar
struct BarProgressSink {
    bar: ProgressBar,
}

impl BarProgressSink {
    fn new(hidden: bool) -> Self {
        let bar = if hidden { ProgressBar::hidden() } else { ProgressBar::new(100) };
        if let Ok(style) = ProgressStyle::default_bar().template("{spinner} [{bar:40.cyan/blue}] {pos:>3}% {msg}") {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for BarProgressSink {
    fn on_progress(&self, event: &ProvisioningProgress) {
        self.bar.set_position(event.percentage as u64);
        let message = match event.status {
            ProvisioningStatus::Failed | ProvisioningStatus::RollingBack => event.message.red().to_string(),
            ProvisioningStatus::Completed => event.message.green().to_string(),
            _ => event.message.clone(),
        };
        self.bar.set_message(message);
    }
}

fn parse_provider(value: &str) -> Result<DeploymentProvider, String> {
    value.parse::<DeploymentProvider>().map_err(|e| e.to_string())
}

fn parse_env_pair(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", value)),
    }
}
