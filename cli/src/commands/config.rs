// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use provisioner_core::domain::provisioner_config::{ProvisionerConfigManifest, CONFIG_PATH_ENV};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./provisioner-config.yaml)
        #[arg(short, long, default_value = "./provisioner-config.yaml")]
        output: PathBuf,

        /// Include every section with comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let manifest =
        ProvisionerConfigManifest::load_or_default(config_override.clone()).context("Failed to load configuration")?;
    let config = &manifest.spec;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./provisioner-config.yaml");
        println!("  4. ~/.provisioner/config.yaml");
        println!("  5. /etc/provisioner/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", manifest.metadata.name);
    println!();

    let provisioning = &config.provisioning;
    println!("{}", "Provisioning:".bold());
    println!("  Default provider: {}", provisioning.default_provider);
    println!("  Deployment timeout: {:?}", provisioning.deployment_timeout);
    println!("  Poll interval: {:?}", provisioning.poll_interval);
    println!("  Max retries: {}", provisioning.max_retries);
    println!("  Base domain: {}", provisioning.base_domain.as_deref().unwrap_or("(none)"));
    println!("  Admin path: {}", provisioning.admin_path);
    if let Some(repository) = &provisioning.git_repository {
        println!("  Site repository: {}", repository);
    }
    println!();

    println!("{}", "Providers:".bold());
    print_section("vercel", config.vercel.is_some());
    print_section("forge", config.forge.is_some());
    print_section("cloudflare (dns)", config.cloudflare.is_some());
    print_section("neon (database)", config.neon.is_some());
    print_section("notifications", config.notifications.is_some());
    println!();

    let rollback = &config.rollback;
    println!("{}", "Rollback:".bold());
    if rollback.is_enabled() {
        println!("  Delete project: {}", rollback.delete_project);
        println!("  Delete database: {}", rollback.delete_database);
        println!("  Delete client record: {}", rollback.delete_client_record);
        println!("  Notify operator: {}", rollback.notify_operator);
    } else {
        println!("  {}", "disabled".dimmed());
    }
    println!();

    println!("{}", "Server:".bold());
    println!("  Listen: {}:{}", config.server.bind_address, config.server.port);
    println!("  Record store: {:?}", config.record_store.backend);
    println!();

    Ok(())
}

fn print_section(name: &str, configured: bool) {
    if configured {
        println!("  {} {}", "✓".green(), name);
    } else {
        println!("  {} {}", "-".dimmed(), name.dimmed());
    }
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let manifest = ProvisionerConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;

    manifest.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample).with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}
