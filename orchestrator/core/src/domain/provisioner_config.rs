// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Provisioner Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing:
// - Provisioning workflow tuning (timeouts, polling, retries, domains)
// - Rollback behaviour on fatal failure
// - Credentials for each provider (Vercel, Forge, Cloudflare, Neon)
// - Operator notifications, record store backend and HTTP server binding

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::deployment::DeploymentProvider;
use crate::domain::repository::{PostgresConfig, StorageBackend};

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "ProvisionerConfig";
pub const CONFIG_PATH_ENV: &str = "PROVISIONER_CONFIG_PATH";

/// Top-level configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "ProvisionerConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: ProvisionerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Configuration specification (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    #[serde(default)]
    pub provisioning: ProvisioningSettings,

    #[serde(default)]
    pub rollback: RollbackConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vercel: Option<VercelConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub forge: Option<ForgeConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloudflare: Option<CloudflareConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub neon: Option<NeonConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationConfig>,

    #[serde(default)]
    pub record_store: RecordStoreConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningSettings {
    /// Provider used when neither the caller nor the client record names one
    #[serde(default)]
    pub default_provider: DeploymentProvider,

    /// Wall-clock ceiling for a deployment to become ready
    #[serde(with = "humantime_serde", default = "default_deployment_timeout")]
    pub deployment_timeout: Duration,

    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Retries for transient provider failures while polling
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between retries (doubled per consecutive failure)
    #[serde(with = "humantime_serde", default = "default_retry_delay")]
    pub retry_delay: Duration,

    /// Parent zone for tenant subdomains (e.g. "sites.example.com")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_domain: Option<String>,

    #[serde(default = "default_admin_path")]
    pub admin_path: String,

    /// Site template repository deployed for every tenant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_repository: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_command: Option<String>,

    #[serde(default = "default_true")]
    pub verify_dns: bool,

    /// Delay before the background DNS propagation check runs
    #[serde(with = "humantime_serde", default = "default_dns_verification_delay")]
    pub dns_verification_delay: Duration,

    /// Upper bound on concurrently pending background checks
    #[serde(default = "default_max_background_checks")]
    pub max_background_checks: usize,
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            default_provider: DeploymentProvider::default(),
            deployment_timeout: default_deployment_timeout(),
            poll_interval: default_poll_interval(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            base_domain: None,
            admin_path: default_admin_path(),
            git_repository: None,
            build_command: None,
            verify_dns: true,
            dns_verification_delay: default_dns_verification_delay(),
            max_background_checks: default_max_background_checks(),
        }
    }
}

/// Cleanup actions after a fatal failure. Everything is opt-in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackConfig {
    #[serde(default)]
    pub delete_project: bool,
    #[serde(default)]
    pub delete_database: bool,
    #[serde(default)]
    pub delete_client_record: bool,
    #[serde(default)]
    pub notify_operator: bool,
}

impl RollbackConfig {
    pub fn all() -> Self {
        Self {
            delete_project: true,
            delete_database: true,
            delete_client_record: true,
            notify_operator: true,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.delete_project || self.delete_database || self.delete_client_record || self.notify_operator
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VercelConfig {
    /// API token (supports "env:VAR_NAME")
    pub token: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,

    #[serde(default = "default_framework")]
    pub framework: String,

    #[serde(default = "default_vercel_api_url")]
    pub api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// API token (supports "env:VAR_NAME")
    pub token: String,

    /// Server new sites are created on
    pub server_id: u64,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default = "default_forge_api_url")]
    pub api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudflareConfig {
    /// API token (supports "env:VAR_NAME")
    pub token: String,

    pub zone_id: String,

    #[serde(default)]
    pub proxied: bool,

    #[serde(default = "default_cloudflare_api_url")]
    pub api_url: String,

    /// DNS-over-HTTPS resolver used for propagation checks
    #[serde(default = "default_doh_url")]
    pub doh_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeonConfig {
    /// API key (supports "env:VAR_NAME")
    pub token: String,

    #[serde(default = "default_neon_region")]
    pub region: String,

    #[serde(default = "default_pg_version")]
    pub pg_version: u32,

    #[serde(default = "default_neon_api_url")]
    pub api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Webhook receiving failure notices (supports "env:VAR_NAME")
    pub webhook_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStoreBackend {
    #[default]
    InMemory,
    Postgres,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordStoreConfig {
    #[serde(default)]
    pub backend: RecordStoreBackend,

    /// Connection string (supports "env:VAR_NAME")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
}

impl RecordStoreConfig {
    pub fn storage_backend(&self) -> anyhow::Result<StorageBackend> {
        match self.backend {
            RecordStoreBackend::InMemory => Ok(StorageBackend::InMemory),
            RecordStoreBackend::Postgres => {
                let raw = self
                    .connection_string
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("record_store.connection_string is required for postgres"))?;
                Ok(StorageBackend::PostgreSQL(PostgresConfig {
                    connection_string: resolve_secret(raw)?,
                }))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

/// Resolve a secret from config (supports "env:VAR_NAME" syntax)
pub fn resolve_secret(value: &str) -> anyhow::Result<String> {
    match value.strip_prefix("env:") {
        Some(var_name) => std::env::var(var_name)
            .map_err(|_| anyhow::anyhow!("Environment variable not set: {}", var_name)),
        None => Ok(value.to_string()),
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_deployment_timeout() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_admin_path() -> String {
    "/admin".to_string()
}

fn default_dns_verification_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_max_background_checks() -> usize {
    16
}

fn default_framework() -> String {
    "nextjs".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_neon_region() -> String {
    "aws-us-east-2".to_string()
}

fn default_pg_version() -> u32 {
    16
}

fn default_vercel_api_url() -> String {
    "https://api.vercel.com".to_string()
}

fn default_forge_api_url() -> String {
    "https://forge.laravel.com/api/v1".to_string()
}

fn default_cloudflare_api_url() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn default_doh_url() -> String {
    "https://cloudflare-dns.com/dns-query".to_string()
}

fn default_neon_api_url() -> String {
    "https://console.neon.tech/api/v2".to_string()
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ProvisionerConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "tenant-provisioner".to_string(),
                version: Some("1.0.0".to_string()),
            },
            spec: ProvisionerConfig::default(),
        }
    }
}

impl ProvisionerConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. PROVISIONER_CONFIG_PATH environment variable
    /// 2. ./provisioner-config.yaml (working directory)
    /// 3. ~/.provisioner/config.yaml (user home)
    /// 4. /etc/provisioner/config.yaml
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./provisioner-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".provisioner").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/provisioner/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        let provisioning = &mut self.spec.provisioning;

        if let Ok(val) = std::env::var("PROVISIONER_DEFAULT_PROVIDER") {
            match val.parse::<DeploymentProvider>() {
                Ok(provider) => {
                    tracing::info!("Environment override: PROVISIONER_DEFAULT_PROVIDER={}", provider);
                    provisioning.default_provider = provider;
                }
                Err(e) => tracing::warn!("Ignoring PROVISIONER_DEFAULT_PROVIDER: {}", e),
            }
        }

        if let Ok(val) = std::env::var("PROVISIONER_DEPLOYMENT_TIMEOUT") {
            match humantime_serde::re::humantime::parse_duration(&val) {
                Ok(timeout) => {
                    tracing::info!("Environment override: PROVISIONER_DEPLOYMENT_TIMEOUT={}", val);
                    provisioning.deployment_timeout = timeout;
                }
                Err(e) => tracing::warn!("Invalid value for PROVISIONER_DEPLOYMENT_TIMEOUT: '{}' ({}). Ignoring.", val, e),
            }
        }

        if let Ok(val) = std::env::var("PROVISIONER_BASE_DOMAIN") {
            tracing::info!("Environment override: PROVISIONER_BASE_DOMAIN={}", val);
            provisioning.base_domain = Some(val);
        }

        if let Ok(val) = std::env::var("DATABASE_URL") {
            tracing::info!("Environment override: DATABASE_URL (record store switched to postgres)");
            self.spec.record_store.backend = RecordStoreBackend::Postgres;
            self.spec.record_store.connection_string = Some(val);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let provisioning = &self.spec.provisioning;
        if provisioning.poll_interval.is_zero() {
            anyhow::bail!("provisioning.poll_interval must be greater than zero");
        }
        if provisioning.deployment_timeout < provisioning.poll_interval {
            anyhow::bail!(
                "provisioning.deployment_timeout ({:?}) must be at least poll_interval ({:?})",
                provisioning.deployment_timeout,
                provisioning.poll_interval
            );
        }
        if !provisioning.admin_path.starts_with('/') {
            anyhow::bail!("provisioning.admin_path must start with '/'");
        }

        match provisioning.default_provider {
            DeploymentProvider::Vercel if self.spec.vercel.is_none() => {
                anyhow::bail!("Default provider 'vercel' has no vercel credentials configured")
            }
            DeploymentProvider::Forge if self.spec.forge.is_none() => {
                anyhow::bail!("Default provider 'forge' has no forge credentials configured")
            }
            _ => {}
        }

        if self.spec.rollback.notify_operator && self.spec.notifications.is_none() {
            tracing::warn!("rollback.notify_operator is set but no notification webhook is configured; notices go to the log");
        }

        Ok(())
    }
}
