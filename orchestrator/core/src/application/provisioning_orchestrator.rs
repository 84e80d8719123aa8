// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Provisioning Orchestrator Application Service
//!
//! Drives one tenant from nothing to a live site across independent, slow and
//! fallible providers, with no distributed transaction to lean on:
//!
//! 1. Database creation (5%)
//! 2. Project creation (15%)
//! 3. DNS configuration (22%), non-fatal
//! 4. Environment configuration (30%)
//! 5. Deploy trigger (40%)
//! 6. Deployment monitoring (60-90%)
//! 7. Client record update (95%)
//! 8. Completion (100%)
//!
//! `provision` never returns an error: every failure becomes a failed
//! `ProvisioningResult`, after the configured rollback has run. A run is a
//! single sequential task; concurrent runs for different tenants share no
//! mutable state. Two concurrent runs for the *same* tenant are not guarded
//! against.

use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::application::deployment_monitor::{DeploymentMonitor, MonitorSettings, MonitorTick};
use crate::application::environment::{build_environment, generate_secret};
use crate::application::errors::ProvisioningError;
use crate::application::rollback::{Rollback, RollbackTargets};
use crate::domain::client::{ClientStatus, ClientUpdate, WriteContext};
use crate::domain::database::{CreateDatabaseRequest, DatabaseProvisioner, ProvisionedDatabase};
use crate::domain::deployment::{
    CreateProjectRequest, CreatedProject, DeployRequest, Deployment, DeploymentAdapter, DeploymentError,
};
use crate::domain::dns::{DnsConfigurator, DnsRecord};
use crate::domain::events::{ProgressSink, ProvisioningProgress};
use crate::domain::notification::OperatorNotifier;
use crate::domain::provisioner_config::{ProvisionerConfig, RollbackConfig};
use crate::domain::provisioning::{ClientId, ProvisioningInput, ProvisioningResult, ProvisioningStatus};
use crate::domain::repository::ClientRecordRepository;
use crate::infrastructure::background_tasks::BackgroundTasks;
use crate::infrastructure::deployment::DeploymentAdapterRegistry;

/// Prefix of the log line written when DNS configuration degrades
pub const DNS_WARNING_PREFIX: &str = "DNS WARNING:";

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub monitor: MonitorSettings,
    /// `None` disables rollback entirely
    pub rollback: Option<RollbackConfig>,
    pub base_domain: Option<String>,
    pub admin_path: String,
    pub git_repository: Option<String>,
    pub build_command: Option<String>,
    pub verify_dns: bool,
    pub dns_verification_delay: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            monitor: MonitorSettings::default(),
            rollback: None,
            base_domain: None,
            admin_path: "/admin".to_string(),
            git_repository: None,
            build_command: None,
            verify_dns: true,
            dns_verification_delay: Duration::from_secs(60),
        }
    }
}

impl From<&ProvisionerConfig> for OrchestratorSettings {
    fn from(config: &ProvisionerConfig) -> Self {
        let provisioning = &config.provisioning;
        Self {
            monitor: MonitorSettings::from(provisioning),
            rollback: Some(config.rollback).filter(RollbackConfig::is_enabled),
            base_domain: provisioning.base_domain.clone(),
            admin_path: provisioning.admin_path.clone(),
            git_repository: provisioning.git_repository.clone(),
            build_command: provisioning.build_command.clone(),
            verify_dns: provisioning.verify_dns,
            dns_verification_delay: provisioning.dns_verification_delay,
        }
    }
}

pub struct ProvisioningOrchestrator {
    adapters: Arc<DeploymentAdapterRegistry>,
    database: Arc<dyn DatabaseProvisioner>,
    records: Arc<dyn ClientRecordRepository>,
    dns: Option<Arc<dyn DnsConfigurator>>,
    notifier: Option<Arc<dyn OperatorNotifier>>,
    sinks: Vec<Arc<dyn ProgressSink>>,
    background: BackgroundTasks,
    settings: OrchestratorSettings,
}

impl ProvisioningOrchestrator {
    pub fn new(
        adapters: Arc<DeploymentAdapterRegistry>,
        database: Arc<dyn DatabaseProvisioner>,
        records: Arc<dyn ClientRecordRepository>,
    ) -> Self {
        Self {
            adapters,
            database,
            records,
            dns: None,
            notifier: None,
            sinks: Vec::new(),
            background: BackgroundTasks::default(),
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn with_dns(mut self, dns: Arc<dyn DnsConfigurator>) -> Self {
        self.dns = Some(dns);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn OperatorNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Service-level sink, receives the events of every run
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_background_tasks(mut self, background: BackgroundTasks) -> Self {
        self.background = background;
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    #[tracing::instrument(skip_all, fields(client_id = %input.client_id, provider = %input.provider))]
    pub async fn provision(&self, input: ProvisioningInput) -> ProvisioningResult {
        let started_at = Utc::now();
        let timer = std::time::Instant::now();

        let mut sinks = Vec::with_capacity(self.sinks.len() + 1);
        sinks.extend(input.progress.iter().cloned());
        sinks.extend(self.sinks.iter().cloned());
        let mut run = RunContext::new(input.client_id.clone(), sinks);
        let mut state = RunState::default();

        info!("Provisioning started for '{}' ({})", input.client_name, input.domain);
        run.log(format!(
            "Provisioning {} ({}) on {}",
            input.client_name, input.client_id, input.provider
        ));

        let adapter = self.adapters.get(input.provider);
        let outcome = match &adapter {
            Some(adapter) => self.run_steps(&input, adapter.as_ref(), &mut run, &mut state).await,
            None => Err(ProvisioningError::AdapterUnavailable(input.provider)),
        };

        let (success, urls, error) = match outcome {
            Ok(urls) => (true, urls, None),
            Err(err) => {
                self.handle_failure(&input, adapter.as_deref(), &mut run, &state, &err).await;
                (false, SiteUrls::default(), Some(err.to_string()))
            }
        };

        let provider = input.provider.as_str();
        let outcome_label = if success { "success" } else { "failure" };
        metrics::counter!("provisioning_runs_total", "provider" => provider, "outcome" => outcome_label).increment(1);
        metrics::histogram!("provisioning_duration_seconds", "provider" => provider)
            .record(timer.elapsed().as_secs_f64());

        ProvisioningResult {
            success,
            client_id: input.client_id.clone(),
            provider: input.provider,
            status: run.status,
            deployment_url: urls.deployment_url,
            admin_url: urls.admin_url,
            preview_url: urls.preview_url,
            project_id: state.project.as_ref().map(|p| p.project_id.clone()),
            deployment_id: state.deployment.as_ref().map(|d| d.deployment_id.clone()),
            database_url: state.database.as_ref().map(|d| d.connection_string.clone()),
            database_id: state.database.as_ref().map(|d| d.database_id.clone()),
            started_at,
            completed_at: Utc::now(),
            logs: run.logs,
            error,
        }
    }

    async fn run_steps(
        &self,
        input: &ProvisioningInput,
        adapter: &dyn DeploymentAdapter,
        run: &mut RunContext,
        state: &mut RunState,
    ) -> Result<SiteUrls, ProvisioningError> {
        let slug = site_slug(input);
        let fqdn = input.fqdn(self.settings.base_domain.as_deref());

        // 1. Database
        run.emit(ProvisioningStatus::CreatingDatabase, 5, "Creating database", Map::new());
        let database = self
            .database
            .create_database(&CreateDatabaseRequest {
                name: format!("{}-db", slug),
                region: input.region.clone(),
            })
            .await
            .map_err(ProvisioningError::DatabaseProvisioning)?;
        run.log(format!("Database created: {}", database.database_id));
        let database = state.database.insert(database).clone();

        // 2. Project
        run.emit(
            ProvisioningStatus::CreatingProject,
            15,
            format!("Creating {} project", adapter.provider()),
            meta([("provider", json!(adapter.provider().as_str()))]),
        );
        let project = adapter
            .create_project(&CreateProjectRequest {
                name: slug.clone(),
                domain: fqdn.clone(),
                environment: BTreeMap::new(),
                region: input.region.clone(),
            })
            .await
            .map_err(ProvisioningError::ProjectCreation)?;
        run.log(format!("Project created: {} ({})", project.project_id, project.project_url));
        let project = state.project.insert(project).clone();

        // 3. DNS, early so propagation overlaps the build
        run.emit(
            ProvisioningStatus::ConfiguringDns,
            22,
            "Configuring DNS",
            meta([("domain", json!(fqdn))]),
        );
        state.dns_configured = match &fqdn {
            Some(fqdn) => self.configure_dns(adapter, &project, fqdn, run).await,
            None => {
                run.log("DNS skipped: no base domain configured for subdomain".to_string());
                false
            }
        };

        // 4. Environment
        let public_url = match (&fqdn, state.dns_configured) {
            (Some(fqdn), true) => format!("https://{}", fqdn),
            _ => project.project_url.clone(),
        };
        let environment = build_environment(input, &generate_secret(), &database.connection_string, &public_url);
        run.emit(
            ProvisioningStatus::ConfiguringEnv,
            30,
            "Configuring environment variables",
            meta([("variables", json!(environment.len()))]),
        );
        retry_transient(&self.settings.monitor, "update environment variables", || {
            adapter.update_environment_variables(&project.project_id, &environment)
        })
        .await
        .map_err(ProvisioningError::EnvironmentConfiguration)?;
        run.log(format!("Environment configured ({} variables)", environment.len()));

        // 5. Deploy
        run.emit(ProvisioningStatus::Deploying, 40, "Triggering deployment", Map::new());
        let deployment = adapter
            .deploy(
                &project.project_id,
                &DeployRequest {
                    git_url: self.settings.git_repository.clone(),
                    build_command: self.settings.build_command.clone(),
                    environment,
                },
            )
            .await
            .map_err(ProvisioningError::DeploymentTrigger)?;
        run.log(format!("Deployment triggered: {}", deployment.deployment_id));
        let deployment = state.deployment.insert(deployment).clone();

        // 6. Monitor
        run.emit(
            ProvisioningStatus::Deploying,
            60,
            "Waiting for deployment to become ready",
            meta([("deploymentId", json!(deployment.deployment_id.as_str()))]),
        );
        let monitor = DeploymentMonitor::new(adapter, self.settings.monitor);
        let live = monitor
            .wait_until_ready(&deployment.deployment_id, &mut |tick: &MonitorTick| {
                run.emit(
                    ProvisioningStatus::Deploying,
                    tick.percentage(),
                    format!(
                        "Deployment {} (check {}/{})",
                        tick.status.state, tick.attempt, tick.max_attempts
                    ),
                    meta([("state", json!(tick.status.state.as_str()))]),
                )
            })
            .await?;
        run.log(format!("Deployment ready after {} status check(s)", live.attempts));

        // 7. Record update
        let preview_url = normalize_url(live.url.as_deref().unwrap_or(&deployment.deployment_url));
        let deployment_url = match (&fqdn, state.dns_configured) {
            (Some(fqdn), true) => format!("https://{}", fqdn),
            _ => preview_url.clone(),
        };
        let admin_url = format!("{}{}", deployment_url.trim_end_matches('/'), self.settings.admin_path);

        run.emit(ProvisioningStatus::Deploying, 95, "Updating client record", Map::new());
        let update = ClientUpdate {
            status: Some(ClientStatus::Active),
            deployment_provider: Some(adapter.provider()),
            provider_project_id: Some(project.project_id.to_string()),
            last_deployment_id: Some(deployment.deployment_id.to_string()),
            last_deployed_at: Some(Utc::now()),
            deployment_url: Some(deployment_url.clone()),
            admin_url: Some(admin_url.clone()),
            database_url: Some(database.connection_string.clone()),
            database_provider_id: Some(database.database_id.clone()),
            last_error: None,
        };
        self.records
            .apply(&input.client_id, &update, WriteContext::provisioner())
            .await
            .map_err(ProvisioningError::RecordUpdate)?;

        // 8. Done
        run.emit(
            ProvisioningStatus::Completed,
            100,
            format!("Provisioning complete: {}", deployment_url),
            meta([("deploymentUrl", json!(deployment_url))]),
        );
        info!("Provisioning completed: {}", deployment_url);

        Ok(SiteUrls {
            deployment_url: Some(deployment_url),
            admin_url: Some(admin_url),
            preview_url: Some(preview_url),
        })
    }

    /// Degraded step: returns whether the custom domain is wired up
    async fn configure_dns(
        &self,
        adapter: &dyn DeploymentAdapter,
        project: &CreatedProject,
        fqdn: &str,
        run: &mut RunContext,
    ) -> bool {
        let records = match adapter.configure_domain(&project.project_id, fqdn).await {
            Ok(Some(configuration)) => {
                if !configuration.configured {
                    run.log(format!("Domain {} attached, pending provider verification", configuration.domain));
                }
                configuration.dns_records
            }
            Ok(None) => fallback_records(fqdn, &project.project_url),
            Err(e) => {
                run.dns_warning(format!("domain configuration failed: {}", e));
                return false;
            }
        };

        if records.is_empty() {
            run.log(format!("Domain {} requires no DNS changes", fqdn));
            return true;
        }

        let Some(dns) = &self.dns else {
            run.dns_warning(format!(
                "no DNS configurator available; site reachable at {}",
                project.project_url
            ));
            return false;
        };

        for record in &records {
            match dns.upsert_record(record).await {
                Ok(change) => run.log(format!("DNS record {:?}: {}", change, record)),
                Err(e) => {
                    run.dns_warning(format!("{} ({}); site reachable at {}", e, record, project.project_url));
                    return false;
                }
            }
        }

        if self.settings.verify_dns {
            if self.schedule_dns_verification(dns.clone(), records) {
                run.log("DNS propagation check scheduled".to_string());
            } else {
                run.log("DNS propagation check skipped (background limit reached)".to_string());
            }
        }
        true
    }

    fn schedule_dns_verification(&self, dns: Arc<dyn DnsConfigurator>, records: Vec<DnsRecord>) -> bool {
        let delay = self.settings.dns_verification_delay;
        self.background.spawn("dns-verification", async move {
            tokio::time::sleep(delay).await;
            for record in records {
                match dns.verify_propagation(&record).await {
                    Ok(true) => info!(record = %record, "DNS record propagated"),
                    Ok(false) => warn!(record = %record, "DNS record not yet visible to public resolvers"),
                    Err(e) => warn!(record = %record, "DNS propagation check failed: {}", e),
                }
            }
        })
    }

    async fn handle_failure(
        &self,
        input: &ProvisioningInput,
        adapter: Option<&dyn DeploymentAdapter>,
        run: &mut RunContext,
        state: &RunState,
        err: &ProvisioningError,
    ) {
        error!(kind = err.kind(), "Provisioning failed: {}", err);
        run.log(format!("ERROR: {}", err));
        if err.is_timeout() {
            run.log("Remote deployment state is unknown; verify with the provider before retrying".to_string());
        }

        let has_resources = state.database.is_some() || state.project.is_some();
        let mut record_deleted = false;
        match self.settings.rollback {
            Some(config) if has_resources => {
                let percentage = run.percentage;
                run.emit(ProvisioningStatus::RollingBack, percentage, "Rolling back", Map::new());
                let error_text = err.to_string();
                let targets = RollbackTargets {
                    client_id: &input.client_id,
                    client_name: &input.client_name,
                    project_id: state.project.as_ref().map(|p| &p.project_id),
                    database_id: state.database.as_ref().map(|d| d.database_id.as_str()),
                    error: &error_text,
                };
                let rollback = Rollback::new(
                    config,
                    adapter,
                    self.database.as_ref(),
                    self.records.as_ref(),
                    self.notifier.as_deref(),
                );
                let report = rollback.execute(&targets, &mut run.logs).await;
                record_deleted = report.client_record_deleted;
            }
            None if has_resources => {
                run.log(format!(
                    "Rollback not configured; created resources left in place (project: {}, database: {})",
                    state.project.as_ref().map(|p| p.project_id.as_str()).unwrap_or("none"),
                    state.database.as_ref().map(|d| d.database_id.as_str()).unwrap_or("none"),
                ));
            }
            _ => {}
        }

        if !record_deleted {
            let update = ClientUpdate::failed(err.to_string());
            if let Err(e) = self.records.apply(&input.client_id, &update, WriteContext::provisioner()).await {
                warn!("Failed to mark client record as failed: {}", e);
                run.log(format!("Failed to mark client record as failed: {}", e));
            }
        }

        let percentage = run.percentage;
        run.emit(
            ProvisioningStatus::Failed,
            percentage,
            format!("Provisioning failed: {}", err),
            meta([("kind", json!(err.kind()))]),
        );
    }
}

#[derive(Default)]
struct RunState {
    database: Option<ProvisionedDatabase>,
    project: Option<CreatedProject>,
    deployment: Option<Deployment>,
    dns_configured: bool,
}

#[derive(Default)]
struct SiteUrls {
    deployment_url: Option<String>,
    admin_url: Option<String>,
    preview_url: Option<String>,
}

/// Per-run progress state: append-only log plus fan-out to every sink
struct RunContext {
    client_id: ClientId,
    sinks: Vec<Arc<dyn ProgressSink>>,
    logs: Vec<String>,
    status: ProvisioningStatus,
    percentage: u8,
}

impl RunContext {
    fn new(client_id: ClientId, sinks: Vec<Arc<dyn ProgressSink>>) -> Self {
        Self {
            client_id,
            sinks,
            logs: Vec::new(),
            status: ProvisioningStatus::Pending,
            percentage: 0,
        }
    }

    fn log(&mut self, line: String) {
        self.logs.push(line);
    }

    fn dns_warning(&mut self, message: String) {
        warn!(client_id = %self.client_id, "DNS configuration degraded: {}", message);
        self.logs.push(format!("{} {}", DNS_WARNING_PREFIX, message));
    }

    fn emit(&mut self, status: ProvisioningStatus, percentage: u8, message: impl Into<String>, metadata: Map<String, Value>) {
        debug_assert!(
            self.status == status || self.status.can_transition_to(status),
            "invalid transition {} -> {}",
            self.status,
            status
        );
        let message = message.into();
        self.status = status;
        self.percentage = self.percentage.max(percentage.min(100));
        self.logs.push(format!("[{}] {}", status, message));
        info!(status = %status, percentage = self.percentage, "{}", message);

        let event = ProvisioningProgress {
            client_id: self.client_id.clone(),
            status,
            message,
            percentage: self.percentage,
            timestamp: Utc::now(),
            metadata,
        };
        for sink in &self.sinks {
            sink.on_progress(&event);
        }
    }
}

fn meta<const N: usize>(entries: [(&str, Value); N]) -> Map<String, Value> {
    entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

async fn retry_transient<T, F, Fut>(settings: &MonitorSettings, what: &str, mut op: F) -> Result<T, DeploymentError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DeploymentError>>,
{
    let mut failures = 0u32;
    loop {
        match op().await {
            Err(e) if e.is_transient() && failures < settings.max_retries => {
                failures += 1;
                let delay = settings.retry_delay.saturating_mul(1 << (failures - 1).min(16));
                warn!("{} failed transiently (attempt {}), retrying in {:?}: {}", what, failures, delay, e);
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}

/// Records to create when the adapter has no domain support of its own
fn fallback_records(fqdn: &str, project_url: &str) -> Vec<DnsRecord> {
    let Some(host) = url::Url::parse(project_url).ok().and_then(|u| u.host_str().map(str::to_string)) else {
        return Vec::new();
    };
    let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
    if host.parse::<IpAddr>().is_ok() {
        vec![DnsRecord::a(fqdn, host)]
    } else if host.eq_ignore_ascii_case(fqdn) {
        Vec::new()
    } else {
        vec![DnsRecord::cname(fqdn, host)]
    }
}

fn normalize_url(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// Provider-safe name derived from the tenant domain
fn site_slug(input: &ProvisioningInput) -> String {
    let source = if input.domain.trim().is_empty() { input.client_id.as_str() } else { input.domain.as_str() };
    let mut slug = String::with_capacity(source.len());
    for c in source.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    let slug: String = slug.chars().take(63).collect();
    slug.trim_end_matches('-').to_string()
}
