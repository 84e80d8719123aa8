// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Provisioning Trigger
//!
//! Thin entry point shared by the record-change hook, the HTTP route and the
//! CLI: load the client record, validate it, mark it `provisioning` and hand
//! a fresh `ProvisioningInput` to the orchestrator.
//!
//! Only pre-flight validation raises. Once the orchestrator is entered every
//! outcome is a `ProvisioningResult`.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::errors::TriggerError;
use crate::application::progress::LoggingProgressSink;
use crate::application::provisioning_orchestrator::ProvisioningOrchestrator;
use crate::domain::client::{ClientRecord, ClientStatus, ClientUpdate, WriteContext};
use crate::domain::deployment::DeploymentProvider;
use crate::domain::events::ProgressSink;
use crate::domain::provisioning::{ClientId, ProvisioningInput, ProvisioningResult};
use crate::domain::repository::ClientRecordRepository;

#[derive(Clone, Default)]
pub struct TriggerOptions {
    /// Overrides the record's provider and the configured default
    pub provider: Option<DeploymentProvider>,
    pub environment_overrides: BTreeMap<String, String>,
    /// Also log every progress event
    pub verbose: bool,
    pub progress: Option<Arc<dyn ProgressSink>>,
}

impl TriggerOptions {
    pub fn with_provider(mut self, provider: DeploymentProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_environment_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment_overrides.insert(key.into(), value.into());
        self
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

pub struct ProvisioningTrigger {
    orchestrator: Arc<ProvisioningOrchestrator>,
    records: Arc<dyn ClientRecordRepository>,
    default_provider: DeploymentProvider,
}

impl ProvisioningTrigger {
    pub fn new(
        orchestrator: Arc<ProvisioningOrchestrator>,
        records: Arc<dyn ClientRecordRepository>,
        default_provider: DeploymentProvider,
    ) -> Self {
        Self { orchestrator, records, default_provider }
    }

    pub fn orchestrator(&self) -> &Arc<ProvisioningOrchestrator> {
        &self.orchestrator
    }

    pub async fn provision_client(
        &self,
        client_id: &ClientId,
        options: TriggerOptions,
    ) -> Result<ProvisioningResult, TriggerError> {
        let record = self
            .records
            .find_by_id(client_id)
            .await?
            .ok_or_else(|| TriggerError::ClientNotFound(client_id.clone()))?;
        let domain = validate(&record)?;

        if record.status == ClientStatus::Provisioning {
            debug!(client_id = %client_id, "Client already marked provisioning; skipping status write");
        } else {
            self.records
                .apply(client_id, &ClientUpdate::provisioning(), WriteContext::provisioner())
                .await?;
        }

        let provider = options
            .provider
            .or(record.deployment_provider)
            .unwrap_or(self.default_provider);
        info!(client_id = %client_id, provider = %provider, "Provisioning triggered");

        let mut input = ProvisioningInput::new(record.id.clone(), record.name.clone(), domain, provider)
            .with_site(record.site.clone());
        input.region = record.region.clone();
        input.environment_overrides = options.environment_overrides;
        input.progress = match (options.progress, options.verbose) {
            (Some(sink), true) => Some(Arc::new(Fanout(vec![sink, Arc::new(LoggingProgressSink)]))),
            (Some(sink), false) => Some(sink),
            (None, true) => Some(Arc::new(LoggingProgressSink)),
            (None, false) => None,
        };

        Ok(self.orchestrator.provision(input).await)
    }

    /// Move a record that was marked `provisioning` but never reached the
    /// orchestrator to `failed`, so it does not stay non-terminal.
    pub async fn mark_not_started(&self, client_id: &ClientId, reason: &str) -> Result<(), TriggerError> {
        warn!(client_id = %client_id, "Provisioning not started: {}", reason);
        self.records
            .apply(
                client_id,
                &ClientUpdate::failed(format!("Provisioning not started: {}", reason)),
                WriteContext::provisioner(),
            )
            .await?;
        Ok(())
    }
}

fn validate(record: &ClientRecord) -> Result<String, TriggerError> {
    if record.name.trim().is_empty() {
        return Err(TriggerError::MissingField { client_id: record.id.clone(), field: "name" });
    }
    match record.domain.as_deref().map(str::trim) {
        Some(domain) if !domain.is_empty() => Ok(domain.to_string()),
        _ => Err(TriggerError::MissingField { client_id: record.id.clone(), field: "domain" }),
    }
}

struct Fanout(Vec<Arc<dyn ProgressSink>>);

impl ProgressSink for Fanout {
    fn on_progress(&self, event: &crate::domain::events::ProvisioningProgress) {
        for sink in &self.0 {
            sink.on_progress(event);
        }
    }
}
