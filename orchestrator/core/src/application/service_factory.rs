// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Service Factory - Application Layer
//!
//! Wires concrete infrastructure (provider adapters, record store, event bus,
//! background tasks) into the provisioning services from a loaded
//! `ProvisionerConfig`. The domain layer only sees traits.

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::application::change_hook::ClientChangeHook;
use crate::application::provisioning_orchestrator::{OrchestratorSettings, ProvisioningOrchestrator};
use crate::application::trigger::ProvisioningTrigger;
use crate::domain::notification::OperatorNotifier;
use crate::domain::provisioner_config::ProvisionerConfig;
use crate::domain::repository::{ClientRecordRepository, StorageBackend};
use crate::infrastructure::background_tasks::BackgroundTasks;
use crate::infrastructure::db::Database;
use crate::infrastructure::deployment::DeploymentAdapterRegistry;
use crate::infrastructure::dns::CloudflareDnsConfigurator;
use crate::infrastructure::event_bus::ProgressEventBus;
use crate::infrastructure::neon::NeonDatabaseProvisioner;
use crate::infrastructure::notification::{LoggingNotifier, WebhookNotifier};
use crate::infrastructure::repositories::{
    InMemoryClientRepository, ObservedClientRepository, PostgresClientRepository,
};

/// Creates a ClientRecordRepository implementation based on the configured backend
pub fn create_client_repository(
    backend: &StorageBackend,
    pool: Option<PgPool>,
) -> Result<Arc<dyn ClientRecordRepository>> {
    match backend {
        StorageBackend::InMemory => Ok(Arc::new(InMemoryClientRepository::new())),
        StorageBackend::PostgreSQL(_) => {
            let pool = pool.context("PostgreSQL record store selected but no connection pool was created")?;
            Ok(Arc::new(PostgresClientRepository::new(pool)))
        }
    }
}

/// Everything a long-running process needs to provision tenants
pub struct ProvisioningServices {
    pub orchestrator: Arc<ProvisioningOrchestrator>,
    pub trigger: Arc<ProvisioningTrigger>,
    pub records: Arc<ObservedClientRepository>,
    pub events: ProgressEventBus,
    pub background: BackgroundTasks,
}

impl ProvisioningServices {
    pub async fn from_config(config: &ProvisionerConfig) -> Result<Self> {
        let backend = config.record_store.storage_backend()?;
        let pool = match &backend {
            StorageBackend::PostgreSQL(pg) => {
                let database = Database::new(&pg.connection_string).await?;
                database.migrate().await?;
                Some(database.get_pool().clone())
            }
            StorageBackend::InMemory => {
                warn!("Using in-memory record store; client records are lost on restart");
                None
            }
        };
        let records = Arc::new(ObservedClientRepository::new(create_client_repository(&backend, pool)?));

        let neon = config
            .neon
            .as_ref()
            .context("A neon section is required to provision tenant databases")?;
        let database = Arc::new(NeonDatabaseProvisioner::from_config(neon)?);

        let adapters = Arc::new(DeploymentAdapterRegistry::from_config(config));
        let background = BackgroundTasks::new(config.provisioning.max_background_checks);
        let events = ProgressEventBus::default();

        let notifier: Arc<dyn OperatorNotifier> = match &config.notifications {
            Some(notifications) => Arc::new(WebhookNotifier::from_config(notifications)?),
            None => Arc::new(LoggingNotifier),
        };

        let mut orchestrator = ProvisioningOrchestrator::new(adapters, database, records.clone())
            .with_settings(OrchestratorSettings::from(config))
            .with_background_tasks(background.clone())
            .with_progress_sink(Arc::new(events.clone()))
            .with_notifier(notifier);
        match &config.cloudflare {
            Some(cloudflare) => {
                orchestrator = orchestrator.with_dns(Arc::new(CloudflareDnsConfigurator::from_config(cloudflare)?));
            }
            None => warn!("No cloudflare section configured; custom domains will not get DNS records"),
        }
        let orchestrator = Arc::new(orchestrator);

        let trigger = Arc::new(ProvisioningTrigger::new(
            orchestrator.clone(),
            records.clone(),
            config.provisioning.default_provider,
        ));
        records.add_listener(Arc::new(ClientChangeHook::new(trigger.clone(), background.clone())));

        info!("Provisioning services initialized");
        Ok(Self { orchestrator, trigger, records, events, background })
    }

    /// Give outstanding background work a bounded window to finish
    pub async fn shutdown(&self, grace: Duration) {
        if !self.background.shutdown(grace).await {
            warn!("Exiting with background tasks still running");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::PostgresConfig;

    #[test]
    fn test_postgres_backend_requires_pool() {
        let backend = StorageBackend::PostgreSQL(PostgresConfig { connection_string: "postgres://localhost/x".into() });
        assert!(create_client_repository(&backend, None).is_err());
        assert!(create_client_repository(&StorageBackend::InMemory, None).is_ok());
    }

    #[tokio::test]
    async fn test_from_config_requires_database_provider() {
        let config = ProvisionerConfig::default();
        let err = ProvisioningServices::from_config(&config).await.err().unwrap();
        assert!(err.to_string().contains("neon"));
    }
}
