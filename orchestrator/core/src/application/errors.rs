// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::time::Duration;

use crate::domain::database::DatabaseError;
use crate::domain::deployment::{DeploymentError, DeploymentProvider, DeploymentState};
use crate::domain::provisioning::ClientId;
use crate::domain::repository::RepositoryError;

/// Fatal failure inside a provisioning run. Never escapes `provision()`;
/// it is normalised into a failed `ProvisioningResult`.
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("No deployment adapter configured for provider '{0}'")]
    AdapterUnavailable(DeploymentProvider),

    #[error("Database provisioning failed: {0}")]
    DatabaseProvisioning(#[source] DatabaseError),

    #[error("Project creation failed: {0}")]
    ProjectCreation(#[source] DeploymentError),

    #[error("Environment configuration failed: {0}")]
    EnvironmentConfiguration(#[source] DeploymentError),

    #[error("Deployment trigger failed: {0}")]
    DeploymentTrigger(#[source] DeploymentError),

    #[error("Deployment {state}: {message}")]
    DeploymentFailed { state: DeploymentState, message: String },

    #[error("Deployment status check failed: {0}")]
    StatusCheck(#[source] DeploymentError),

    #[error("TIMEOUT: deployment not ready after {attempts} status checks ({elapsed:?}); remote state unknown")]
    DeploymentTimeout { attempts: u32, elapsed: Duration },

    #[error("TIMEOUT: status polling gave up after {retries} consecutive transient failures: {last_error}")]
    RetryBudgetExhausted { retries: u32, last_error: String },

    #[error("Client record update failed: {0}")]
    RecordUpdate(#[source] RepositoryError),
}

impl ProvisioningError {
    /// Timeout-flavoured failures leave the remote side effect in an unknown state
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ProvisioningError::DeploymentTimeout { .. } | ProvisioningError::RetryBudgetExhausted { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProvisioningError::AdapterUnavailable(_) => "adapter_unavailable",
            ProvisioningError::DatabaseProvisioning(_) => "database",
            ProvisioningError::ProjectCreation(_) => "project",
            ProvisioningError::EnvironmentConfiguration(_) => "environment",
            ProvisioningError::DeploymentTrigger(_) => "deploy",
            ProvisioningError::DeploymentFailed { .. } => "deployment_failed",
            ProvisioningError::StatusCheck(_) => "status_check",
            ProvisioningError::DeploymentTimeout { .. } | ProvisioningError::RetryBudgetExhausted { .. } => "timeout",
            ProvisioningError::RecordUpdate(_) => "record_update",
        }
    }
}

/// Pre-flight failures of the trigger entry point
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("Client not found: {0}")]
    ClientNotFound(ClientId),

    #[error("Client {client_id} is missing required field '{field}'")]
    MissingField { client_id: ClientId, field: &'static str },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
