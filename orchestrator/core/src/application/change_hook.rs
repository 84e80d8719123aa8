// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Record-change hook
//!
//! Starts provisioning when an external write moves a client record into
//! `provisioning`. Writes tagged by the provisioner itself are ignored, which
//! is what stops the trigger's own status write from re-entering the workflow.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::application::trigger::{ProvisioningTrigger, TriggerOptions};
use crate::domain::client::{ClientRecord, ClientStatus, WriteContext};
use crate::domain::repository::ClientChangeListener;
use crate::infrastructure::background_tasks::BackgroundTasks;

pub struct ClientChangeHook {
    trigger: Arc<ProvisioningTrigger>,
    background: BackgroundTasks,
}

impl ClientChangeHook {
    pub fn new(trigger: Arc<ProvisioningTrigger>, background: BackgroundTasks) -> Self {
        Self { trigger, background }
    }

    /// Whether this change should start a provisioning run
    pub fn should_trigger(previous: Option<&ClientRecord>, current: &ClientRecord, context: WriteContext) -> bool {
        !context.skip_provisioning_hook
            && current.status == ClientStatus::Provisioning
            && previous.map(|p| p.status) != Some(ClientStatus::Provisioning)
    }
}

#[async_trait]
impl ClientChangeListener for ClientChangeHook {
    async fn after_change(&self, previous: Option<&ClientRecord>, current: &ClientRecord, context: WriteContext) {
        if !Self::should_trigger(previous, current, context) {
            return;
        }

        let trigger = self.trigger.clone();
        let client_id = current.id.clone();
        // Runs are never dropped for capacity; only shutdown refuses them
        let spawned = self.background.spawn_uncapped("provision-client", async move {
            match trigger.provision_client(&client_id, TriggerOptions::default()).await {
                Ok(result) if result.success => {
                    info!(client_id = %client_id, url = ?result.deployment_url, "Hook-triggered provisioning completed")
                }
                Ok(result) => {
                    warn!(client_id = %client_id, error = ?result.error, "Hook-triggered provisioning failed")
                }
                Err(e) => error!(client_id = %client_id, "Hook-triggered provisioning rejected: {}", e),
            }
        });
        if !spawned {
            if let Err(e) = self.trigger.mark_not_started(&current.id, "service is shutting down").await {
                error!(client_id = %current.id, "Failed to mark unstarted client as failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::provisioning::ClientId;

    fn record(status: ClientStatus) -> ClientRecord {
        let mut record = ClientRecord::new(ClientId::new("t1"), "Acme").with_domain("acme");
        record.status = status;
        record
    }

    #[test]
    fn test_should_trigger_only_on_external_transition() {
        let pending = record(ClientStatus::Pending);
        let provisioning = record(ClientStatus::Provisioning);

        assert!(ClientChangeHook::should_trigger(Some(&pending), &provisioning, WriteContext::external()));
        assert!(ClientChangeHook::should_trigger(None, &provisioning, WriteContext::external()));
        assert!(!ClientChangeHook::should_trigger(Some(&pending), &provisioning, WriteContext::provisioner()));
        assert!(!ClientChangeHook::should_trigger(
            Some(&provisioning),
            &provisioning,
            WriteContext::external()
        ));
        assert!(!ClientChangeHook::should_trigger(
            Some(&pending),
            &record(ClientStatus::Active),
            WriteContext::external()
        ));
    }
}
