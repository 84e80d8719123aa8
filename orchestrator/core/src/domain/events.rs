// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::provisioning::{ClientId, ProvisioningStatus};

/// Progress event emitted during a provisioning run.
///
/// `percentage` is a UI hint. It never decreases within a run, but nothing
/// about correctness depends on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningProgress {
    pub client_id: ClientId,
    pub status: ProvisioningStatus,
    pub message: String,
    pub percentage: u8,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Receiver of progress events.
///
/// Called inline on the provisioning task, so implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: &ProvisioningProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProvisioningProgress) + Send + Sync,
{
    fn on_progress(&self, event: &ProvisioningProgress) {
        self(event)
    }
}
