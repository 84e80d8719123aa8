// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::provisioning::ClientId;

/// Message sent to an operator when a run fails and is rolled back
#[derive(Debug, Clone, Serialize)]
pub struct OperatorNotice {
    pub client_id: ClientId,
    pub client_name: String,
    pub error: String,
    /// Tail of the run log
    pub recent_logs: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

#[async_trait]
pub trait OperatorNotifier: Send + Sync {
    async fn notify(&self, notice: &OperatorNotice) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Notification rejected: {0}")]
    Rejected(String),
}
