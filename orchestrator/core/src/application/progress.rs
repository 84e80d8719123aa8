// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use tracing::info;

use crate::domain::events::{ProgressSink, ProvisioningProgress};

/// Writes every progress event to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingProgressSink;

impl ProgressSink for LoggingProgressSink {
    fn on_progress(&self, event: &ProvisioningProgress) {
        info!(
            client_id = %event.client_id,
            status = %event.status,
            percentage = event.percentage,
            "{}",
            event.message
        );
    }
}
