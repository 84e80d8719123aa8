// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Deployment Monitor
//!
//! Bounded pull-based polling of `get_deployment_status` until the deployment
//! is `ready` or terminally failed.
//!
//! Two independent budgets stop the loop:
//! - the wall-clock `timeout` (also bounds every in-flight status call)
//! - `max_attempts = ceil(timeout / poll_interval)` status observations
//!
//! Transient call failures are retried up to `max_retries` consecutive times,
//! with the delay doubling from `retry_delay`. Exhausting either budget yields
//! a timeout-flavoured error, distinct from a provider-reported failure.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::application::errors::ProvisioningError;
use crate::domain::deployment::{DeploymentAdapter, DeploymentId, DeploymentState, DeploymentStatus};
use crate::domain::provisioner_config::ProvisioningSettings;

/// Advisory progress band covered by the monitor
pub const MONITOR_PROGRESS_START: u8 = 60;
pub const MONITOR_PROGRESS_END: u8 = 90;

#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10 * 60),
            poll_interval: Duration::from_secs(5),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

impl From<&ProvisioningSettings> for MonitorSettings {
    fn from(settings: &ProvisioningSettings) -> Self {
        Self {
            timeout: settings.deployment_timeout,
            poll_interval: settings.poll_interval,
            max_retries: settings.max_retries,
            retry_delay: settings.retry_delay,
        }
    }
}

impl MonitorSettings {
    pub fn max_attempts(&self) -> u32 {
        if self.poll_interval.is_zero() {
            return 1;
        }
        let attempts = self.timeout.as_nanos().div_ceil(self.poll_interval.as_nanos());
        attempts.clamp(1, u32::MAX as u128) as u32
    }
}

/// One non-terminal observation, reported to the caller for progress
#[derive(Debug, Clone)]
pub struct MonitorTick {
    pub attempt: u32,
    pub max_attempts: u32,
    pub status: DeploymentStatus,
}

impl MonitorTick {
    /// Advisory percentage proportional to attempts used
    pub fn percentage(&self) -> u8 {
        let span = (MONITOR_PROGRESS_END - MONITOR_PROGRESS_START) as u32;
        let used = self.attempt.min(self.max_attempts) * span / self.max_attempts.max(1);
        MONITOR_PROGRESS_START + used as u8
    }
}

/// Live deployment reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveDeployment {
    pub url: Option<String>,
    pub attempts: u32,
}

pub struct DeploymentMonitor<'a> {
    adapter: &'a dyn DeploymentAdapter,
    settings: MonitorSettings,
}

impl<'a> DeploymentMonitor<'a> {
    pub fn new(adapter: &'a dyn DeploymentAdapter, settings: MonitorSettings) -> Self {
        Self { adapter, settings }
    }

    pub async fn wait_until_ready(
        &self,
        deployment_id: &DeploymentId,
        on_tick: &mut (dyn FnMut(&MonitorTick) + Send),
    ) -> Result<LiveDeployment, ProvisioningError> {
        let started = Instant::now();
        let deadline = started + self.settings.timeout;
        let max_attempts = self.settings.max_attempts();
        let provider = self.adapter.provider().as_str();

        for attempt in 1..=max_attempts {
            let status = self.poll_with_retry(deployment_id, deadline, attempt).await?;
            metrics::counter!("deployment_status_polls_total", "provider" => provider).increment(1);

            match status.state {
                DeploymentState::Ready => {
                    debug!(deployment_id = %deployment_id, attempt, "Deployment ready");
                    return Ok(LiveDeployment { url: status.url, attempts: attempt });
                }
                DeploymentState::Error | DeploymentState::Canceled => {
                    return Err(ProvisioningError::DeploymentFailed {
                        state: status.state,
                        message: status
                            .error
                            .unwrap_or_else(|| "provider reported no error detail".to_string()),
                    });
                }
                DeploymentState::Queued | DeploymentState::Building => {
                    on_tick(&MonitorTick { attempt, max_attempts, status });
                }
            }

            if attempt < max_attempts {
                if !sleep_before(deadline, self.settings.poll_interval).await {
                    break;
                }
            }
        }

        Err(ProvisioningError::DeploymentTimeout {
            attempts: max_attempts,
            elapsed: started.elapsed(),
        })
    }

    async fn poll_with_retry(
        &self,
        deployment_id: &DeploymentId,
        deadline: Instant,
        attempt: u32,
    ) -> Result<DeploymentStatus, ProvisioningError> {
        let mut failures = 0u32;
        loop {
            let call = self.adapter.get_deployment_status(deployment_id);
            let outcome = tokio::time::timeout_at(deadline, call).await.map_err(|_| {
                ProvisioningError::DeploymentTimeout {
                    attempts: attempt,
                    elapsed: self.settings.timeout,
                }
            })?;

            match outcome {
                Ok(status) => return Ok(status),
                Err(e) if e.is_transient() => {
                    failures += 1;
                    if failures > self.settings.max_retries {
                        return Err(ProvisioningError::RetryBudgetExhausted {
                            retries: self.settings.max_retries,
                            last_error: e.to_string(),
                        });
                    }
                    let delay = self.settings.retry_delay.saturating_mul(1 << (failures - 1).min(16));
                    warn!(
                        deployment_id = %deployment_id,
                        failures,
                        "Transient status check failure, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    if !sleep_before(deadline, delay).await {
                        return Err(ProvisioningError::DeploymentTimeout {
                            attempts: attempt,
                            elapsed: self.settings.timeout,
                        });
                    }
                }
                Err(e) => return Err(ProvisioningError::StatusCheck(e)),
            }
        }
    }
}

/// Sleep for `delay` unless that would cross `deadline`; returns false if the deadline was hit
async fn sleep_before(deadline: Instant, delay: Duration) -> bool {
    let wake = Instant::now() + delay;
    if wake >= deadline {
        tokio::time::sleep_until(deadline).await;
        return false;
    }
    tokio::time::sleep_until(wake).await;
    true
}
