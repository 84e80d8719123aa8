// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Rollback of partially provisioned resources after a fatal failure.
//!
//! Best effort: every action is attempted regardless of the others, and a
//! failing action is recorded as `ROLLBACK ERROR: <message>` instead of being
//! raised. The project and database are independent resources, so their
//! relative order carries no meaning.

use chrono::Utc;
use tracing::{error, info};

use crate::domain::database::DatabaseProvisioner;
use crate::domain::deployment::{DeploymentAdapter, ProjectId};
use crate::domain::notification::{OperatorNotice, OperatorNotifier};
use crate::domain::provisioner_config::RollbackConfig;
use crate::domain::provisioning::ClientId;
use crate::domain::repository::ClientRecordRepository;

pub const ROLLBACK_ERROR_PREFIX: &str = "ROLLBACK ERROR:";

const NOTICE_LOG_TAIL: usize = 20;

/// Resources created by the failed run
#[derive(Debug, Clone)]
pub struct RollbackTargets<'a> {
    pub client_id: &'a ClientId,
    pub client_name: &'a str,
    pub project_id: Option<&'a ProjectId>,
    pub database_id: Option<&'a str>,
    pub error: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    pub attempted: u32,
    pub failed: u32,
    pub client_record_deleted: bool,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

pub struct Rollback<'a> {
    config: RollbackConfig,
    adapter: Option<&'a dyn DeploymentAdapter>,
    database: &'a dyn DatabaseProvisioner,
    records: &'a dyn ClientRecordRepository,
    notifier: Option<&'a dyn OperatorNotifier>,
}

impl<'a> Rollback<'a> {
    pub fn new(
        config: RollbackConfig,
        adapter: Option<&'a dyn DeploymentAdapter>,
        database: &'a dyn DatabaseProvisioner,
        records: &'a dyn ClientRecordRepository,
        notifier: Option<&'a dyn OperatorNotifier>,
    ) -> Self {
        Self { config, adapter, database, records, notifier }
    }

    /// Run every enabled action, appending outcomes to `logs`
    pub async fn execute(&self, targets: &RollbackTargets<'_>, logs: &mut Vec<String>) -> RollbackReport {
        let mut report = RollbackReport::default();
        logs.push(format!("Rollback started for client {}", targets.client_id));

        if self.config.delete_project {
            if let (Some(adapter), Some(project_id)) = (self.adapter, targets.project_id) {
                report.attempted += 1;
                match adapter.delete_project(project_id).await {
                    Ok(()) => {
                        info!(client_id = %targets.client_id, project_id = %project_id, "Rollback: project deleted");
                        logs.push(format!("Rollback: deleted project {}", project_id));
                    }
                    Err(e) => record_failure(&mut report, logs, format!("delete project {}: {}", project_id, e)),
                }
            }
        }

        if self.config.delete_database {
            if let Some(database_id) = targets.database_id {
                report.attempted += 1;
                match self.database.delete_database(database_id).await {
                    Ok(()) => {
                        info!(client_id = %targets.client_id, database_id, "Rollback: database deleted");
                        logs.push(format!("Rollback: deleted database {}", database_id));
                    }
                    Err(e) => record_failure(&mut report, logs, format!("delete database {}: {}", database_id, e)),
                }
            }
        }

        if self.config.delete_client_record {
            report.attempted += 1;
            match self.records.delete(targets.client_id).await {
                Ok(()) => {
                    info!(client_id = %targets.client_id, "Rollback: client record deleted");
                    logs.push(format!("Rollback: deleted client record {}", targets.client_id));
                    report.client_record_deleted = true;
                }
                Err(e) => record_failure(&mut report, logs, format!("delete client record: {}", e)),
            }
        }

        if self.config.notify_operator {
            report.attempted += 1;
            let notice = OperatorNotice {
                client_id: targets.client_id.clone(),
                client_name: targets.client_name.to_string(),
                error: targets.error.to_string(),
                recent_logs: logs.iter().rev().take(NOTICE_LOG_TAIL).rev().cloned().collect(),
                occurred_at: Utc::now(),
            };
            match self.notifier {
                Some(notifier) => match notifier.notify(&notice).await {
                    Ok(()) => logs.push("Rollback: operator notified".to_string()),
                    Err(e) => record_failure(&mut report, logs, format!("notify operator: {}", e)),
                },
                None => {
                    error!(client_id = %targets.client_id, error = targets.error, "Provisioning failed (no operator notifier configured)");
                    logs.push("Rollback: operator notice written to log".to_string());
                }
            }
        }

        let outcome = if report.is_clean() { "clean" } else { "partial" };
        metrics::counter!("provisioning_rollbacks_total", "outcome" => outcome).increment(1);
        logs.push(format!(
            "Rollback finished: {} action(s), {} failed",
            report.attempted, report.failed
        ));
        report
    }
}

fn record_failure(report: &mut RollbackReport, logs: &mut Vec<String>, message: String) {
    error!("Rollback action failed: {}", message);
    report.failed += 1;
    logs.push(format!("{} {}", ROLLBACK_ERROR_PREFIX, message));
}
