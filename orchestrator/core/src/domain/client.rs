// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Client record: the durable tenant entity this subsystem reads from and
//! writes its outcome back to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::deployment::DeploymentProvider;
use crate::domain::provisioning::{ClientId, SiteConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    /// Never provisioned
    #[default]
    Pending,
    Provisioning,
    Active,
    Failed,
}

impl ClientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientStatus::Pending => "pending",
            ClientStatus::Provisioning => "provisioning",
            ClientStatus::Active => "active",
            ClientStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ClientStatus::Pending),
            "provisioning" => Ok(ClientStatus::Provisioning),
            "active" => Ok(ClientStatus::Active),
            "failed" => Ok(ClientStatus::Failed),
            other => Err(format!("unknown client status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: ClientId,
    pub name: String,
    /// Subdomain slug or full domain
    pub domain: Option<String>,
    pub region: Option<String>,
    #[serde(default)]
    pub site: SiteConfig,
    pub status: ClientStatus,
    pub deployment_provider: Option<DeploymentProvider>,
    pub provider_project_id: Option<String>,
    pub last_deployment_id: Option<String>,
    pub last_deployed_at: Option<DateTime<Utc>>,
    pub deployment_url: Option<String>,
    pub admin_url: Option<String>,
    pub database_url: Option<String>,
    pub database_provider_id: Option<String>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ClientRecord {
    pub fn new(id: ClientId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            domain: None,
            region: None,
            site: SiteConfig::default(),
            status: ClientStatus::Pending,
            deployment_provider: None,
            provider_project_id: None,
            last_deployment_id: None,
            last_deployed_at: None,
            deployment_url: None,
            admin_url: None,
            database_url: None,
            database_provider_id: None,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Merge a partial update into this record
    pub fn apply(&mut self, update: &ClientUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(provider) = update.deployment_provider {
            self.deployment_provider = Some(provider);
        }
        macro_rules! merge {
            ($($field:ident),*) => {
                $(if let Some(value) = &update.$field {
                    self.$field = Some(value.clone());
                })*
            };
        }
        merge!(
            provider_project_id,
            last_deployment_id,
            last_deployed_at,
            deployment_url,
            admin_url,
            database_url,
            database_provider_id
        );
        if update.status.is_some() {
            self.last_error = update.last_error.clone();
        }
        self.updated_at = Utc::now();
    }
}

/// Partial write against a client record. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientUpdate {
    pub status: Option<ClientStatus>,
    pub deployment_provider: Option<DeploymentProvider>,
    pub provider_project_id: Option<String>,
    pub last_deployment_id: Option<String>,
    pub last_deployed_at: Option<DateTime<Utc>>,
    pub deployment_url: Option<String>,
    pub admin_url: Option<String>,
    pub database_url: Option<String>,
    pub database_provider_id: Option<String>,
    pub last_error: Option<String>,
}

impl ClientUpdate {
    pub fn status(status: ClientStatus) -> Self {
        Self { status: Some(status), ..Default::default() }
    }

    pub fn provisioning() -> Self {
        Self::status(ClientStatus::Provisioning)
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(ClientStatus::Failed),
            last_error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Tags a write with its origin.
///
/// The provisioner marks its own writes so a record-change hook observing
/// them does not start provisioning again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriteContext {
    pub skip_provisioning_hook: bool,
}

impl WriteContext {
    /// Context for writes issued by the provisioner itself
    pub fn provisioner() -> Self {
        Self { skip_provisioning_hook: true }
    }

    /// Context for writes issued by users or other systems
    pub fn external() -> Self {
        Self { skip_provisioning_hook: false }
    }
}
