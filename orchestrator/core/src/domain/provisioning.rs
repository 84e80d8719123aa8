// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Provisioning run model: input, workflow status and terminal result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::deployment::{DeploymentId, DeploymentProvider, ProjectId};
use crate::domain::events::ProgressSink;

/// Tenant identifier as stored in the client record store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Site-level configuration carried through a run.
///
/// `content` holds layout/content references this subsystem never interprets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub display_name: Option<String>,
    pub industry: Option<String>,
    pub primary_color: Option<String>,
    #[serde(default)]
    pub content: serde_json::Value,
}

/// Everything one provisioning run needs. Immutable once the run starts.
#[derive(Clone)]
pub struct ProvisioningInput {
    pub client_id: ClientId,
    pub client_name: String,
    /// Subdomain slug (`acme`) or fully qualified domain (`shop.acme.com`)
    pub domain: String,
    pub site: SiteConfig,
    pub provider: DeploymentProvider,
    pub region: Option<String>,
    /// Caller-supplied environment; wins over generated keys on collision
    pub environment_overrides: BTreeMap<String, String>,
    pub progress: Option<Arc<dyn ProgressSink>>,
}

impl ProvisioningInput {
    pub fn new(
        client_id: ClientId,
        client_name: impl Into<String>,
        domain: impl Into<String>,
        provider: DeploymentProvider,
    ) -> Self {
        Self {
            client_id,
            client_name: client_name.into(),
            domain: domain.into(),
            site: SiteConfig::default(),
            provider,
            region: None,
            environment_overrides: BTreeMap::new(),
            progress: None,
        }
    }

    pub fn with_site(mut self, site: SiteConfig) -> Self {
        self.site = site;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
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

    /// Name shown on the site: explicit display name, else the client name
    pub fn site_name(&self) -> &str {
        self.site.display_name.as_deref().unwrap_or(&self.client_name)
    }

    /// Fully qualified domain for this run, if one can be derived
    pub fn fqdn(&self, base_domain: Option<&str>) -> Option<String> {
        let domain = self.domain.trim().trim_end_matches('.').to_ascii_lowercase();
        if domain.is_empty() {
            return None;
        }
        if domain.contains('.') {
            return Some(domain);
        }
        base_domain
            .map(|base| base.trim().trim_matches('.'))
            .filter(|base| !base.is_empty())
            .map(|base| format!("{}.{}", domain, base))
    }
}

impl fmt::Debug for ProvisioningInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisioningInput")
            .field("client_id", &self.client_id)
            .field("client_name", &self.client_name)
            .field("domain", &self.domain)
            .field("provider", &self.provider)
            .field("region", &self.region)
            .field("environment_overrides", &self.environment_overrides.keys().collect::<Vec<_>>())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Workflow states of a run.
///
/// Transitions only move forward, except that any state may jump to `Failed`
/// (optionally via `RollingBack`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStatus {
    Pending,
    CreatingDatabase,
    CreatingProject,
    ConfiguringDns,
    ConfiguringEnv,
    Deploying,
    Completed,
    Failed,
    RollingBack,
}

impl ProvisioningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningStatus::Pending => "pending",
            ProvisioningStatus::CreatingDatabase => "creating_database",
            ProvisioningStatus::CreatingProject => "creating_project",
            ProvisioningStatus::ConfiguringDns => "configuring_dns",
            ProvisioningStatus::ConfiguringEnv => "configuring_env",
            ProvisioningStatus::Deploying => "deploying",
            ProvisioningStatus::Completed => "completed",
            ProvisioningStatus::Failed => "failed",
            ProvisioningStatus::RollingBack => "rolling_back",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProvisioningStatus::Completed | ProvisioningStatus::Failed)
    }

    fn step_index(&self) -> u8 {
        match self {
            ProvisioningStatus::Pending => 0,
            ProvisioningStatus::CreatingDatabase => 1,
            ProvisioningStatus::CreatingProject => 2,
            ProvisioningStatus::ConfiguringDns => 3,
            ProvisioningStatus::ConfiguringEnv => 4,
            ProvisioningStatus::Deploying => 5,
            ProvisioningStatus::Completed => 6,
            ProvisioningStatus::RollingBack => 7,
            ProvisioningStatus::Failed => 8,
        }
    }

    /// Whether moving from `self` to `next` respects the workflow ordering
    pub fn can_transition_to(&self, next: ProvisioningStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            ProvisioningStatus::Failed => true,
            ProvisioningStatus::RollingBack => *self != ProvisioningStatus::RollingBack,
            _ if *self == ProvisioningStatus::RollingBack => false,
            _ => next.step_index() >= self.step_index(),
        }
    }
}

impl fmt::Display for ProvisioningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal record of one run; produced exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningResult {
    pub success: bool,
    pub client_id: ClientId,
    pub provider: DeploymentProvider,
    pub status: ProvisioningStatus,
    pub deployment_url: Option<String>,
    pub admin_url: Option<String>,
    pub preview_url: Option<String>,
    pub project_id: Option<ProjectId>,
    pub deployment_id: Option<DeploymentId>,
    pub database_url: Option<String>,
    pub database_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub logs: Vec<String>,
    pub error: Option<String>,
}

impl ProvisioningResult {
    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fqdn_from_subdomain_and_base() {
        let input = ProvisioningInput::new(ClientId::new("t1"), "Acme", "Acme", DeploymentProvider::Vercel);
        assert_eq!(input.fqdn(Some("sites.example.com")), Some("acme.sites.example.com".to_string()));
        assert_eq!(input.fqdn(Some(".sites.example.com.")), Some("acme.sites.example.com".to_string()));
        assert_eq!(input.fqdn(None), None);
    }

    #[test]
    fn test_fqdn_keeps_full_domain() {
        let input = ProvisioningInput::new(ClientId::new("t1"), "Acme", "shop.acme.com.", DeploymentProvider::Forge);
        assert_eq!(input.fqdn(Some("sites.example.com")), Some("shop.acme.com".to_string()));
    }

    #[test]
    fn test_status_transitions_are_forward_only() {
        use ProvisioningStatus::*;
        assert!(Pending.can_transition_to(CreatingDatabase));
        assert!(CreatingProject.can_transition_to(ConfiguringDns));
        assert!(Deploying.can_transition_to(Deploying));
        assert!(!Deploying.can_transition_to(CreatingProject));
        assert!(ConfiguringEnv.can_transition_to(Failed));
        assert!(ConfiguringEnv.can_transition_to(RollingBack));
        assert!(RollingBack.can_transition_to(Failed));
        assert!(!RollingBack.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Failed));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ProvisioningStatus::CreatingDatabase).unwrap();
        assert_eq!(json, "\"creating_database\"");
        assert_eq!(ProvisioningStatus::RollingBack.to_string(), "rolling_back");
    }

    #[test]
    fn test_site_name_falls_back_to_client_name() {
        let input = ProvisioningInput::new(ClientId::new("t1"), "Acme Ltd", "acme", DeploymentProvider::Forge);
        assert_eq!(input.site_name(), "Acme Ltd");
        let input = input.with_site(SiteConfig { display_name: Some("Acme Shop".into()), ..Default::default() });
        assert_eq!(input.site_name(), "Acme Shop");
    }
}
