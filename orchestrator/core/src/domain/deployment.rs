// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Deployment Adapter Domain Interface (Anti-Corruption Layer)
//!
//! Provider-agnostic contract every hosting backend is wrapped behind.
//! Implementations live in `crate::infrastructure::deployment`.
//!
//! Identifiers returned by an adapter (`ProjectId`, `DeploymentId`) are opaque:
//! only the adapter that produced an identifier may parse it. The orchestrator
//! stores and forwards them verbatim, which is what lets one orchestrator drive
//! backends whose identifier shapes are structurally incompatible.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::dns::DnsRecord;

/// Hosting backend a tenant is deployed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentProvider {
    /// Serverless / static hosting (Vercel)
    Vercel,
    /// Server / VPS management (Laravel Forge)
    #[default]
    Forge,
}

impl DeploymentProvider {
    pub const ALL: [DeploymentProvider; 2] = [DeploymentProvider::Vercel, DeploymentProvider::Forge];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentProvider::Vercel => "vercel",
            DeploymentProvider::Forge => "forge",
        }
    }
}

impl fmt::Display for DeploymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentProvider {
    type Err = DeploymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vercel" => Ok(DeploymentProvider::Vercel),
            "forge" | "laravel-forge" => Ok(DeploymentProvider::Forge),
            other => Err(DeploymentError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Opaque provider project identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque provider deployment identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentId(String);

impl DeploymentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateProjectRequest {
    /// Provider-side project name (already slugified)
    pub name: String,
    /// Fully qualified domain the site will answer on, when known
    pub domain: Option<String>,
    pub environment: BTreeMap<String, String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedProject {
    pub project_id: ProjectId,
    /// Platform default address (e.g. `https://site.vercel.app` or `http://<server ip>`)
    pub project_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct DeployRequest {
    pub git_url: Option<String>,
    pub build_command: Option<String>,
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub deployment_id: DeploymentId,
    pub deployment_url: String,
    pub state: DeploymentState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentState {
    Queued,
    Building,
    Ready,
    Error,
    Canceled,
}

impl DeploymentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentState::Ready | DeploymentState::Error | DeploymentState::Canceled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::Queued => "queued",
            DeploymentState::Building => "building",
            DeploymentState::Ready => "ready",
            DeploymentState::Error => "error",
            DeploymentState::Canceled => "canceled",
        }
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentStatus {
    pub state: DeploymentState,
    pub url: Option<String>,
    pub error: Option<String>,
}

impl DeploymentStatus {
    pub fn new(state: DeploymentState) -> Self {
        Self { state, url: None, error: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainConfiguration {
    pub domain: String,
    pub configured: bool,
    /// Records the provider expects to exist for the domain to resolve
    pub dns_records: Vec<DnsRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectInfo {
    pub id: ProjectId,
    pub name: String,
    pub url: String,
    pub status: String,
}

/// Domain interface for hosting backends
#[async_trait]
pub trait DeploymentAdapter: Send + Sync {
    fn provider(&self) -> DeploymentProvider;

    async fn create_project(&self, request: &CreateProjectRequest) -> Result<CreatedProject, DeploymentError>;

    async fn deploy(&self, project_id: &ProjectId, request: &DeployRequest) -> Result<Deployment, DeploymentError>;

    async fn get_deployment_status(&self, deployment_id: &DeploymentId) -> Result<DeploymentStatus, DeploymentError>;

    /// Attach a custom domain. `Ok(None)` means the backend has no domain support.
    async fn configure_domain(
        &self,
        _project_id: &ProjectId,
        _domain: &str,
    ) -> Result<Option<DomainConfiguration>, DeploymentError> {
        Ok(None)
    }

    async fn update_environment_variables(
        &self,
        project_id: &ProjectId,
        variables: &BTreeMap<String, String>,
    ) -> Result<(), DeploymentError>;

    async fn delete_project(&self, project_id: &ProjectId) -> Result<(), DeploymentError>;

    async fn get_project(&self, project_id: &ProjectId) -> Result<ProjectInfo, DeploymentError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DeploymentError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Unsupported deployment provider: {0}")]
    UnsupportedProvider(String),
}

impl DeploymentError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DeploymentError::Network(_) | DeploymentError::RateLimited | DeploymentError::Unavailable(_)
        )
    }
}
