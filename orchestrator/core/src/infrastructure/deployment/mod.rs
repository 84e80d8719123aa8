// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Deployment Adapter Registry
//
// Builds one adapter per configured hosting backend and resolves them by
// provider. Lookup is a closed table: an unknown provider string fails at
// parse time, a known but unconfigured one resolves to `None`.

pub mod forge;
pub mod vercel;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::deployment::{DeploymentAdapter, DeploymentError, DeploymentProvider};
use crate::domain::provisioner_config::ProvisionerConfig;

pub use forge::{classify_deployment_description, ForgeAdapter};
pub use vercel::VercelAdapter;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Registry of deployment adapters keyed by provider
#[derive(Default)]
pub struct DeploymentAdapterRegistry {
    adapters: HashMap<DeploymentProvider, Arc<dyn DeploymentAdapter>>,
}

impl DeploymentAdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create every adapter that has credentials in the configuration
    pub fn from_config(config: &ProvisionerConfig) -> Self {
        let mut registry = Self::new();

        info!("Initializing deployment adapter registry");

        for provider in DeploymentProvider::ALL {
            match create_deployment_adapter(provider, config) {
                Ok(adapter) => {
                    info!("Deployment adapter '{}' ready", provider);
                    registry.register(adapter);
                }
                Err(e) => warn!("Deployment adapter '{}' unavailable: {}", provider, e),
            }
        }

        if registry.adapters.is_empty() {
            warn!("No deployment adapters configured - every provisioning run will fail");
        }

        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn DeploymentAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn DeploymentAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, provider: DeploymentProvider) -> Option<Arc<dyn DeploymentAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    pub fn providers(&self) -> Vec<DeploymentProvider> {
        let mut providers: Vec<_> = self.adapters.keys().copied().collect();
        providers.sort_by_key(|p| p.as_str());
        providers
    }
}

/// Factory for a single provider's adapter
pub fn create_deployment_adapter(
    provider: DeploymentProvider,
    config: &ProvisionerConfig,
) -> anyhow::Result<Arc<dyn DeploymentAdapter>> {
    let adapter: Arc<dyn DeploymentAdapter> = match provider {
        DeploymentProvider::Vercel => {
            let vercel = config
                .vercel
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("no vercel section in configuration"))?;
            Arc::new(VercelAdapter::from_config(vercel)?)
        }
        DeploymentProvider::Forge => {
            let forge = config
                .forge
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("no forge section in configuration"))?;
            Arc::new(ForgeAdapter::from_config(forge)?)
        }
    };
    Ok(adapter)
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

pub(crate) fn transport_error(e: reqwest::Error) -> DeploymentError {
    DeploymentError::Network(e.to_string())
}

/// Map a non-success response into the provider-agnostic error
pub(crate) async fn check_response(
    response: reqwest::Response,
    resource: &str,
) -> Result<reqwest::Response, DeploymentError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response.text().await.unwrap_or_default();

    Err(if status == 401 || status == 403 {
        DeploymentError::Authentication(error_text)
    } else if status == 429 {
        DeploymentError::RateLimited
    } else if status == 404 {
        DeploymentError::NotFound(resource.to_string())
    } else if status.is_server_error() {
        DeploymentError::Unavailable(format!("HTTP {}: {}", status, error_text))
    } else {
        DeploymentError::Provider(format!("HTTP {}: {}", status, error_text))
    })
}

pub(crate) async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, DeploymentError> {
    response
        .json()
        .await
        .map_err(|e| DeploymentError::Provider(format!("Failed to parse response: {}", e)))
}
