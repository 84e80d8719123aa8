// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Neon Database Provisioner
//
// One Neon project per tenant; the project id doubles as the database id.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::domain::database::{CreateDatabaseRequest, DatabaseError, DatabaseProvisioner, ProvisionedDatabase};
use crate::domain::provisioner_config::{resolve_secret, NeonConfig};

pub struct NeonDatabaseProvisioner {
    client: reqwest::Client,
    api_url: String,
    token: String,
    region: String,
    pg_version: u32,
}

#[derive(Deserialize)]
struct CreateProjectResponse {
    project: NeonProject,
    #[serde(default)]
    connection_uris: Vec<ConnectionUri>,
}

#[derive(Deserialize)]
struct NeonProject {
    id: String,
}

#[derive(Deserialize)]
struct ConnectionUri {
    connection_uri: String,
}

impl NeonDatabaseProvisioner {
    pub fn new(api_url: String, token: String, region: String, pg_version: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            token,
            region,
            pg_version,
        }
    }

    pub fn from_config(config: &NeonConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            config.api_url.clone(),
            resolve_secret(&config.token)?,
            config.region.clone(),
            config.pg_version,
        ))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), path)
    }
}

async fn check_response(response: reqwest::Response, resource: &str) -> Result<reqwest::Response, DatabaseError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response.text().await.unwrap_or_default();

    Err(if status == 401 || status == 403 {
        DatabaseError::Authentication(error_text)
    } else if status == 404 {
        DatabaseError::NotFound(resource.to_string())
    } else if status == 402 || (status == 422 && error_text.to_ascii_lowercase().contains("limit")) {
        DatabaseError::QuotaExceeded(error_text)
    } else if status.is_server_error() || status == 429 {
        DatabaseError::Network(format!("HTTP {}: {}", status, error_text))
    } else {
        DatabaseError::Provider(format!("HTTP {}: {}", status, error_text))
    })
}

#[async_trait]
impl DatabaseProvisioner for NeonDatabaseProvisioner {
    async fn create_database(&self, request: &CreateDatabaseRequest) -> Result<ProvisionedDatabase, DatabaseError> {
        let region = request.region.as_deref().unwrap_or(&self.region);
        let body = json!({
            "project": {
                "name": request.name,
                "region_id": region,
                "pg_version": self.pg_version,
            }
        });

        let response = self
            .client
            .post(self.url("/projects"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| DatabaseError::Network(e.to_string()))?;
        let created: CreateProjectResponse = check_response(response, &request.name)
            .await?
            .json()
            .await
            .map_err(|e| DatabaseError::Provider(format!("Failed to parse response: {}", e)))?;

        let connection_string = created
            .connection_uris
            .into_iter()
            .next()
            .map(|c| c.connection_uri)
            .ok_or_else(|| DatabaseError::Provider("Neon returned no connection URI".to_string()))?;

        info!("Neon project created: {} ({})", request.name, created.project.id);
        Ok(ProvisionedDatabase {
            database_id: created.project.id,
            connection_string,
        })
    }

    async fn delete_database(&self, database_id: &str) -> Result<(), DatabaseError> {
        let response = self
            .client
            .delete(self.url(&format!("/projects/{}", database_id)))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| DatabaseError::Network(e.to_string()))?;
        match check_response(response, database_id).await {
            Ok(_) | Err(DatabaseError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
