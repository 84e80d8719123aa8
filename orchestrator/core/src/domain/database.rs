// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Database Provisioner Domain Interface
//!
//! One dedicated managed database per tenant.

use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct CreateDatabaseRequest {
    pub name: String,
    pub region: Option<String>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct ProvisionedDatabase {
    /// Provider-side database identifier, kept for cleanup
    pub database_id: String,
    pub connection_string: String,
}

// Connection strings embed credentials.
impl std::fmt::Debug for ProvisionedDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionedDatabase")
            .field("database_id", &self.database_id)
            .field("connection_string", &"<redacted>")
            .finish()
    }
}

#[async_trait]
pub trait DatabaseProvisioner: Send + Sync {
    async fn create_database(&self, request: &CreateDatabaseRequest) -> Result<ProvisionedDatabase, DatabaseError>;

    async fn delete_database(&self, database_id: &str) -> Result<(), DatabaseError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Database not found: {0}")]
    NotFound(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Provider error: {0}")]
    Provider(String),
}
