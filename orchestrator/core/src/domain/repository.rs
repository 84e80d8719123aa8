// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Client Record Store Interface
//!
//! Persistence contract for the `ClientRecord` aggregate, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `ClientRecordRepository` | `ClientRecord` | `InMemoryClientRepository`, `PostgresClientRepository` |
//!
//! Every write carries a [`WriteContext`] so change listeners can tell the
//! provisioner's own writes apart from external ones.

use async_trait::async_trait;

use crate::domain::client::{ClientRecord, ClientUpdate, WriteContext};
use crate::domain::provisioning::ClientId;

/// Storage backend for the client record store
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
}

#[async_trait]
pub trait ClientRecordRepository: Send + Sync {
    /// Find client by ID
    async fn find_by_id(&self, id: &ClientId) -> Result<Option<ClientRecord>, RepositoryError>;

    /// Insert or replace a full record
    async fn save(&self, record: &ClientRecord, context: WriteContext) -> Result<(), RepositoryError>;

    /// Apply a partial update and return the record as stored afterwards
    async fn apply(
        &self,
        id: &ClientId,
        update: &ClientUpdate,
        context: WriteContext,
    ) -> Result<ClientRecord, RepositoryError>;

    /// Delete client by ID
    async fn delete(&self, id: &ClientId) -> Result<(), RepositoryError>;
}

/// Observer of record changes (the record-change hook seam)
#[async_trait]
pub trait ClientChangeListener: Send + Sync {
    async fn after_change(&self, previous: Option<&ClientRecord>, current: &ClientRecord, context: WriteContext);
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
