// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Client Record Repository Implementations
//!
//! Infrastructure implementations of [`ClientRecordRepository`].
//!
//! - **PostgresClientRepository** - `clients` table via `sqlx`
//! - **InMemoryClientRepository** - HashMap-backed storage for tests and
//!   development, with a write log for asserting side effects
//! - **ObservedClientRepository** - decorator that runs registered
//!   [`ClientChangeListener`]s after every successful save or update
//!
//! Listeners are registered after construction because the record-change hook
//! needs the repository it observes.

pub mod postgres_client;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::domain::client::{ClientRecord, ClientStatus, ClientUpdate, WriteContext};
use crate::domain::provisioning::ClientId;
use crate::domain::repository::{ClientChangeListener, ClientRecordRepository, RepositoryError};

pub use postgres_client::PostgresClientRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Save,
    Apply,
    Delete,
}

/// One write observed by the in-memory store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteLogEntry {
    pub client_id: ClientId,
    pub kind: WriteKind,
    /// Status set by the write, if any
    pub status: Option<ClientStatus>,
    pub context: WriteContext,
}

#[derive(Clone, Default)]
pub struct InMemoryClientRepository {
    records: Arc<RwLock<HashMap<ClientId, ClientRecord>>>,
    writes: Arc<RwLock<Vec<WriteLogEntry>>>,
}

impl InMemoryClientRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = ClientRecord>) -> Self {
        let repository = Self::new();
        {
            let mut map = repository.records.write();
            for record in records {
                map.insert(record.id.clone(), record);
            }
        }
        repository
    }

    pub fn write_log(&self) -> Vec<WriteLogEntry> {
        self.writes.read().clone()
    }

    fn log(&self, client_id: &ClientId, kind: WriteKind, status: Option<ClientStatus>, context: WriteContext) {
        self.writes.write().push(WriteLogEntry { client_id: client_id.clone(), kind, status, context });
    }
}

#[async_trait]
impl ClientRecordRepository for InMemoryClientRepository {
    async fn find_by_id(&self, id: &ClientId) -> Result<Option<ClientRecord>, RepositoryError> {
        Ok(self.records.read().get(id).cloned())
    }

    async fn save(&self, record: &ClientRecord, context: WriteContext) -> Result<(), RepositoryError> {
        self.records.write().insert(record.id.clone(), record.clone());
        self.log(&record.id, WriteKind::Save, Some(record.status), context);
        Ok(())
    }

    async fn apply(
        &self,
        id: &ClientId,
        update: &ClientUpdate,
        context: WriteContext,
    ) -> Result<ClientRecord, RepositoryError> {
        let updated = {
            let mut records = self.records.write();
            let record = records
                .get_mut(id)
                .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
            record.apply(update);
            record.clone()
        };
        self.log(id, WriteKind::Apply, update.status, context);
        Ok(updated)
    }

    async fn delete(&self, id: &ClientId) -> Result<(), RepositoryError> {
        self.records.write().remove(id);
        self.log(id, WriteKind::Delete, None, WriteContext::default());
        Ok(())
    }
}

/// Runs change listeners after writes to the wrapped repository
pub struct ObservedClientRepository {
    inner: Arc<dyn ClientRecordRepository>,
    listeners: RwLock<Vec<Arc<dyn ClientChangeListener>>>,
}

impl ObservedClientRepository {
    pub fn new(inner: Arc<dyn ClientRecordRepository>) -> Self {
        Self { inner, listeners: RwLock::new(Vec::new()) }
    }

    pub fn add_listener(&self, listener: Arc<dyn ClientChangeListener>) {
        self.listeners.write().push(listener);
    }

    async fn notify(&self, previous: Option<&ClientRecord>, current: &ClientRecord, context: WriteContext) {
        let listeners = self.listeners.read().clone();
        debug!(client_id = %current.id, listeners = listeners.len(), "Client record changed");
        for listener in listeners {
            listener.after_change(previous, current, context).await;
        }
    }
}

#[async_trait]
impl ClientRecordRepository for ObservedClientRepository {
    async fn find_by_id(&self, id: &ClientId) -> Result<Option<ClientRecord>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn save(&self, record: &ClientRecord, context: WriteContext) -> Result<(), RepositoryError> {
        let previous = self.inner.find_by_id(&record.id).await?;
        self.inner.save(record, context).await?;
        self.notify(previous.as_ref(), record, context).await;
        Ok(())
    }

    async fn apply(
        &self,
        id: &ClientId,
        update: &ClientUpdate,
        context: WriteContext,
    ) -> Result<ClientRecord, RepositoryError> {
        let previous = self.inner.find_by_id(id).await?;
        let current = self.inner.apply(id, update, context).await?;
        self.notify(previous.as_ref(), &current, context).await;
        Ok(current)
    }

    async fn delete(&self, id: &ClientId) -> Result<(), RepositoryError> {
        self.inner.delete(id).await
    }
}
