// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Client Repository
//!
//! `ClientRecordRepository` backed by the `clients` table (see
//! `migrations/001_create_clients.sql`). Partial updates lock the row, merge
//! in the domain type and write the whole row back inside one transaction.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::client::{ClientRecord, ClientStatus, ClientUpdate, WriteContext};
use crate::domain::provisioning::{ClientId, SiteConfig};
use crate::domain::repository::{ClientRecordRepository, RepositoryError};

const SELECT_COLUMNS: &str = r#"
    SELECT id, name, domain, region, site, status, deployment_provider,
           provider_project_id, last_deployment_id, last_deployed_at,
           deployment_url, admin_url, database_url, database_provider_id,
           last_error, updated_at
    FROM clients
"#;

const UPSERT: &str = r#"
    INSERT INTO clients (
        id, name, domain, region, site, status, deployment_provider,
        provider_project_id, last_deployment_id, last_deployed_at,
        deployment_url, admin_url, database_url, database_provider_id,
        last_error, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
    ON CONFLICT (id) DO UPDATE SET
        name = EXCLUDED.name,
        domain = EXCLUDED.domain,
        region = EXCLUDED.region,
        site = EXCLUDED.site,
        status = EXCLUDED.status,
        deployment_provider = EXCLUDED.deployment_provider,
        provider_project_id = EXCLUDED.provider_project_id,
        last_deployment_id = EXCLUDED.last_deployment_id,
        last_deployed_at = EXCLUDED.last_deployed_at,
        deployment_url = EXCLUDED.deployment_url,
        admin_url = EXCLUDED.admin_url,
        database_url = EXCLUDED.database_url,
        database_provider_id = EXCLUDED.database_provider_id,
        last_error = EXCLUDED.last_error,
        updated_at = EXCLUDED.updated_at
"#;

pub struct PostgresClientRepository {
    pool: PgPool,
}

impl PostgresClientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &PgRow) -> Result<ClientRecord, RepositoryError> {
    let site: serde_json::Value = row.try_get("site")?;
    let site: SiteConfig = serde_json::from_value(site)?;

    let status: String = row.try_get("status")?;
    let status: ClientStatus = status.parse().map_err(RepositoryError::Serialization)?;

    let provider: Option<String> = row.try_get("deployment_provider")?;
    let deployment_provider = provider
        .map(|p| p.parse())
        .transpose()
        .map_err(|e: crate::domain::deployment::DeploymentError| RepositoryError::Serialization(e.to_string()))?;

    let id: String = row.try_get("id")?;
    Ok(ClientRecord {
        id: ClientId::new(id),
        name: row.try_get("name")?,
        domain: row.try_get("domain")?,
        region: row.try_get("region")?,
        site,
        status,
        deployment_provider,
        provider_project_id: row.try_get("provider_project_id")?,
        last_deployment_id: row.try_get("last_deployment_id")?,
        last_deployed_at: row.try_get("last_deployed_at")?,
        deployment_url: row.try_get("deployment_url")?,
        admin_url: row.try_get("admin_url")?,
        database_url: row.try_get("database_url")?,
        database_provider_id: row.try_get("database_provider_id")?,
        last_error: row.try_get("last_error")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn upsert<'e, E>(executor: E, record: &ClientRecord) -> Result<(), RepositoryError>
where
    E: sqlx::PgExecutor<'e>,
{
    let site = serde_json::to_value(&record.site)?;
    sqlx::query(UPSERT)
        .bind(record.id.as_str())
        .bind(&record.name)
        .bind(&record.domain)
        .bind(&record.region)
        .bind(site)
        .bind(record.status.as_str())
        .bind(record.deployment_provider.map(|p| p.as_str()))
        .bind(&record.provider_project_id)
        .bind(&record.last_deployment_id)
        .bind(record.last_deployed_at)
        .bind(&record.deployment_url)
        .bind(&record.admin_url)
        .bind(&record.database_url)
        .bind(&record.database_provider_id)
        .bind(&record.last_error)
        .bind(record.updated_at)
        .execute(executor)
        .await?;
    Ok(())
}

#[async_trait]
impl ClientRecordRepository for PostgresClientRepository {
    async fn find_by_id(&self, id: &ClientId) -> Result<Option<ClientRecord>, RepositoryError> {
        let row = sqlx::query(&format!("{} WHERE id = $1", SELECT_COLUMNS))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn save(&self, record: &ClientRecord, _context: WriteContext) -> Result<(), RepositoryError> {
        upsert(&self.pool, record).await
    }

    async fn apply(
        &self,
        id: &ClientId,
        update: &ClientUpdate,
        _context: WriteContext,
    ) -> Result<ClientRecord, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!("{} WHERE id = $1 FOR UPDATE", SELECT_COLUMNS))
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        let mut record = row_to_record(&row)?;
        record.apply(update);

        upsert(&mut *tx, &record).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn delete(&self, id: &ClientId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
