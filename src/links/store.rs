//! Link entry persistence backends

use super::{LinkEntry, LINK_SCHEMA_VERSION};
use crate::db::{to_db_id, Versioned};
use crate::error::AppError;
use crate::models::WorkspaceRecordId;
use deadpool_postgres::Pool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Key-value storage for link entries
#[async_trait::async_trait]
pub trait LinkStore: Send + Sync {
    async fn get(&self, key: WorkspaceRecordId) -> Result<Option<LinkEntry>, AppError>;

    async fn put(&self, key: WorkspaceRecordId, entry: &LinkEntry) -> Result<(), AppError>;

    async fn delete(&self, key: WorkspaceRecordId) -> Result<(), AppError>;
}

/// Link entries kept in process memory
pub struct MemoryLinkStore {
    entries: RwLock<HashMap<WorkspaceRecordId, LinkEntry>>,
}

impl MemoryLinkStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryLinkStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LinkStore for MemoryLinkStore {
    async fn get(&self, key: WorkspaceRecordId) -> Result<Option<LinkEntry>, AppError> {
        Ok(self.entries.read().await.get(&key).cloned())
    }

    async fn put(&self, key: WorkspaceRecordId, entry: &LinkEntry) -> Result<(), AppError> {
        self.entries.write().await.insert(key, entry.clone());
        Ok(())
    }

    async fn delete(&self, key: WorkspaceRecordId) -> Result<(), AppError> {
        self.entries.write().await.remove(&key);
        Ok(())
    }
}

/// Link entries in the `broadcast_links` table
pub struct PostgresLinkStore {
    pool: Pool,
}

impl PostgresLinkStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn key_columns(key: WorkspaceRecordId) -> Result<(i64, i64), AppError> {
    Ok((to_db_id(key.workspace, "workspace")?, to_db_id(key.record, "record")?))
}

#[async_trait::async_trait]
impl LinkStore for PostgresLinkStore {
    async fn get(&self, key: WorkspaceRecordId) -> Result<Option<LinkEntry>, AppError> {
        let (workspace, record) = key_columns(key)?;
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT data FROM broadcast_links WHERE workspace_id = $1 AND record_id = $2",
                &[&workspace, &record],
            )
            .await?;

        row.map(|r| {
            let data: serde_json::Value = r.get(0);
            Versioned::<LinkEntry>::decode(data, LINK_SCHEMA_VERSION)
        })
        .transpose()
    }

    async fn put(&self, key: WorkspaceRecordId, entry: &LinkEntry) -> Result<(), AppError> {
        let (workspace, record) = key_columns(key)?;
        let data = Versioned::new(LINK_SCHEMA_VERSION, entry.clone()).encode()?;
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO broadcast_links (workspace_id, record_id, schema_version, data, updated_at)
                 VALUES ($1, $2, $3, $4, NOW())
                 ON CONFLICT (workspace_id, record_id)
                 DO UPDATE SET schema_version = EXCLUDED.schema_version,
                               data = EXCLUDED.data,
                               updated_at = NOW()",
                &[
                    &workspace,
                    &record,
                    &(LINK_SCHEMA_VERSION as i32),
                    &data,
                ],
            )
            .await?;

        debug!("Persisted link entry for {}", key);
        Ok(())
    }

    async fn delete(&self, key: WorkspaceRecordId) -> Result<(), AppError> {
        let (workspace, record) = key_columns(key)?;
        let client = self.pool.get().await?;
        client
            .execute(
                "DELETE FROM broadcast_links WHERE workspace_id = $1 AND record_id = $2",
                &[&workspace, &record],
            )
            .await?;
        Ok(())
    }
}
