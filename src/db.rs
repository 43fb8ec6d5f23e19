//! Database connection management
//!
//! Handles connection pooling, schema creation and the versioned envelope
//! every persisted payload is wrapped in.

use crate::config::DatabaseConfig;
use crate::error::AppError;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_postgres::NoTls;
use tracing::info;

/// A persisted payload tagged with the schema version it was written with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Versioned<T> {
    pub schema_version: u32,
    pub data: T,
}

impl<T: Serialize + DeserializeOwned> Versioned<T> {
    pub fn new(schema_version: u32, data: T) -> Self {
        Self { schema_version, data }
    }

    pub fn encode(&self) -> Result<serde_json::Value, AppError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode a stored envelope, refusing versions this build does not know
    pub fn decode(value: serde_json::Value, expected_version: u32) -> Result<T, AppError> {
        let envelope: Versioned<T> = serde_json::from_value(value)?;
        if envelope.schema_version != expected_version {
            return Err(AppError::Conflict(format!(
                "Stored schema version {} is not supported (expected {})",
                envelope.schema_version, expected_version
            )));
        }
        Ok(envelope.data)
    }
}

/// Create a pool from a DATABASE_URL, using TLS when the server requires it
pub async fn init_pool(database_url: &str, config: &DatabaseConfig) -> Result<Pool, AppError> {
    let use_tls = database_url.contains("sslmode=require") || config.host.contains("neon.tech");

    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());
    cfg.dbname = Some(config.database.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(deadpool_postgres::PoolConfig::new(config.max_pool_size));

    let pool = if use_tls {
        let certs = rustls_native_certs::load_native_certs();
        let mut root_store = rustls::RootCertStore::empty();
        for cert in certs.certs {
            root_store.add(cert).ok();
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

        cfg.create_pool(Some(Runtime::Tokio1), tls)
            .map_err(|e| AppError::Config(format!("Failed to create TLS pool: {}", e)))?
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| AppError::Config(format!("Failed to create pool: {}", e)))?
    };

    // Test the connection
    let client = pool.get().await?;
    client.query_one("SELECT 1 as ok", &[]).await?;

    info!("✅ Database connection successful (TLS: {})", use_tls);
    Ok(pool)
}

/// Create the link and preference tables if they don't exist
pub async fn create_tables(pool: &Pool) -> Result<(), AppError> {
    let client = pool.get().await?;

    client
        .execute(
            "CREATE TABLE IF NOT EXISTS broadcast_links (
                workspace_id BIGINT NOT NULL,
                record_id BIGINT NOT NULL,
                schema_version INTEGER NOT NULL,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (workspace_id, record_id)
            )",
            &[],
        )
        .await?;

    client
        .execute(
            "CREATE TABLE IF NOT EXISTS broadcast_preferences (
                user_id BIGINT PRIMARY KEY,
                schema_version INTEGER NOT NULL,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            &[],
        )
        .await?;

    info!("✅ Database tables initialized");
    Ok(())
}

/// Ids are unsigned in the API but stored in BIGINT columns
pub fn to_db_id(value: u64, what: &str) -> Result<i64, AppError> {
    i64::try_from(value).map_err(|_| AppError::BadRequest(format!("{} {} is out of range", what, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::LinkEntry;
    use crate::models::WorkspaceRecordId;

    #[test]
    fn test_envelope_layout() {
        let mut entry = LinkEntry::new();
        entry.set_linked_parent(WorkspaceRecordId::new(1, 100)).unwrap();

        let value = Versioned::new(1, entry).encode().unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "schemaVersion": 1,
                "data": {
                    "linkedParent": { "workspace": 1, "record": 100 },
                    "linkedChildren": {}
                }
            })
        );
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let value = serde_json::json!({ "schemaVersion": 9, "data": {} });
        let result = Versioned::<LinkEntry>::decode(value, 1);
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_decode_children_keys() {
        let value = serde_json::json!({
            "schemaVersion": 1,
            "data": { "linkedChildren": { "2": 201, "3": 301 } }
        });
        let entry = Versioned::<LinkEntry>::decode(value, 1).unwrap();
        assert_eq!(entry.linked_child_on(3), Some(301));
        assert_eq!(entry.linked_parent(), None);
    }

    #[test]
    fn test_db_id_range() {
        assert_eq!(to_db_id(42, "record").unwrap(), 42);
        assert_eq!(to_db_id(i64::MAX as u64, "record").unwrap(), i64::MAX);
        assert!(matches!(to_db_id(i64::MAX as u64 + 1, "record"), Err(AppError::BadRequest(_))));
        assert!(matches!(to_db_id(u64::MAX, "user"), Err(AppError::BadRequest(_))));
    }
}
