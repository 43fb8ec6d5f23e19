//! Per-user last-used broadcast settings
//!
//! Remembered whenever a broadcast request asks for it, and replayed by the
//! save hook so that re-saving a source record re-broadcasts it the same way.

use crate::broadcast::context::Facets;
use crate::db::{to_db_id, Versioned};
use crate::error::AppError;
use crate::models::WorkspaceId;
use deadpool_postgres::Pool;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

pub const PREFERENCES_SCHEMA_VERSION: u32 = 1;

/// Identifier of the user a preference belongs to
pub type UserId = u64;

/// What a user broadcast to last time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastUsedSettings {
    pub targets: Vec<WorkspaceId>,
    pub facets: Facets,
}

enum Backend {
    Memory(RwLock<HashMap<UserId, LastUsedSettings>>),
    Postgres(Pool),
}

pub struct PreferenceStore {
    backend: Backend,
}

impl PreferenceStore {
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(RwLock::new(HashMap::new())),
        }
    }

    /// Preferences in the `broadcast_preferences` table
    pub fn postgres(pool: Pool) -> Self {
        Self {
            backend: Backend::Postgres(pool),
        }
    }

    pub async fn last_used(&self, user: UserId) -> Result<Option<LastUsedSettings>, AppError> {
        match &self.backend {
            Backend::Memory(map) => Ok(map.read().await.get(&user).cloned()),
            Backend::Postgres(pool) => {
                let user = to_db_id(user, "user")?;
                let client = pool.get().await?;
                let row = client
                    .query_opt(
                        "SELECT data FROM broadcast_preferences WHERE user_id = $1",
                        &[&user],
                    )
                    .await?;

                row.map(|r| {
                    let data: serde_json::Value = r.get(0);
                    Versioned::<LastUsedSettings>::decode(data, PREFERENCES_SCHEMA_VERSION)
                })
                .transpose()
            }
        }
    }

    pub async fn remember(&self, user: UserId, settings: LastUsedSettings) -> Result<(), AppError> {
        debug!("Remembering broadcast settings for user {}", user);

        match &self.backend {
            Backend::Memory(map) => {
                map.write().await.insert(user, settings);
                Ok(())
            }
            Backend::Postgres(pool) => {
                let user = to_db_id(user, "user")?;
                let data = Versioned::new(PREFERENCES_SCHEMA_VERSION, settings).encode()?;
                let client = pool.get().await?;
                client
                    .execute(
                        "INSERT INTO broadcast_preferences (user_id, schema_version, data, updated_at)
                         VALUES ($1, $2, $3, NOW())
                         ON CONFLICT (user_id)
                         DO UPDATE SET schema_version = EXCLUDED.schema_version,
                                       data = EXCLUDED.data,
                                       updated_at = NOW()",
                        &[
                            &user,
                            &(PREFERENCES_SCHEMA_VERSION as i32),
                            &data,
                        ],
                    )
                    .await?;
                Ok(())
            }
        }
    }
}
