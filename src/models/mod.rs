//! Data models shared by the store, the link registry and the broadcast engine
//!
//! Identity is always the compound `(workspace, record)` pair: record ids are
//! only unique inside their own workspace.

pub mod asset;
pub mod record;
pub mod term;

// Re-export commonly used types
pub use asset::*;
pub use record::*;
pub use term::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one isolated tenant store
pub type WorkspaceId = u64;

/// Identifier of a record inside a workspace
pub type RecordId = u64;

/// Compound key used everywhere as the unit of identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRecordId {
    pub workspace: WorkspaceId,
    pub record: RecordId,
}

impl WorkspaceRecordId {
    pub fn new(workspace: WorkspaceId, record: RecordId) -> Self {
        Self { workspace, record }
    }
}

impl fmt::Display for WorkspaceRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workspace, self.record)
    }
}

/// Generic success response
#[derive(Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        assert_eq!(WorkspaceRecordId::new(1, 100).to_string(), "1/100");
    }

    #[test]
    fn test_key_serializes_camel_case() {
        let json = serde_json::to_value(WorkspaceRecordId::new(2, 7)).unwrap();
        assert_eq!(json, serde_json::json!({ "workspace": 2, "record": 7 }));
    }
}
