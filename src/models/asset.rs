//! Media assets

use super::RecordId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Identifier of an asset inside a workspace
pub type AssetId = u64;

/// Attribute holding the asset's path relative to the upload location
pub const ATTACHED_FILE_ATTRIBUTE: &str = "_wp_attached_file";

/// A stored media asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: AssetId,
    /// Stable name used to detect the same asset across workspaces
    pub name: String,
    pub filename: String,
    /// Where the file lives on disk for this workspace
    pub path: PathBuf,
    /// Public resource locator
    pub url: String,
    pub mime_type: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub menu_order: i32,
    #[serde(default)]
    pub parent: Option<RecordId>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Store-generated data such as size variants
    #[serde(default)]
    pub derived: Option<serde_json::Value>,
}

/// Everything a store needs to create an asset record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAsset {
    pub name: String,
    pub filename: String,
    pub mime_type: String,
    pub title: String,
    pub caption: String,
    pub menu_order: i32,
}
