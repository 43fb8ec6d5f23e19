//! Asset replication
//!
//! Copies a source asset into a target workspace, deduplicating by the
//! asset's stable name first.

use super::context::AssetDescriptor;
use crate::error::AppError;
use crate::models::{Asset, NewAsset, RecordId, ATTACHED_FILE_ATTRIBUTE};
use crate::store::WorkspaceScope;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, warn};

/// What to do when the target already has an asset with the same name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingAssetPolicy {
    /// Reuse the existing asset
    #[default]
    Use,
    /// Delete the existing asset and copy
    Overwrite,
    /// Copy under a randomized filename next to the existing one
    Randomize,
}

impl FromStr for ExistingAssetPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "use" => Ok(Self::Use),
            "overwrite" => Ok(Self::Overwrite),
            "randomize" => Ok(Self::Randomize),
            other => Err(format!(
                "Unknown existing asset policy '{}' (expected use, overwrite or randomize)",
                other
            )),
        }
    }
}

/// Result of replicating one asset
#[derive(Debug, Clone, PartialEq)]
pub enum AssetReplication {
    /// An existing target asset was kept
    Reused(Asset),
    Copied(Asset),
    /// The source file is gone; nothing was created
    Missing,
}

impl AssetReplication {
    pub fn asset(&self) -> Option<&Asset> {
        match self {
            AssetReplication::Reused(asset) | AssetReplication::Copied(asset) => Some(asset),
            AssetReplication::Missing => None,
        }
    }

    pub fn ok(&self) -> bool {
        !matches!(self, AssetReplication::Missing)
    }
}

/// Insert `_NNNNNNN` before the extension
pub fn randomize_filename(filename: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(1_000_000..=9_999_999);
    match filename.rfind('.') {
        Some(dot) if dot > 0 => format!("{}_{}{}", &filename[..dot], suffix, &filename[dot..]),
        _ => format!("{}_{}", filename, suffix),
    }
}

/// Replicate `asset` into the scope's workspace
///
/// `copy` is the id of the record copy on that workspace; attached assets
/// take it as their parent, the rest become top-level.
pub async fn replicate_asset(
    scope: &WorkspaceScope,
    asset: &AssetDescriptor,
    copy: RecordId,
    policy: ExistingAssetPolicy,
) -> Result<AssetReplication, AppError> {
    let ws = scope.workspace();
    let store = scope.store();
    let mut filename = asset.filename.clone();

    if let Some(existing) = store.find_asset_by_name(ws, &asset.name).await? {
        debug!("Asset {} already exists on {} as {}, policy {:?}", asset.name, ws, existing.id, policy);
        match policy {
            ExistingAssetPolicy::Use => return Ok(AssetReplication::Reused(existing)),
            ExistingAssetPolicy::Overwrite => store.delete_asset(ws, existing.id, true).await?,
            ExistingAssetPolicy::Randomize => {
                filename = randomize_filename(&filename);
                debug!("Randomized asset filename to {}", filename);
            }
        }
    }

    let bytes = match tokio::fs::read(&asset.path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Source file {} for asset {} is unavailable: {}", asset.path.display(), asset.id, e);
            return Ok(AssetReplication::Missing);
        }
    };

    let metadata = NewAsset {
        name: asset.name.clone(),
        filename,
        mime_type: asset.mime_type.clone(),
        title: asset.title.clone(),
        caption: asset.caption.clone(),
        menu_order: asset.menu_order,
    };
    let parent = asset.attached_to_parent.then_some(copy);
    let mut stored = store.store_asset(ws, bytes, &metadata, parent).await?;

    // Source attributes first, then the target's own path on top.
    let mut attributes = asset.attributes.clone();
    let attached_file = stored
        .attributes
        .get(ATTACHED_FILE_ATTRIBUTE)
        .cloned()
        .unwrap_or_else(|| stored.filename.clone());
    attributes.insert(ATTACHED_FILE_ATTRIBUTE.to_string(), attached_file);

    let derived = if asset.has_derived {
        store.regenerate_asset_metadata(ws, stored.id).await?
    } else {
        None
    };

    store
        .update_asset_metadata(ws, stored.id, attributes.clone(), derived.clone())
        .await?;
    stored.attributes = attributes;
    stored.derived = derived;

    debug!("Copied asset {} to {}/{}", asset.id, ws, stored.id);
    Ok(AssetReplication::Copied(stored))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ContentStore, MemoryStore, StoreContext};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<MemoryStore>,
        ctx: StoreContext,
        asset: AssetDescriptor,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new(dir.path().join("uploads")));
        store.add_workspace(1, "http://one.test").await;
        store.add_workspace(2, "http://two.test").await;

        let source_path = dir.path().join("photo.jpg");
        std::fs::write(&source_path, b"pixels").unwrap();

        let mut attributes = BTreeMap::new();
        attributes.insert(ATTACHED_FILE_ATTRIBUTE.to_string(), "2014/01/photo.jpg".to_string());
        attributes.insert("_alt".to_string(), "A photo".to_string());

        let asset = AssetDescriptor {
            id: 5,
            name: "photo".to_string(),
            filename: "photo.jpg".to_string(),
            path: source_path,
            url: "http://one.test/uploads/photo.jpg".to_string(),
            size: 6,
            mime_type: "image/jpeg".to_string(),
            attached_to_parent: true,
            title: "Photo".to_string(),
            caption: String::new(),
            menu_order: 0,
            attributes,
            has_derived: true,
        };

        let ctx = StoreContext::new(store.clone(), 1);
        Fixture { _dir: dir, store, ctx, asset }
    }

    #[test]
    fn test_randomize_filename() {
        let name = randomize_filename("photo.large.jpg");
        assert!(name.starts_with("photo.large_"));
        assert!(name.ends_with(".jpg"));
        assert_eq!(name.len(), "photo.large.jpg".len() + 8);

        let bare = randomize_filename("README");
        assert!(bare.starts_with("README_"));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("Randomize".parse::<ExistingAssetPolicy>(), Ok(ExistingAssetPolicy::Randomize));
        assert!("keep".parse::<ExistingAssetPolicy>().is_err());
    }

    #[tokio::test]
    async fn test_copy_rewrites_path_and_regenerates() {
        let f = fixture().await;
        let scope = f.ctx.switch_to(2);

        let result = replicate_asset(&scope, &f.asset, 42, ExistingAssetPolicy::Use).await.unwrap();
        let copied = match result {
            AssetReplication::Copied(asset) => asset,
            other => panic!("expected a copy, got {:?}", other),
        };

        assert_eq!(copied.parent, Some(42));
        assert_eq!(copied.attributes[ATTACHED_FILE_ATTRIBUTE], "photo.jpg");
        assert_eq!(copied.attributes["_alt"], "A photo");
        assert!(copied.derived.is_some());

        let stored = f.store.get_asset(2, copied.id).await.unwrap().unwrap();
        assert_eq!(stored.attributes, copied.attributes);
    }

    #[tokio::test]
    async fn test_use_policy_reuses_without_copying() {
        let f = fixture().await;
        let scope = f.ctx.switch_to(2);

        let first = replicate_asset(&scope, &f.asset, 42, ExistingAssetPolicy::Use).await.unwrap();
        let written = f.store.bytes_written();

        let second = replicate_asset(&scope, &f.asset, 42, ExistingAssetPolicy::Use).await.unwrap();
        assert!(matches!(second, AssetReplication::Reused(_)));
        assert_eq!(first.asset().unwrap().id, second.asset().unwrap().id);
        assert_eq!(f.store.bytes_written(), written);
    }

    #[tokio::test]
    async fn test_randomize_policy_keeps_both() {
        let f = fixture().await;
        let scope = f.ctx.switch_to(2);

        let first = replicate_asset(&scope, &f.asset, 42, ExistingAssetPolicy::Randomize).await.unwrap();
        let second = replicate_asset(&scope, &f.asset, 42, ExistingAssetPolicy::Randomize).await.unwrap();

        let (first, second) = (first.asset().unwrap(), second.asset().unwrap());
        assert_ne!(first.id, second.id);
        assert_ne!(first.filename, second.filename);
        assert_eq!(f.store.assets(2).await.len(), 2);
    }

    #[tokio::test]
    async fn test_overwrite_policy_replaces() {
        let f = fixture().await;
        let scope = f.ctx.switch_to(2);

        let first = replicate_asset(&scope, &f.asset, 42, ExistingAssetPolicy::Overwrite).await.unwrap();
        let second = replicate_asset(&scope, &f.asset, 42, ExistingAssetPolicy::Overwrite).await.unwrap();

        let assets = f.store.assets(2).await;
        assert_eq!(assets.len(), 1);
        assert_ne!(first.asset().unwrap().id, assets[0].id);
        assert_eq!(second.asset().unwrap().id, assets[0].id);
    }

    #[tokio::test]
    async fn test_missing_source_file_is_not_fatal() {
        let mut f = fixture().await;
        f.asset.path = f.asset.path.with_file_name("gone.jpg");
        let scope = f.ctx.switch_to(2);

        let result = replicate_asset(&scope, &f.asset, 42, ExistingAssetPolicy::Use).await.unwrap();
        assert!(!result.ok());
        assert!(f.store.assets(2).await.is_empty());
    }

    #[tokio::test]
    async fn test_unattached_asset_is_top_level() {
        let mut f = fixture().await;
        f.asset.attached_to_parent = false;
        let scope = f.ctx.switch_to(2);

        let result = replicate_asset(&scope, &f.asset, 42, ExistingAssetPolicy::Use).await.unwrap();
        assert_eq!(result.asset().unwrap().parent, None);
    }
}
