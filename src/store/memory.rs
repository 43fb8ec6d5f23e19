//! In-memory content store
//!
//! Keeps every workspace in a single process. Asset bytes are written to a
//! real upload directory per workspace so that replicated assets can act as
//! sources again. Can be seeded from a JSON fixture.

use super::{ContentStore, SaveListener};
use crate::error::AppError;
use crate::models::{
    Asset, AssetId, AttributeMap, NewAsset, Record, RecordDraft, RecordId, RecordStatus, Term,
    TermId, WorkspaceId, WorkspaceRecordId, ATTACHED_FILE_ATTRIBUTE,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Behaviour of a record type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordType {
    #[serde(default)]
    pub hierarchical: bool,
    #[serde(default)]
    pub taxonomies: Vec<String>,
}

/// Everything one workspace holds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceData {
    pub base_url: String,
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    pub records: BTreeMap<RecordId, Record>,
    #[serde(default)]
    pub attributes: BTreeMap<RecordId, AttributeMap>,
    #[serde(default)]
    pub pinned: BTreeSet<RecordId>,
    #[serde(default)]
    pub terms: BTreeMap<TermId, Term>,
    /// record -> taxonomy -> assigned terms
    #[serde(default)]
    pub assignments: BTreeMap<RecordId, BTreeMap<String, Vec<TermId>>>,
    #[serde(default)]
    pub assets: BTreeMap<AssetId, Asset>,
}

impl WorkspaceData {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Records, terms and assets share one id sequence
    fn allocate_id(&mut self) -> u64 {
        let highest = [
            self.records.keys().next_back(),
            self.terms.keys().next_back(),
            self.assets.keys().next_back(),
        ]
        .into_iter()
        .flatten()
        .copied()
        .max()
        .unwrap_or(0);

        self.next_id = self.next_id.max(highest) + 1;
        self.next_id
    }
}

/// JSON seed for the store
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentFixture {
    #[serde(default)]
    pub record_types: BTreeMap<String, RecordType>,
    #[serde(default)]
    pub workspaces: BTreeMap<WorkspaceId, WorkspaceData>,
}

/// In-memory [`ContentStore`] with on-disk asset files
pub struct MemoryStore {
    upload_root: PathBuf,
    workspaces: RwLock<BTreeMap<WorkspaceId, WorkspaceData>>,
    record_types: RwLock<BTreeMap<String, RecordType>>,
    read_only: RwLock<HashSet<WorkspaceId>>,
    bytes_written: AtomicU64,
    save_listener: std::sync::RwLock<Option<Weak<dyn SaveListener>>>,
}

impl MemoryStore {
    pub fn new(upload_root: impl Into<PathBuf>) -> Self {
        let mut record_types = BTreeMap::new();
        record_types.insert(
            "post".to_string(),
            RecordType {
                hierarchical: false,
                taxonomies: vec!["category".to_string(), "post_tag".to_string()],
            },
        );
        record_types.insert(
            "page".to_string(),
            RecordType {
                hierarchical: true,
                taxonomies: Vec::new(),
            },
        );

        Self {
            upload_root: upload_root.into(),
            workspaces: RwLock::new(BTreeMap::new()),
            record_types: RwLock::new(record_types),
            read_only: RwLock::new(HashSet::new()),
            bytes_written: AtomicU64::new(0),
            save_listener: std::sync::RwLock::new(None),
        }
    }

    /// Seed the store from a JSON fixture file
    pub async fn load_fixture(&self, path: &Path) -> Result<(), AppError> {
        let raw = tokio::fs::read(path).await?;
        let fixture: ContentFixture = serde_json::from_slice(&raw)?;

        let mut types = self.record_types.write().await;
        types.extend(fixture.record_types);

        let mut workspaces = self.workspaces.write().await;
        let count = fixture.workspaces.len();
        workspaces.extend(fixture.workspaces);

        info!("Loaded content fixture {} with {} workspaces", path.display(), count);
        Ok(())
    }

    pub async fn add_workspace(&self, ws: WorkspaceId, base_url: impl Into<String>) {
        self.workspaces
            .write()
            .await
            .entry(ws)
            .or_insert_with(|| WorkspaceData::new(base_url));
    }

    pub async fn register_record_type(&self, name: impl Into<String>, record_type: RecordType) {
        self.record_types.write().await.insert(name.into(), record_type);
    }

    /// Make every write against the workspace fail
    pub async fn set_read_only(&self, ws: WorkspaceId, read_only: bool) {
        let mut set = self.read_only.write().await;
        if read_only {
            set.insert(ws);
        } else {
            set.remove(&ws);
        }
    }

    /// Call `listener` after every record insert or update
    pub fn set_save_listener(&self, listener: Weak<dyn SaveListener>) {
        *self.save_listener.write().unwrap_or_else(|e| e.into_inner()) = Some(listener);
    }

    async fn notify_saved(&self, ws: WorkspaceId, id: RecordId, author: Option<u64>) {
        let listener = self
            .save_listener
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .and_then(Weak::upgrade);

        if let Some(listener) = listener {
            listener.record_saved(WorkspaceRecordId::new(ws, id), author).await;
        }
    }

    /// Total asset bytes written since start-up
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Insert a record with a caller-chosen id, bypassing drafts
    pub async fn put_record(&self, ws: WorkspaceId, record: Record) -> Result<(), AppError> {
        let mut workspaces = self.workspaces.write().await;
        let data = workspace_mut(&mut workspaces, ws)?;
        data.records.insert(record.id, record);
        Ok(())
    }

    /// Insert a term with a caller-chosen id
    pub async fn put_term(&self, ws: WorkspaceId, term: Term) -> Result<(), AppError> {
        let mut workspaces = self.workspaces.write().await;
        let data = workspace_mut(&mut workspaces, ws)?;
        data.terms.insert(term.id, term);
        Ok(())
    }

    /// Insert an asset with a caller-chosen id
    pub async fn put_asset(&self, ws: WorkspaceId, asset: Asset) -> Result<(), AppError> {
        let mut workspaces = self.workspaces.write().await;
        let data = workspace_mut(&mut workspaces, ws)?;
        data.assets.insert(asset.id, asset);
        Ok(())
    }

    /// Every asset of a workspace
    pub async fn assets(&self, ws: WorkspaceId) -> Vec<Asset> {
        self.workspaces
            .read()
            .await
            .get(&ws)
            .map(|data| data.assets.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every record of one type in a workspace
    pub async fn records_of_type(&self, ws: WorkspaceId, record_type: &str) -> Vec<Record> {
        self.workspaces
            .read()
            .await
            .get(&ws)
            .map(|data| {
                data.records
                    .values()
                    .filter(|r| r.record_type == record_type)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn ensure_writable(&self, ws: WorkspaceId) -> Result<(), AppError> {
        if self.read_only.read().await.contains(&ws) {
            return Err(AppError::Store(format!("Workspace {} is read-only", ws)));
        }
        Ok(())
    }

    fn upload_dir(&self, ws: WorkspaceId) -> PathBuf {
        self.upload_root.join(format!("ws-{}", ws))
    }
}

/// Asset filenames are a single plain path component
fn check_filename(filename: &str) -> Result<(), AppError> {
    let plain = !filename.is_empty()
        && filename != "."
        && filename != ".."
        && !filename.contains(|c| matches!(c, '/' | '\\' | '\0'));
    if plain {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("Invalid asset filename {:?}", filename)))
    }
}

fn workspace_mut(
    workspaces: &mut BTreeMap<WorkspaceId, WorkspaceData>,
    ws: WorkspaceId,
) -> Result<&mut WorkspaceData, AppError> {
    workspaces
        .get_mut(&ws)
        .ok_or_else(|| AppError::Store(format!("Unknown workspace {}", ws)))
}

fn record_mut(data: &mut WorkspaceData, id: RecordId) -> Result<&mut Record, AppError> {
    data.records
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("Record {} not found", id)))
}

fn apply_draft(record: &mut Record, draft: &RecordDraft) {
    record.record_type = draft.record_type.clone();
    record.status = draft.status;
    record.name = draft.name.clone();
    record.title = draft.title.clone();
    record.body = draft.body.clone();
    record.excerpt = draft.excerpt.clone();
    record.parent = draft.parent;
    record.author = draft.author;
    record.menu_order = draft.menu_order;
}

#[async_trait::async_trait]
impl ContentStore for MemoryStore {
    async fn workspaces(&self) -> Result<Vec<WorkspaceId>, AppError> {
        Ok(self.workspaces.read().await.keys().copied().collect())
    }

    async fn get_record(&self, ws: WorkspaceId, id: RecordId) -> Result<Option<Record>, AppError> {
        Ok(self
            .workspaces
            .read()
            .await
            .get(&ws)
            .and_then(|data| data.records.get(&id).cloned()))
    }

    async fn find_records_by_name(
        &self,
        ws: WorkspaceId,
        record_type: &str,
        name: &str,
    ) -> Result<Vec<Record>, AppError> {
        let workspaces = self.workspaces.read().await;
        Ok(workspaces
            .get(&ws)
            .map(|data| {
                data.records
                    .values()
                    .filter(|r| r.record_type == record_type && r.name == name)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_record(&self, ws: WorkspaceId, draft: &RecordDraft) -> Result<RecordId, AppError> {
        self.ensure_writable(ws).await?;
        let id = {
            let mut workspaces = self.workspaces.write().await;
            let data = workspace_mut(&mut workspaces, ws)?;

            let id = data.allocate_id();
            let mut record = Record {
                id,
                guid: format!("{}/?p={}", data.base_url, id),
                record_type: String::new(),
                status: RecordStatus::Draft,
                name: String::new(),
                title: String::new(),
                body: String::new(),
                excerpt: String::new(),
                parent: None,
                author: None,
                menu_order: 0,
                comment_count: 0,
            };
            apply_draft(&mut record, draft);
            data.records.insert(id, record);
            id
        };

        debug!("Inserted record {}/{}", ws, id);
        self.notify_saved(ws, id, draft.author).await;
        Ok(id)
    }

    async fn update_record(
        &self,
        ws: WorkspaceId,
        id: RecordId,
        draft: &RecordDraft,
    ) -> Result<(), AppError> {
        self.ensure_writable(ws).await?;
        {
            let mut workspaces = self.workspaces.write().await;
            let data = workspace_mut(&mut workspaces, ws)?;
            apply_draft(record_mut(data, id)?, draft);
        }

        self.notify_saved(ws, id, draft.author).await;
        Ok(())
    }

    async fn delete_record(&self, ws: WorkspaceId, id: RecordId, permanently: bool) -> Result<(), AppError> {
        self.ensure_writable(ws).await?;
        let mut workspaces = self.workspaces.write().await;
        let data = workspace_mut(&mut workspaces, ws)?;

        if !permanently {
            record_mut(data, id)?.status = RecordStatus::Trash;
            return Ok(());
        }

        data.records.remove(&id);
        data.attributes.remove(&id);
        data.assignments.remove(&id);
        data.pinned.remove(&id);
        Ok(())
    }

    async fn set_status(&self, ws: WorkspaceId, id: RecordId, status: RecordStatus) -> Result<(), AppError> {
        self.ensure_writable(ws).await?;
        let mut workspaces = self.workspaces.write().await;
        let data = workspace_mut(&mut workspaces, ws)?;
        record_mut(data, id)?.status = status;
        Ok(())
    }

    async fn set_pinned(&self, ws: WorkspaceId, id: RecordId, pinned: bool) -> Result<(), AppError> {
        self.ensure_writable(ws).await?;
        let mut workspaces = self.workspaces.write().await;
        let data = workspace_mut(&mut workspaces, ws)?;
        if pinned {
            data.pinned.insert(id);
        } else {
            data.pinned.remove(&id);
        }
        Ok(())
    }

    async fn is_pinned(&self, ws: WorkspaceId, id: RecordId) -> Result<bool, AppError> {
        Ok(self
            .workspaces
            .read()
            .await
            .get(&ws)
            .map(|data| data.pinned.contains(&id))
            .unwrap_or(false))
    }

    async fn is_hierarchical(&self, _ws: WorkspaceId, record_type: &str) -> Result<bool, AppError> {
        Ok(self
            .record_types
            .read()
            .await
            .get(record_type)
            .map(|t| t.hierarchical)
            .unwrap_or(false))
    }

    async fn taxonomies_for(&self, _ws: WorkspaceId, record_type: &str) -> Result<Vec<String>, AppError> {
        Ok(self
            .record_types
            .read()
            .await
            .get(record_type)
            .map(|t| t.taxonomies.clone())
            .unwrap_or_default())
    }

    async fn get_attributes(&self, ws: WorkspaceId, id: RecordId) -> Result<AttributeMap, AppError> {
        Ok(self
            .workspaces
            .read()
            .await
            .get(&ws)
            .and_then(|data| data.attributes.get(&id).cloned())
            .unwrap_or_default())
    }

    async fn add_attribute(
        &self,
        ws: WorkspaceId,
        id: RecordId,
        name: &str,
        value: &str,
    ) -> Result<(), AppError> {
        self.ensure_writable(ws).await?;
        let mut workspaces = self.workspaces.write().await;
        let data = workspace_mut(&mut workspaces, ws)?;
        data.attributes
            .entry(id)
            .or_default()
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
        Ok(())
    }

    async fn delete_attribute(&self, ws: WorkspaceId, id: RecordId, name: &str) -> Result<(), AppError> {
        self.ensure_writable(ws).await?;
        let mut workspaces = self.workspaces.write().await;
        let data = workspace_mut(&mut workspaces, ws)?;
        if let Some(attributes) = data.attributes.get_mut(&id) {
            attributes.remove(name);
        }
        Ok(())
    }

    async fn update_attribute(
        &self,
        ws: WorkspaceId,
        id: RecordId,
        name: &str,
        value: &str,
    ) -> Result<(), AppError> {
        self.ensure_writable(ws).await?;
        let mut workspaces = self.workspaces.write().await;
        let data = workspace_mut(&mut workspaces, ws)?;
        data.attributes
            .entry(id)
            .or_default()
            .insert(name.to_string(), vec![value.to_string()]);
        Ok(())
    }

    async fn list_terms(&self, ws: WorkspaceId, taxonomy: &str) -> Result<Vec<Term>, AppError> {
        Ok(self
            .workspaces
            .read()
            .await
            .get(&ws)
            .map(|data| {
                data.terms
                    .values()
                    .filter(|t| t.taxonomy == taxonomy)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn record_terms(&self, ws: WorkspaceId, id: RecordId, taxonomy: &str) -> Result<Vec<Term>, AppError> {
        let workspaces = self.workspaces.read().await;
        let Some(data) = workspaces.get(&ws) else {
            return Ok(Vec::new());
        };

        let ids = data
            .assignments
            .get(&id)
            .and_then(|by_taxonomy| by_taxonomy.get(taxonomy))
            .cloned()
            .unwrap_or_default();

        Ok(ids
            .iter()
            .filter_map(|term_id| data.terms.get(term_id).cloned())
            .collect())
    }

    async fn create_term(
        &self,
        ws: WorkspaceId,
        taxonomy: &str,
        name: &str,
        slug: &str,
        parent: Option<TermId>,
    ) -> Result<TermId, AppError> {
        self.ensure_writable(ws).await?;
        let mut workspaces = self.workspaces.write().await;
        let data = workspace_mut(&mut workspaces, ws)?;

        if data
            .terms
            .values()
            .any(|t| t.taxonomy == taxonomy && t.slug == slug)
        {
            return Err(AppError::Conflict(format!(
                "Term {} already exists in {}",
                slug, taxonomy
            )));
        }

        let id = data.allocate_id();
        data.terms.insert(
            id,
            Term {
                id,
                taxonomy: taxonomy.to_string(),
                slug: slug.to_string(),
                name: name.to_string(),
                parent,
            },
        );
        Ok(id)
    }

    async fn set_term_parent(
        &self,
        ws: WorkspaceId,
        taxonomy: &str,
        term: TermId,
        parent: Option<TermId>,
    ) -> Result<(), AppError> {
        self.ensure_writable(ws).await?;
        let mut workspaces = self.workspaces.write().await;
        let data = workspace_mut(&mut workspaces, ws)?;
        let term = data
            .terms
            .get_mut(&term)
            .filter(|t| t.taxonomy == taxonomy)
            .ok_or_else(|| AppError::NotFound(format!("Term {} not found in {}", term, taxonomy)))?;
        term.parent = parent;
        Ok(())
    }

    async fn assign_terms(
        &self,
        ws: WorkspaceId,
        id: RecordId,
        taxonomy: &str,
        terms: &[TermId],
    ) -> Result<(), AppError> {
        self.ensure_writable(ws).await?;
        let mut workspaces = self.workspaces.write().await;
        let data = workspace_mut(&mut workspaces, ws)?;
        data.assignments
            .entry(id)
            .or_default()
            .insert(taxonomy.to_string(), terms.to_vec());
        Ok(())
    }

    async fn get_asset(&self, ws: WorkspaceId, id: AssetId) -> Result<Option<Asset>, AppError> {
        Ok(self
            .workspaces
            .read()
            .await
            .get(&ws)
            .and_then(|data| data.assets.get(&id).cloned()))
    }

    async fn attached_assets(&self, ws: WorkspaceId, record: RecordId) -> Result<Vec<Asset>, AppError> {
        Ok(self
            .workspaces
            .read()
            .await
            .get(&ws)
            .map(|data| {
                data.assets
                    .values()
                    .filter(|a| a.parent == Some(record))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_asset_by_name(&self, ws: WorkspaceId, name: &str) -> Result<Option<Asset>, AppError> {
        Ok(self
            .workspaces
            .read()
            .await
            .get(&ws)
            .and_then(|data| data.assets.values().find(|a| a.name == name).cloned()))
    }

    async fn store_asset(
        &self,
        ws: WorkspaceId,
        bytes: Vec<u8>,
        metadata: &NewAsset,
        parent: Option<RecordId>,
    ) -> Result<Asset, AppError> {
        self.ensure_writable(ws).await?;
        check_filename(&metadata.filename)?;

        let dir = self.upload_dir(ws);
        tokio::fs::create_dir_all(&dir).await?;

        // Held across the write so two uploads cannot pick the same name
        let mut workspaces = self.workspaces.write().await;
        let data = workspace_mut(&mut workspaces, ws)?;
        let id = data.allocate_id();

        let mut filename = metadata.filename.clone();
        if tokio::fs::try_exists(dir.join(&filename)).await? {
            filename = format!("{}-{}", id, filename);
        }
        let path = dir.join(&filename);
        let size = bytes.len() as u64;
        tokio::fs::write(&path, &bytes).await?;
        self.bytes_written.fetch_add(size, Ordering::Relaxed);

        let mut attributes = BTreeMap::new();
        attributes.insert(ATTACHED_FILE_ATTRIBUTE.to_string(), filename.clone());

        let asset = Asset {
            id,
            name: metadata.name.clone(),
            url: format!("{}/uploads/{}", data.base_url, filename),
            filename,
            path,
            mime_type: metadata.mime_type.clone(),
            size,
            title: metadata.title.clone(),
            caption: metadata.caption.clone(),
            menu_order: metadata.menu_order,
            parent,
            attributes,
            derived: None,
        };
        data.assets.insert(id, asset.clone());

        debug!("Stored asset {}/{} ({} bytes)", ws, id, size);
        Ok(asset)
    }

    async fn regenerate_asset_metadata(
        &self,
        ws: WorkspaceId,
        id: AssetId,
    ) -> Result<Option<serde_json::Value>, AppError> {
        let workspaces = self.workspaces.read().await;
        let asset = workspaces
            .get(&ws)
            .and_then(|data| data.assets.get(&id))
            .ok_or_else(|| AppError::NotFound(format!("Asset {} not found", id)))?;

        if !asset.mime_type.starts_with("image/") {
            return Ok(None);
        }

        Ok(Some(serde_json::json!({
            "file": asset.filename,
            "filesize": asset.size,
            "sizes": {},
        })))
    }

    async fn update_asset_metadata(
        &self,
        ws: WorkspaceId,
        id: AssetId,
        attributes: BTreeMap<String, String>,
        derived: Option<serde_json::Value>,
    ) -> Result<(), AppError> {
        self.ensure_writable(ws).await?;
        let mut workspaces = self.workspaces.write().await;
        let data = workspace_mut(&mut workspaces, ws)?;
        let asset = data
            .assets
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Asset {} not found", id)))?;
        asset.attributes = attributes;
        asset.derived = derived;
        Ok(())
    }

    async fn delete_asset(&self, ws: WorkspaceId, id: AssetId, _permanently: bool) -> Result<(), AppError> {
        self.ensure_writable(ws).await?;
        let removed = {
            let mut workspaces = self.workspaces.write().await;
            let data = workspace_mut(&mut workspaces, ws)?;
            data.assets.remove(&id)
        };

        if let Some(asset) = removed {
            if let Err(e) = tokio::fs::remove_file(&asset.path).await {
                debug!("Could not remove {}: {}", asset.path.display(), e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str) -> RecordDraft {
        RecordDraft {
            record_type: "post".to_string(),
            status: RecordStatus::Publish,
            name: name.to_string(),
            title: name.to_string(),
            body: String::new(),
            excerpt: String::new(),
            parent: None,
            author: None,
            menu_order: 0,
        }
    }

    #[tokio::test]
    async fn test_ids_are_shared_across_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        store.add_workspace(1, "http://one.test").await;

        let record = store.insert_record(1, &draft("hello")).await.unwrap();
        let term = store.create_term(1, "category", "News", "news", None).await.unwrap();
        assert!(term > record);

        let record = store.get_record(1, record).await.unwrap().unwrap();
        assert_eq!(record.guid, format!("http://one.test/?p={}", record.id));
    }

    #[tokio::test]
    async fn test_read_only_workspace_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        store.add_workspace(1, "http://one.test").await;
        store.set_read_only(1, true).await;

        let result = store.insert_record(1, &draft("nope")).await;
        assert!(matches!(result, Err(AppError::Store(_))));
    }

    #[tokio::test]
    async fn test_store_asset_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        store.add_workspace(2, "http://two.test").await;

        let meta = NewAsset {
            name: "cover".to_string(),
            filename: "cover.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            title: "Cover".to_string(),
            caption: String::new(),
            menu_order: 0,
        };
        let asset = store.store_asset(2, b"jpeg".to_vec(), &meta, Some(9)).await.unwrap();

        assert_eq!(tokio::fs::read(&asset.path).await.unwrap(), b"jpeg");
        assert_eq!(asset.url, "http://two.test/uploads/cover.jpg");
        assert_eq!(store.bytes_written(), 4);
        assert_eq!(store.attached_assets(2, 9).await.unwrap().len(), 1);

        let derived = store.regenerate_asset_metadata(2, asset.id).await.unwrap();
        assert_eq!(derived.unwrap()["file"], "cover.jpg");
    }

    fn new_asset(name: &str, filename: &str) -> NewAsset {
        NewAsset {
            name: name.to_string(),
            filename: filename.to_string(),
            mime_type: "image/jpeg".to_string(),
            title: name.to_string(),
            caption: String::new(),
            menu_order: 0,
        }
    }

    #[tokio::test]
    async fn test_same_filename_keeps_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        store.add_workspace(2, "http://two.test").await;

        let first = store.store_asset(2, b"one".to_vec(), &new_asset("first", "photo.jpg"), None).await.unwrap();
        let second = store.store_asset(2, b"two".to_vec(), &new_asset("second", "photo.jpg"), None).await.unwrap();

        assert_ne!(first.path, second.path);
        assert_ne!(first.url, second.url);
        assert_eq!(second.filename, format!("{}-photo.jpg", second.id));
        assert_eq!(tokio::fs::read(&first.path).await.unwrap(), b"one");
        assert_eq!(tokio::fs::read(&second.path).await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_filename_cannot_leave_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path().join("uploads"));
        store.add_workspace(2, "http://two.test").await;

        for filename in ["../escape.jpg", "/tmp/escape.jpg", "..", "", "a\\b.jpg"] {
            let result = store.store_asset(2, b"x".to_vec(), &new_asset("bad", filename), None).await;
            assert!(matches!(result, Err(AppError::BadRequest(_))), "{:?} was accepted", filename);
        }
        assert!(!dir.path().join("escape.jpg").exists());
        assert!(store.assets(2).await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_term_slug_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        store.add_workspace(1, "http://one.test").await;

        store.create_term(1, "category", "News", "news", None).await.unwrap();
        let again = store.create_term(1, "category", "News", "news", None).await;
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }
}
