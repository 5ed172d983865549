//! Metadata Repositories
//!
//! The assetstore does not own the lifecycle of metadata records. It needs
//! typed access to three collections (files, items and folders), which the
//! host injects as [`Repository`] implementations bundled in a
//! [`MetadataCatalog`].
//!
//! ## Record hierarchy
//!
//! ```text
//! Collection / User
//! └── Folder (may nest)
//!     └── Item
//!         └── ContentRecord (file)
//! ```
//!
//! An in-memory implementation is provided for tests and for hosts that keep
//! their metadata elsewhere and only need a scratch catalog.

use crate::error::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Kind of container a folder hangs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParentType {
    Folder,
    Collection,
    User,
}

impl ParentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParentType::Folder => "folder",
            ParentType::Collection => "collection",
            ParentType::User => "user",
        }
    }

    /// Only folders may hold items (and therefore files) directly
    pub fn can_hold_files(&self) -> bool {
        matches!(self, ParentType::Folder)
    }
}

impl fmt::Display for ParentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File metadata referencing bytes in an assetstore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: Uuid,
    pub name: String,
    pub item_id: Option<Uuid>,
    pub assetstore_id: Uuid,
    pub size: u64,
    /// SHA-512 hex digest; absent for imported files, which are never hashed
    pub digest: Option<String>,
    /// Relative shard path, or the absolute external path when `imported`
    pub path: PathBuf,
    pub imported: bool,
    pub mtime: Option<DateTime<Utc>>,
    pub mime_type: Option<String>,
    pub creator_id: Option<Uuid>,
    pub created: DateTime<Utc>,
}

impl ContentRecord {
    pub fn new(name: impl Into<String>, assetstore_id: Uuid, size: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            item_id: None,
            assetstore_id,
            size,
            digest: None,
            path: PathBuf::new(),
            imported: false,
            mtime: None,
            mime_type: None,
            creator_id: None,
            created: Utc::now(),
        }
    }
}

/// Container of files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub name: String,
    pub folder_id: Uuid,
    pub creator_id: Option<Uuid>,
    pub created: DateTime<Utc>,
}

impl Item {
    pub fn new(name: impl Into<String>, folder_id: Uuid, creator_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            folder_id,
            creator_id,
            created: Utc::now(),
        }
    }
}

/// Container of items and other folders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: Uuid,
    pub name: String,
    pub parent_id: Uuid,
    pub parent_type: ParentType,
    pub creator_id: Option<Uuid>,
    pub created: DateTime<Utc>,
}

impl Folder {
    pub fn new(
        name: impl Into<String>,
        parent_id: Uuid,
        parent_type: ParentType,
        creator_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            parent_id,
            parent_type,
            creator_id,
            created: Utc::now(),
        }
    }
}

/// Filter over metadata records
///
/// Every populated field must match. `parent_id` means the owning container:
/// `item_id` for files, `folder_id` for items and `parent_id` for folders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordQuery {
    pub assetstore_id: Option<Uuid>,
    pub digest: Option<String>,
    pub parent_id: Option<Uuid>,
    pub parent_type: Option<ParentType>,
    pub name: Option<String>,
    pub imported: Option<bool>,
}

impl RecordQuery {
    pub fn in_assetstore(mut self, assetstore_id: Uuid) -> Self {
        self.assetstore_id = Some(assetstore_id);
        self
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_parent_type(mut self, parent_type: ParentType) -> Self {
        self.parent_type = Some(parent_type);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn imported(mut self, imported: bool) -> Self {
        self.imported = Some(imported);
        self
    }
}

fn field_matches<T: PartialEq>(wanted: &Option<T>, actual: Option<&T>) -> bool {
    match wanted {
        None => true,
        Some(wanted) => actual == Some(wanted),
    }
}

/// A metadata record the repositories know how to filter
pub trait Record: Clone + Send + Sync + 'static {
    fn id(&self) -> Uuid;
    fn matches(&self, query: &RecordQuery) -> bool;
}

impl Record for ContentRecord {
    fn id(&self) -> Uuid {
        self.id
    }

    fn matches(&self, query: &RecordQuery) -> bool {
        query.parent_type.is_none()
            && field_matches(&query.assetstore_id, Some(&self.assetstore_id))
            && field_matches(&query.digest, self.digest.as_ref())
            && field_matches(&query.parent_id, self.item_id.as_ref())
            && field_matches(&query.name, Some(&self.name))
            && field_matches(&query.imported, Some(&self.imported))
    }
}

impl Record for Item {
    fn id(&self) -> Uuid {
        self.id
    }

    fn matches(&self, query: &RecordQuery) -> bool {
        query.assetstore_id.is_none()
            && query.digest.is_none()
            && query.imported.is_none()
            && field_matches(&query.parent_type, Some(&ParentType::Folder))
            && field_matches(&query.parent_id, Some(&self.folder_id))
            && field_matches(&query.name, Some(&self.name))
    }
}

impl Record for Folder {
    fn id(&self) -> Uuid {
        self.id
    }

    fn matches(&self, query: &RecordQuery) -> bool {
        query.assetstore_id.is_none()
            && query.digest.is_none()
            && query.imported.is_none()
            && field_matches(&query.parent_type, Some(&self.parent_type))
            && field_matches(&query.parent_id, Some(&self.parent_id))
            && field_matches(&query.name, Some(&self.name))
    }
}

/// Lazily evaluated result set
pub type RecordCursor<'a, R> = Box<dyn Iterator<Item = Result<R>> + Send + 'a>;

/// Capability set the assetstore needs from a metadata collection
///
/// Backends report their own failures as [`StoreError::Metadata`]; the
/// assetstore passes them through unchanged.
///
/// [`StoreError::Metadata`]: crate::error::StoreError::Metadata
pub trait Repository<R: Record>: Send + Sync {
    /// Records matching `query`, in the store's natural order
    fn find(&self, query: &RecordQuery) -> Result<RecordCursor<'_, R>>;

    /// Number of matching records, stopping early once `limit` is reached
    fn count(&self, query: &RecordQuery, limit: Option<usize>) -> Result<usize>;

    fn create(&self, record: R) -> Result<R>;

    /// Replace the stored record with the same id
    fn save(&self, record: &R) -> Result<()>;

    /// Returns `false` if no record had this id
    fn remove(&self, id: Uuid) -> Result<bool>;

    fn find_one(&self, query: &RecordQuery) -> Result<Option<R>> {
        self.find(query)?.next().transpose()
    }
}

/// Thread-safe in-memory repository
///
/// Keeps insertion order. `find` snapshots the matching records so callers may
/// mutate the repository while iterating.
#[derive(Debug)]
pub struct InMemoryRepository<R> {
    records: RwLock<Vec<R>>,
}

impl<R> Default for InMemoryRepository<R> {
    fn default() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }
}

impl<R: Record> InMemoryRepository<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl<R: Record> Repository<R> for InMemoryRepository<R> {
    fn find(&self, query: &RecordQuery) -> Result<RecordCursor<'_, R>> {
        let matching: Vec<R> = self
            .records
            .read()
            .iter()
            .filter(|record| record.matches(query))
            .cloned()
            .collect();

        Ok(Box::new(matching.into_iter().map(Ok)))
    }

    fn count(&self, query: &RecordQuery, limit: Option<usize>) -> Result<usize> {
        let records = self.records.read();
        let matching = records.iter().filter(|record| record.matches(query));

        Ok(match limit {
            Some(limit) => matching.take(limit).count(),
            None => matching.count(),
        })
    }

    fn create(&self, record: R) -> Result<R> {
        self.records.write().push(record.clone());
        Ok(record)
    }

    fn save(&self, record: &R) -> Result<()> {
        let mut records = self.records.write();
        match records.iter_mut().find(|existing| existing.id() == record.id()) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }

    fn remove(&self, id: Uuid) -> Result<bool> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|record| record.id() != id);
        Ok(records.len() != before)
    }
}

/// Typed repositories injected into the assetstore
#[derive(Clone)]
pub struct MetadataCatalog {
    pub files: Arc<dyn Repository<ContentRecord>>,
    pub items: Arc<dyn Repository<Item>>,
    pub folders: Arc<dyn Repository<Folder>>,
}

impl MetadataCatalog {
    pub fn new(
        files: Arc<dyn Repository<ContentRecord>>,
        items: Arc<dyn Repository<Item>>,
        folders: Arc<dyn Repository<Folder>>,
    ) -> Self {
        Self {
            files,
            items,
            folders,
        }
    }

    /// Catalog backed by fresh [`InMemoryRepository`] instances
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryRepository::<ContentRecord>::new()),
            Arc::new(InMemoryRepository::<Item>::new()),
            Arc::new(InMemoryRepository::<Folder>::new()),
        )
    }
}

impl fmt::Debug for MetadataCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataCatalog").finish_non_exhaustive()
    }
}
