//! Filesystem assetstore facade
//!
//! [`FilesystemAssetstore`] owns one root directory and exposes every storage
//! operation. The operations themselves live next to the component they belong
//! to (`upload`, `cas`, `download`, `integrity`, `deletion`, `import`); this
//! module only holds construction, root validation and path resolution.

use crate::config::AssetstoreConfig;
use crate::error::{Result, StoreError};
use crate::storage::locks::DigestLocks;
use crate::storage::metadata_store::{ContentRecord, MetadataCatalog, RecordQuery};
use crate::utils::path::{canonicalize_path, expand_home, shard_path};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use sysinfo::Disks;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

/// Identity of an assetstore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assetstore {
    pub id: Uuid,
    pub name: String,
    /// Absolute, writable directory
    pub root: PathBuf,
}

/// Best-effort disk capacity of the volume holding the root
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    pub free: Option<u64>,
    pub total: Option<u64>,
}

impl Capacity {
    pub fn unknown() -> Self {
        Self::default()
    }
}

/// Content-addressed storage adapter over a local directory
///
/// `Send + Sync`; share it behind an `Arc`. Separate upload sessions never
/// contend, operations on the same digest are serialized in-process.
#[derive(Debug)]
pub struct FilesystemAssetstore {
    pub(crate) assetstore: Assetstore,
    pub(crate) temp_dir: PathBuf,
    pub(crate) catalog: MetadataCatalog,
    pub(crate) locks: DigestLocks,
    pub(crate) buffer_size: usize,
}

impl FilesystemAssetstore {
    /// Create an assetstore from its configuration
    ///
    /// Validates the configuration and the root directory. Failing to create
    /// the scratch directory is only logged, so a misconfigured store can still
    /// be opened for inspection or removal.
    ///
    /// # Errors
    ///
    /// - `Config` if a configuration field is out of range
    /// - `Validation` if the root is not an absolute, writable directory
    pub fn new(config: AssetstoreConfig, catalog: MetadataCatalog) -> Result<Self> {
        config
            .validate()
            .map_err(|e| StoreError::Config(e.to_string()))?;

        let root = Self::validate_root(&config.root)?;
        let temp_dir = root.join(&config.temp_dir_name);

        if let Err(e) = fs::create_dir_all(&temp_dir) {
            warn!(
                path = %temp_dir.display(),
                error = %e,
                "Failed to create assetstore temp directory"
            );
        }

        info!(
            assetstore = %config.id,
            name = %config.name,
            root = %root.display(),
            "Opened filesystem assetstore"
        );

        Ok(Self {
            assetstore: Assetstore {
                id: config.id,
                name: config.name,
                root,
            },
            temp_dir,
            catalog,
            locks: DigestLocks::new(),
            buffer_size: config.buffer_size,
        })
    }

    /// Check that `path` can serve as an assetstore root
    ///
    /// Expands a leading `~`, requires an absolute path, creates the directory
    /// if missing and proves it writable with a probe file.
    ///
    /// # Returns
    ///
    /// The expanded root path
    ///
    /// # Errors
    ///
    /// `Validation` naming the `root` field
    pub fn validate_root(path: &Path) -> Result<PathBuf> {
        let root = expand_home(path);

        if !root.is_absolute() {
            return Err(StoreError::validation_error(format!(
                "root: assetstore path must be absolute: {}",
                root.display()
            )));
        }

        fs::create_dir_all(&root).map_err(|e| {
            StoreError::validation_error(format!(
                "root: could not create directory {}: {}",
                root.display(),
                e
            ))
        })?;

        if !root.is_dir() {
            return Err(StoreError::validation_error(format!(
                "root: not a directory: {}",
                root.display()
            )));
        }

        tempfile::Builder::new()
            .prefix(".probe-")
            .tempfile_in(&root)
            .map_err(|e| {
                StoreError::validation_error(format!(
                    "root: unable to write into directory {}: {}",
                    root.display(),
                    e
                ))
            })?;

        debug!(root = %root.display(), "Validated assetstore root");
        Ok(root)
    }

    pub fn assetstore(&self) -> &Assetstore {
        &self.assetstore
    }

    pub fn id(&self) -> Uuid {
        self.assetstore.id
    }

    pub fn root(&self) -> &Path {
        &self.assetstore.root
    }

    /// Directory holding in-flight upload scratch files
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub fn catalog(&self) -> &MetadataCatalog {
        &self.catalog
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Absolute location of a record's bytes
    ///
    /// Imported records keep their external absolute path; everything else is
    /// relative to the root.
    pub fn full_path(&self, record: &ContentRecord) -> PathBuf {
        if record.imported {
            record.path.clone()
        } else {
            self.root().join(&record.path)
        }
    }

    /// Canonical object location for a digest
    pub fn object_path(&self, digest: &str) -> PathBuf {
        self.root().join(shard_path(digest))
    }

    /// Restrict a file query to this assetstore
    pub(crate) fn scoped(&self, query: RecordQuery) -> RecordQuery {
        query.in_assetstore(self.id())
    }

    /// Free and total bytes on the volume holding the root
    ///
    /// Picks the mounted disk with the longest mount point that prefixes the
    /// canonical root. Any failure yields an unknown capacity.
    pub fn capacity(&self) -> Capacity {
        let root = match canonicalize_path(self.root()) {
            Ok(root) => root,
            Err(e) => {
                warn!(root = %self.root().display(), error = %e, "Failed to resolve assetstore root");
                return Capacity::unknown();
            }
        };

        let disks = Disks::new_with_refreshed_list();
        let disk = disks
            .list()
            .iter()
            .filter(|disk| root.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().components().count());

        match disk {
            Some(disk) => Capacity {
                free: Some(disk.available_space()),
                total: Some(disk.total_space()),
            },
            None => {
                warn!(root = %root.display(), "No mounted disk found for assetstore root");
                Capacity::unknown()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> FilesystemAssetstore {
        let config = AssetstoreConfig::new("test", dir.path().join("store"));
        FilesystemAssetstore::new(config, MetadataCatalog::in_memory()).unwrap()
    }

    #[test]
    fn test_new_creates_root_and_temp() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        assert!(store.root().is_dir());
        assert!(store.temp_dir().is_dir());
        assert_eq!(store.temp_dir(), store.root().join("temp"));
    }

    #[test]
    fn test_validate_root_rejects_relative_path() {
        let result = FilesystemAssetstore::validate_root(Path::new("relative/root"));
        match result {
            Err(StoreError::Validation(message)) => assert!(message.starts_with("root:")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_root_rejects_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, b"x").unwrap();

        let result = FilesystemAssetstore::validate_root(&file);
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_validate_root_leaves_no_probe() {
        let dir = TempDir::new().unwrap();
        let root = FilesystemAssetstore::validate_root(dir.path()).unwrap();
        assert_eq!(fs::read_dir(root).unwrap().count(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = AssetstoreConfig::new("test", dir.path());
        config.buffer_size = 1;

        let result = FilesystemAssetstore::new(config, MetadataCatalog::in_memory());
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[test]
    fn test_full_path_for_imported_and_stored() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let mut record = ContentRecord::new("a", store.id(), 1);
        record.path = PathBuf::from("ab/cd/abcd");
        assert_eq!(store.full_path(&record), store.root().join("ab/cd/abcd"));

        record.imported = true;
        record.path = PathBuf::from("/external/a");
        assert_eq!(store.full_path(&record), PathBuf::from("/external/a"));
    }
}
