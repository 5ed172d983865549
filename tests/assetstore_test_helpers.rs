//! Assetstore Test Helper Functions
//!
//! Shared setup for the integration tests: a throwaway assetstore rooted in a
//! temporary directory with an in-memory metadata catalog, plus shortcuts for
//! uploading content and building source trees.

#![allow(dead_code)]

use fs_assetstore::{
    AssetstoreConfig, ContentRecord, FilesystemAssetstore, MetadataCatalog, RecordQuery,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A test assetstore and the temporary directory that holds it
pub struct AssetstoreTestWorkspace {
    pub store: Arc<FilesystemAssetstore>,
    pub temp_dir: TempDir,
}

impl AssetstoreTestWorkspace {
    /// Directory outside the assetstore root, for source trees and external files
    pub fn external_dir(&self) -> PathBuf {
        let dir = self.temp_dir.path().join("external");
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Number of file records in the catalog
    pub fn file_count(&self) -> usize {
        self.store
            .catalog()
            .files
            .count(&RecordQuery::default(), None)
            .unwrap()
    }

    /// Number of regular files below the shard directories (excludes temp/)
    pub fn object_count(&self) -> usize {
        walkdir::WalkDir::new(self.store.root())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| !e.path().starts_with(self.store.temp_dir()))
            .count()
    }
}

/// Create an assetstore with the default buffer size
pub fn create_test_assetstore() -> AssetstoreTestWorkspace {
    create_test_assetstore_with_buffer(64 * 1024)
}

/// Create an assetstore with a specific buffer size
pub fn create_test_assetstore_with_buffer(buffer_size: usize) -> AssetstoreTestWorkspace {
    let temp_dir = TempDir::new().unwrap();
    let mut config = AssetstoreConfig::new("test", temp_dir.path().join("root"));
    config.buffer_size = buffer_size;

    let store = FilesystemAssetstore::new(config, MetadataCatalog::in_memory()).unwrap();
    AssetstoreTestWorkspace {
        store: Arc::new(store),
        temp_dir,
    }
}

/// Upload `content` in chunks of `chunk_size` and return the finalized record
pub fn upload_in_chunks(
    store: &FilesystemAssetstore,
    name: &str,
    content: &[u8],
    chunk_size: usize,
) -> ContentRecord {
    let mut session = store
        .init_named_upload(content.len() as u64, name)
        .unwrap();
    for chunk in content.chunks(chunk_size.max(1)) {
        store.append_chunk(&mut session, chunk).unwrap();
    }
    store.finalize(session).unwrap()
}

/// Upload `content` in one chunk and save the record in the catalog
pub fn upload_and_save(store: &FilesystemAssetstore, name: &str, content: &[u8]) -> ContentRecord {
    let record = upload_in_chunks(store, name, content, content.len());
    store.catalog().files.create(record).unwrap()
}

/// Write a tree of files below `root`; parent directories are created
pub fn create_file_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (relative, content) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
}

/// Deterministic pseudo-random content
pub fn patterned_bytes(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u32).wrapping_mul(31).wrapping_add(seed as u32) as u8)
        .collect()
}
