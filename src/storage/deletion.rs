//! Reference-aware deletion
//!
//! Several records may share one digest and therefore one physical object.
//! Bytes are only unlinked when the record being deleted is the last one in
//! this assetstore that references them.
//!
//! The reference count is a query, capped at two: all that matters is whether
//! the record is alone. Count and unlink run under the per-digest lock, which
//! also covers finalize, so a concurrent upload of the same content cannot
//! publish in between. Processes sharing a root are not coordinated; the
//! worst outcome there is an orphaned object, never a record without bytes
//! that it previously had.

use crate::error::{Result, StoreError};
use crate::storage::assetstore::FilesystemAssetstore;
use crate::storage::metadata_store::{ContentRecord, RecordQuery};
use std::fs;
use std::io;
use tracing::{debug, info};

impl FilesystemAssetstore {
    /// Remove a record's bytes if no other record references them
    ///
    /// Call this while the record is still in the files repository. Imported
    /// records and records without a digest are left alone.
    ///
    /// # Returns
    ///
    /// `true` if bytes were removed from disk
    pub fn delete(&self, record: &ContentRecord) -> Result<bool> {
        let Some(digest) = owned_digest(record) else {
            return Ok(false);
        };

        self.locks
            .with_lock(digest, || self.remove_if_unreferenced(record, digest))
    }

    /// Delete the bytes if unreferenced, then remove the record itself
    ///
    /// Both steps happen under one digest lock, so two concurrent releases of
    /// the last two references cannot both leave the object behind.
    pub fn release(&self, record: &ContentRecord) -> Result<bool> {
        let Some(digest) = owned_digest(record) else {
            self.catalog.files.remove(record.id)?;
            return Ok(false);
        };

        self.locks.with_lock(digest, || {
            let removed = self.remove_if_unreferenced(record, digest)?;
            self.catalog.files.remove(record.id)?;
            Ok(removed)
        })
    }

    fn remove_if_unreferenced(&self, record: &ContentRecord, digest: &str) -> Result<bool> {
        let query = self.scoped(RecordQuery::default().with_digest(digest));
        let references = self.catalog.files.count(&query, Some(2))?;

        if references != 1 {
            debug!(
                hash = %digest,
                references = references,
                "Content still referenced, keeping bytes"
            );
            return Ok(false);
        }

        let path = self.full_path(record);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(hash = %digest, path = %path.display(), "Deleted unreferenced content");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io_error(
                format!("Failed to delete content: {}", e),
                Some(path),
            )),
        }
    }
}

fn owned_digest(record: &ContentRecord) -> Option<&str> {
    if record.imported {
        return None;
    }
    record.digest.as_deref()
}
