//! Content-Addressed Publishing
//!
//! Finalized uploads are named after their SHA-512 digest and stored in a
//! two-level sharded layout:
//!
//! ```text
//! root/
//!   3a/
//!     f2/
//!       3af2e1d4c5b6a7... (full 128-char digest as filename)
//! ```
//!
//! Identical content always lands on the same path, so a second finalize of
//! the same bytes just discards its scratch file (deduplication). Existing
//! objects are never overwritten.

use crate::error::{Result, StoreError};
use crate::storage::assetstore::FilesystemAssetstore;
use crate::storage::digest::IncrementalDigest;
use crate::storage::metadata_store::ContentRecord;
use crate::storage::upload::{catch_up, restore_digest, UploadSession};
use crate::utils::path::shard_path;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

impl FilesystemAssetstore {
    /// Publish a completed upload
    ///
    /// Applies crash catch-up, computes the digest, moves the scratch file to
    /// its canonical shard path (or discards it if the content is already
    /// stored) and returns a record describing the object. The record is not
    /// saved; persisting it is up to the caller.
    ///
    /// # Errors
    ///
    /// - `IncompleteUpload` if fewer than `size` bytes were received
    /// - `UploadOutOfSync` / `CorruptDigestState` if the session is damaged
    /// - `IoDetailed` if the object cannot be moved into place
    pub fn finalize(&self, session: UploadSession) -> Result<ContentRecord> {
        let mut digest = restore_digest(&session)?;
        let received = catch_up(&session, &mut digest)?;

        if received != session.size {
            return Err(StoreError::IncompleteUpload {
                received,
                size: session.size,
            });
        }

        let hash = digest.finalize_hex();
        let shard_dir = self.root().join(&hash[0..2]).join(&hash[2..4]);
        let object_path = self.object_path(&hash);

        // Concurrent creation of the same shard directory is fine
        fs::create_dir_all(&shard_dir).map_err(|e| {
            StoreError::io_error(
                format!("Failed to create shard directory: {}", e),
                Some(shard_dir.clone()),
            )
        })?;

        let deduplicated = self.locks.with_lock(&hash, || {
            publish(&session.temp_file, &shard_dir, &object_path)
        })?;

        let name = session
            .name
            .clone()
            .unwrap_or_else(|| session.id.to_string());

        let mut record = ContentRecord::new(name, self.id(), session.size);
        record.mime_type = mime_guess::from_path(&record.name)
            .first_raw()
            .map(str::to_owned);
        record.digest = Some(hash.clone());
        record.path = shard_path(&hash);

        info!(
            hash = %hash,
            size = session.size,
            path = %object_path.display(),
            deduplicated = deduplicated,
            "Finalized upload"
        );
        Ok(record)
    }

    /// Re-hash a stored object and compare with its recorded digest
    ///
    /// Reads the whole object; use sparingly on large stores.
    ///
    /// # Errors
    ///
    /// - `Validation` for imported records or records without a digest
    /// - `NotFound` if the object is missing
    pub fn verify_content(&self, record: &ContentRecord) -> Result<bool> {
        let expected = match (&record.digest, record.imported) {
            (Some(digest), false) => digest,
            _ => {
                return Err(StoreError::validation_error(format!(
                    "Record {} has no stored digest to verify",
                    record.id
                )))
            }
        };

        let path = self.full_path(record);
        let mut file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                StoreError::not_found(format!("Object not found: {}", path.display()))
            }
            _ => StoreError::io_error(
                format!("Failed to open object for hashing: {}", e),
                Some(path.clone()),
            ),
        })?;

        let mut digest = IncrementalDigest::new();
        io::copy(&mut file, &mut digest).map_err(|e| {
            StoreError::io_error(
                format!("Failed to read object for hashing: {}", e),
                Some(path.clone()),
            )
        })?;

        let computed = digest.finalize_hex();
        if &computed != expected {
            warn!(
                expected = %expected,
                computed = %computed,
                path = %path.display(),
                "Stored object does not match its digest"
            );
            return Ok(false);
        }
        Ok(true)
    }
}

/// Move the scratch file into place; returns `true` if the object already existed
fn publish(scratch: &Path, shard_dir: &Path, object_path: &Path) -> Result<bool> {
    if object_path.is_file() {
        discard_scratch(scratch);
        debug!(
            path = %object_path.display(),
            "Content already exists, discarding upload (deduplication)"
        );
        return Ok(true);
    }

    if let Err(e) = fs::rename(scratch, object_path) {
        debug!(
            error = %e,
            path = %object_path.display(),
            "Rename failed, falling back to copy"
        );

        let existed = copy_into_place(scratch, shard_dir, object_path)?;
        discard_scratch(scratch);
        if existed {
            debug!(
                path = %object_path.display(),
                "Content already exists (concurrent write detected), discarding upload"
            );
            return Ok(true);
        }
    }

    set_private_permissions(object_path);
    Ok(false)
}

/// Copy into a temp file beside the target and publish it without clobbering
///
/// The canonical path only ever holds a complete file. Returns `true` if
/// another writer published the object first.
fn copy_into_place(scratch: &Path, shard_dir: &Path, object_path: &Path) -> Result<bool> {
    let mut staged = tempfile::Builder::new()
        .prefix(".publish-")
        .tempfile_in(shard_dir)
        .map_err(|e| {
            StoreError::io_error(
                format!("Failed to create staging file: {}", e),
                Some(shard_dir.to_path_buf()),
            )
        })?;

    let mut source = File::open(scratch).map_err(|e| {
        StoreError::io_error(
            format!("Failed to open scratch file: {}", e),
            Some(scratch.to_path_buf()),
        )
    })?;

    io::copy(&mut source, staged.as_file_mut())
        .and_then(|_| staged.as_file().sync_all())
        .map_err(|e| {
            StoreError::io_error(
                format!("Failed to copy upload into place: {}", e),
                Some(object_path.to_path_buf()),
            )
        })?;

    match staged.persist_noclobber(object_path) {
        Ok(_) => Ok(false),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(true),
        Err(e) => Err(StoreError::io_error(
            format!("Failed to publish object: {}", e.error),
            Some(object_path.to_path_buf()),
        )),
    }
}

fn discard_scratch(scratch: &Path) {
    if let Err(e) = fs::remove_file(scratch) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %scratch.display(), error = %e, "Failed to remove scratch file");
        }
    }
}

#[cfg(unix)]
fn set_private_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        warn!(path = %path.display(), error = %e, "Failed to restrict object permissions");
    }
}

#[cfg(not(unix))]
fn set_private_permissions(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssetstoreConfig;
    use crate::storage::metadata_store::MetadataCatalog;
    use sha2::{Digest, Sha512};
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> FilesystemAssetstore {
        let config = AssetstoreConfig::new("test", dir.path().join("store"));
        FilesystemAssetstore::new(config, MetadataCatalog::in_memory()).unwrap()
    }

    fn upload(store: &FilesystemAssetstore, content: &[u8]) -> ContentRecord {
        let mut session = store.init_named_upload(content.len() as u64, "data.txt").unwrap();
        store.append_chunk(&mut session, content).unwrap();
        store.finalize(session).unwrap()
    }

    #[test]
    fn test_finalize_publishes_sharded_object() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let content = b"content addressed";

        let record = upload(&store, content);
        let expected = format!("{:x}", Sha512::digest(content));

        assert_eq!(record.digest.as_deref(), Some(expected.as_str()));
        assert_eq!(
            record.path,
            Path::new(&expected[0..2]).join(&expected[2..4]).join(&expected)
        );
        assert_eq!(record.size, content.len() as u64);
        assert_eq!(record.name, "data.txt");
        assert_eq!(record.mime_type.as_deref(), Some("text/plain"));
        assert!(!record.imported);
        assert_eq!(fs::read(store.full_path(&record)).unwrap(), content);
    }

    #[test]
    fn test_finalize_deduplicates() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let first = upload(&store, b"same bytes");
        let second = upload(&store, b"same bytes");

        assert_eq!(first.digest, second.digest);
        assert_eq!(first.path, second.path);
        assert_ne!(first.id, second.id);
        // Both scratch files are gone
        assert_eq!(fs::read_dir(store.temp_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_finalize_incomplete_upload() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let mut session = store.init_upload(10).unwrap();
        store.append_chunk(&mut session, b"short").unwrap();

        let result = store.finalize(session);
        assert!(matches!(
            result,
            Err(StoreError::IncompleteUpload {
                received: 5,
                size: 10
            })
        ));
    }

    #[test]
    fn test_finalize_applies_catch_up() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let mut session = store.init_upload(8).unwrap();
        store.append_chunk(&mut session, b"abcd").unwrap();

        let stale = session.clone();
        store.append_chunk(&mut session, b"efgh").unwrap();

        let record = store.finalize(stale).unwrap();
        assert_eq!(
            record.digest.unwrap(),
            format!("{:x}", Sha512::digest(b"abcdefgh"))
        );
    }

    #[test]
    fn test_empty_upload() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let session = store.init_upload(0).unwrap();
        let record = store.finalize(session).unwrap();

        assert_eq!(record.size, 0);
        assert!(store.full_path(&record).is_file());
    }

    #[test]
    fn test_copy_into_place_respects_existing_object() {
        let dir = TempDir::new().unwrap();
        let scratch = dir.path().join("scratch");
        let target = dir.path().join("object");
        fs::write(&scratch, b"new").unwrap();
        fs::write(&target, b"old").unwrap();

        let existed = copy_into_place(&scratch, dir.path(), &target).unwrap();
        assert!(existed);
        assert_eq!(fs::read(&target).unwrap(), b"old");

        fs::remove_file(&target).unwrap();
        let existed = copy_into_place(&scratch, dir.path(), &target).unwrap();
        assert!(!existed);
        assert_eq!(fs::read(&target).unwrap(), b"new");
    }

    #[cfg(unix)]
    #[test]
    fn test_published_object_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let record = upload(&store, b"secret");

        let mode = fs::metadata(store.full_path(&record))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_verify_content_detects_corruption() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let record = upload(&store, b"pristine");

        assert!(store.verify_content(&record).unwrap());

        fs::write(store.full_path(&record), b"tampered").unwrap();
        assert!(!store.verify_content(&record).unwrap());

        fs::remove_file(store.full_path(&record)).unwrap();
        assert!(matches!(
            store.verify_content(&record),
            Err(StoreError::NotFound(_))
        ));
    }

    // Property-based tests
    #[cfg(test)]
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn prop_finalize_matches_one_shot_digest(
                content in prop::collection::vec(any::<u8>(), 0..20_000),
                chunk in 1usize..5000,
            ) {
                let dir = TempDir::new().unwrap();
                let store = open(&dir);

                let mut session = store.init_upload(content.len() as u64).unwrap();
                for piece in content.chunks(chunk) {
                    store.append_chunk(&mut session, piece).unwrap();
                }
                let record = store.finalize(session).unwrap();

                prop_assert_eq!(record.digest.unwrap(), format!("{:x}", Sha512::digest(&content)));
            }
        }
    }
}
