//! Resumable uploads
//!
//! An upload is a scratch file under the temp directory plus an
//! [`UploadSession`] describing how far it got. The session carries the
//! exported digest state, so a host may persist it between chunks, restart,
//! and continue appending without re-reading what is already on disk.
//!
//! ## Lifecycle
//!
//! ```text
//! init_upload ──► append_chunk* ──► finalize   (bytes published)
//!                       │
//!                       └────────► cancel      (scratch file removed)
//! ```
//!
//! ## Crash recovery
//!
//! If the process dies after writing a chunk but before the session was
//! persisted, the scratch file is longer than `received`. The next append or
//! finalize first feeds exactly that gap into the digest ("catch-up").

use crate::error::{Result, StoreError};
use crate::storage::assetstore::FilesystemAssetstore;
use crate::storage::digest::IncrementalDigest;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// State of one in-progress upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    pub id: Uuid,
    /// Scratch file under the assetstore temp directory
    pub temp_file: PathBuf,
    /// Bytes appended and folded into `digest_state`
    pub received: u64,
    /// Declared total size
    pub size: u64,
    #[serde(with = "crate::utils::encoding::base64_bytes")]
    pub digest_state: Vec<u8>,
    /// Name given to the finalized record
    #[serde(default)]
    pub name: Option<String>,
}

impl UploadSession {
    pub fn remaining(&self) -> u64 {
        self.size.saturating_sub(self.received)
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.size
    }
}

impl FilesystemAssetstore {
    /// Start an upload of `size` bytes
    ///
    /// Creates an empty, private scratch file named `upload-*` in the temp
    /// directory.
    pub fn init_upload(&self, size: u64) -> Result<UploadSession> {
        self.start_upload(size, None)
    }

    /// Start an upload whose finalized record will carry `name`
    pub fn init_named_upload(&self, size: u64, name: impl Into<String>) -> Result<UploadSession> {
        self.start_upload(size, Some(name.into()))
    }

    fn start_upload(&self, size: u64, name: Option<String>) -> Result<UploadSession> {
        fs::create_dir_all(&self.temp_dir).map_err(|e| {
            StoreError::io_error(
                format!("Failed to create temp directory: {}", e),
                Some(self.temp_dir.clone()),
            )
        })?;

        let temp_file = tempfile::Builder::new()
            .prefix("upload-")
            .tempfile_in(&self.temp_dir)
            .map_err(|e| {
                StoreError::io_error(
                    format!("Failed to create scratch file: {}", e),
                    Some(self.temp_dir.clone()),
                )
            })?
            .into_temp_path()
            .keep()
            .map_err(|e| {
                StoreError::io_error(
                    format!("Failed to keep scratch file: {}", e.error),
                    Some(self.temp_dir.clone()),
                )
            })?;

        let session = UploadSession {
            id: Uuid::new_v4(),
            temp_file,
            received: 0,
            size,
            digest_state: IncrementalDigest::new().export()?,
            name,
        };

        debug!(
            upload = %session.id,
            size = size,
            path = %session.temp_file.display(),
            "Initialized upload"
        );
        Ok(session)
    }

    /// Bytes actually present in the scratch file
    ///
    /// Clients resume from this offset after an interruption. It may exceed
    /// `session.received` if a crash hit between write and session update.
    pub fn request_offset(&self, session: &UploadSession) -> Result<u64> {
        scratch_len(&session.temp_file)
    }

    /// Append one chunk and return the new `received` offset
    ///
    /// # Errors
    ///
    /// - `SizeExceeded` if the chunk would grow the upload past its size
    /// - `UploadOutOfSync` if the scratch file is shorter than `received`
    /// - `CorruptDigestState` if the session's digest cannot be restored
    ///
    /// On error the scratch file is truncated back to `session.received` and
    /// the session is left unchanged.
    pub fn append_chunk(&self, session: &mut UploadSession, chunk: &[u8]) -> Result<u64> {
        self.append_reader(session, chunk)
    }

    /// Append everything `reader` yields, in buffer-sized pieces
    pub fn append_reader<R: Read>(&self, session: &mut UploadSession, mut reader: R) -> Result<u64> {
        let mut digest = restore_digest(session)?;
        let start = catch_up(session, &mut digest)?;

        if start > session.size {
            return Err(StoreError::SizeExceeded {
                received: start,
                attempted: 0,
                size: session.size,
            });
        }

        let mut file = OpenOptions::new()
            .append(true)
            .open(&session.temp_file)
            .map_err(|e| {
                StoreError::io_error(
                    format!("Failed to open scratch file: {}", e),
                    Some(session.temp_file.clone()),
                )
            })?;

        let rollback_path = session.temp_file.clone();
        let recorded = session.received;
        let guard = scopeguard::guard((), move |_| {
            if let Err(e) = truncate_to(&rollback_path, recorded) {
                error!(
                    path = %rollback_path.display(),
                    offset = recorded,
                    error = %e,
                    "Failed to roll back scratch file"
                );
            }
        });

        let mut buffer = vec![0u8; self.buffer_size];
        let mut received = start;

        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(StoreError::Io(e)),
            };

            if received + read as u64 > session.size {
                warn!(
                    upload = %session.id,
                    received = received,
                    attempted = read,
                    size = session.size,
                    "Chunk exceeds declared upload size"
                );
                return Err(StoreError::SizeExceeded {
                    received,
                    attempted: read as u64,
                    size: session.size,
                });
            }

            file.write_all(&buffer[..read]).map_err(|e| {
                StoreError::io_error(
                    format!("Failed to write scratch file: {}", e),
                    Some(session.temp_file.clone()),
                )
            })?;
            digest.update(&buffer[..read]);
            received += read as u64;
        }

        let digest_state = digest.export()?;
        scopeguard::ScopeGuard::into_inner(guard);

        session.digest_state = digest_state;
        session.received = received;

        debug!(
            upload = %session.id,
            received = received,
            size = session.size,
            "Appended to upload"
        );
        Ok(received)
    }

    /// Discard an upload
    ///
    /// Removes the scratch file. Safe to call more than once.
    pub fn cancel(&self, session: &UploadSession) -> Result<()> {
        match fs::remove_file(&session.temp_file) {
            Ok(()) => {
                info!(upload = %session.id, "Cancelled upload");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io_error(
                format!("Failed to remove scratch file: {}", e),
                Some(session.temp_file.clone()),
            )),
        }
    }
}

/// Restore the session digest and check it covers exactly `received` bytes
pub(crate) fn restore_digest(session: &UploadSession) -> Result<IncrementalDigest> {
    let digest = IncrementalDigest::restore(&session.digest_state)?;
    if digest.bytes_processed() != session.received {
        return Err(StoreError::CorruptDigestState(format!(
            "digest covers {} bytes but session received {}",
            digest.bytes_processed(),
            session.received
        )));
    }
    Ok(digest)
}

/// Fold any bytes written past `received` into the digest
///
/// Returns the offset the digest now covers.
pub(crate) fn catch_up(session: &UploadSession, digest: &mut IncrementalDigest) -> Result<u64> {
    let on_disk = scratch_len(&session.temp_file)?;

    if on_disk < session.received {
        return Err(StoreError::UploadOutOfSync {
            recorded: session.received,
            on_disk,
        });
    }
    if on_disk == session.received {
        return Ok(on_disk);
    }

    let gap = on_disk - session.received;
    let mut file = File::open(&session.temp_file)?;
    file.seek(SeekFrom::Start(session.received))?;
    let copied = io::copy(&mut file.take(gap), digest)?;

    warn!(
        upload = %session.id,
        recorded = session.received,
        recovered = copied,
        "Recovered unrecorded bytes in scratch file"
    );
    Ok(session.received + copied)
}

fn scratch_len(path: &Path) -> Result<u64> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(metadata.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::not_found(format!(
            "Upload scratch file is gone: {}",
            path.display()
        ))),
        Err(e) => Err(StoreError::Io(e)),
    }
}

fn truncate_to(path: &Path, len: u64) -> io::Result<()> {
    OpenOptions::new().write(true).open(path)?.set_len(len)
}
