//! Content-addressed, resumable filesystem assetstore
//!
//! Stores uploaded files under the SHA-512 of their content, accepts them as
//! sequential chunks whose hash state can be persisted between requests, and
//! keeps metadata records and on-disk bytes consistent.
//!
//! ```no_run
//! use fs_assetstore::{AssetstoreConfig, FilesystemAssetstore, MetadataCatalog};
//!
//! # fn main() -> fs_assetstore::Result<()> {
//! let config = AssetstoreConfig::new("primary", "/srv/assets");
//! let store = FilesystemAssetstore::new(config, MetadataCatalog::in_memory())?;
//!
//! let mut session = store.init_named_upload(11, "hello.txt")?;
//! store.append_chunk(&mut session, b"hello ")?;
//! store.append_chunk(&mut session, b"world")?;
//! let record = store.finalize(session)?;
//!
//! for chunk in store.stream(&record, None, None)?.chunks() {
//!     let _bytes = chunk?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod progress;
pub mod storage;
pub mod telemetry;
pub mod utils;

pub use config::{AssetstoreConfig, LoggingConfig};
pub use error::{Result, StoreError};
pub use progress::{NoProgress, ProgressReporter, ProgressUpdate, RecordingProgress};
pub use storage::{
    Assetstore, ByteRangeStreamer, Capacity, ContentRecord, FilesystemAssetstore, Folder,
    ImportSummary, IncrementalDigest, InMemoryRepository, InvalidFile, InvalidReason, Item,
    MetadataCatalog, ParentType, RecordQuery, Repository, UploadSession, ValidationReport,
};
