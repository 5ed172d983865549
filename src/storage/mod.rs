//! Filesystem Assetstore Storage Module
//!
//! Content-addressed, resumable storage over a local directory:
//!
//! - Resumable SHA-512 digests that survive a process restart mid-upload
//! - Sharded content-addressed layout with automatic deduplication
//! - Restartable byte-range streaming
//! - Consistency scans of records against the bytes they reference
//! - Reference-aware deletion of shared content
//! - In-place import of existing directory trees
//!
//! ## Architecture
//!
//! ```text
//! root/
//! ├── temp/                    # In-flight uploads (upload-*)
//! ├── 3a/
//! │   └── f2/
//! │       └── 3af2e1d4c5...    # SHA-512 hash (128 hex chars)
//! └── b7/
//!     └── e1/
//!         └── b7e145a3b2...
//! ```
//!
//! Metadata records live outside this module; the assetstore reaches them
//! through the repositories in [`metadata_store`].

pub mod assetstore;
pub mod cas;
pub mod deletion;
pub mod digest;
pub mod download;
pub mod import;
pub mod integrity;
pub mod locks;
pub mod metadata_store;
pub mod upload;

pub use assetstore::{Assetstore, Capacity, FilesystemAssetstore};
pub use digest::IncrementalDigest;
pub use download::{ByteRangeStreamer, ChunkIter};
pub use import::ImportSummary;
pub use integrity::{InvalidFile, InvalidFileScan, InvalidReason, ValidationReport};
pub use metadata_store::{
    ContentRecord, Folder, InMemoryRepository, Item, MetadataCatalog, ParentType, Record,
    RecordCursor, RecordQuery, Repository,
};
pub use upload::UploadSession;
