//! Consistency scanning
//!
//! Compares file records with the bytes they point at. A record is invalid if
//! its bytes are gone, or (optionally) if their length disagrees with the
//! recorded size. The scan never hashes anything; use
//! [`FilesystemAssetstore::verify_content`] for that.
//!
//! Scans are lazy: [`InvalidFileScan`] stats one record per pull, so a caller
//! can stop early or interleave the scan with other work.

use crate::error::Result;
use crate::progress::{ProgressReporter, ProgressUpdate};
use crate::storage::assetstore::FilesystemAssetstore;
use crate::storage::metadata_store::{ContentRecord, RecordCursor, RecordQuery};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Why a record failed the check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// The resolved path is not a regular file
    Missing,
    /// The file length differs from the record size
    SizeMismatch,
}

/// Information about an invalid file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidFile {
    pub record: ContentRecord,
    /// Resolved location of the bytes
    pub path: PathBuf,
    pub reason: InvalidReason,
    /// Length on disk, when the file exists
    pub actual_size: Option<u64>,
}

/// Validation report for a full scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Total files checked
    pub total_files: usize,
    /// Files with valid backing bytes
    pub valid_files: usize,
    /// Files with missing or mismatched bytes
    pub invalid_files: Vec<InvalidFile>,
    /// Timestamp of validation
    pub timestamp: i64,
}

impl ValidationReport {
    /// Create a new empty validation report
    pub fn new() -> Self {
        Self {
            total_files: 0,
            valid_files: 0,
            invalid_files: Vec::new(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Check if validation passed (no errors)
    pub fn is_valid(&self) -> bool {
        self.invalid_files.is_empty()
    }

    pub fn missing(&self) -> impl Iterator<Item = &InvalidFile> {
        self.invalid_files
            .iter()
            .filter(|f| f.reason == InvalidReason::Missing)
    }

    pub fn size_mismatches(&self) -> impl Iterator<Item = &InvalidFile> {
        self.invalid_files
            .iter()
            .filter(|f| f.reason == InvalidReason::SizeMismatch)
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy sequence of invalid files
pub struct InvalidFileScan<'a> {
    store: &'a FilesystemAssetstore,
    records: RecordCursor<'a, ContentRecord>,
    check_size: bool,
    progress: &'a dyn ProgressReporter,
    checked: usize,
}

impl<'a> InvalidFileScan<'a> {
    /// Records examined so far
    pub fn checked(&self) -> usize {
        self.checked
    }

    fn check(&self, record: ContentRecord) -> Option<InvalidFile> {
        let path = self.store.full_path(&record);

        let metadata = match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => {
                return Some(InvalidFile {
                    record,
                    path,
                    reason: InvalidReason::Missing,
                    actual_size: None,
                })
            }
        };

        if self.check_size && metadata.len() != record.size {
            return Some(InvalidFile {
                record,
                path,
                reason: InvalidReason::SizeMismatch,
                actual_size: Some(metadata.len()),
            });
        }
        None
    }
}

impl Iterator for InvalidFileScan<'_> {
    type Item = Result<InvalidFile>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(e)),
            };

            self.checked += 1;
            let name = record.name.clone();
            let invalid = self.check(record);
            self.progress.update(ProgressUpdate::step(name));

            if let Some(invalid) = invalid {
                debug!(
                    file = %invalid.record.id,
                    path = %invalid.path.display(),
                    reason = ?invalid.reason,
                    "Found invalid file"
                );
                return Some(Ok(invalid));
            }
        }
    }
}

impl FilesystemAssetstore {
    /// Lazily find records whose bytes are missing or the wrong size
    ///
    /// `filter` is narrowed to this assetstore. Progress is announced with the
    /// total up front, then advanced by one per record examined.
    pub fn scan_for_invalid<'a>(
        &'a self,
        filter: RecordQuery,
        check_size: bool,
        progress: &'a dyn ProgressReporter,
    ) -> Result<InvalidFileScan<'a>> {
        let filter = self.scoped(filter);
        let total = self.catalog.files.count(&filter, None)?;
        progress.update(ProgressUpdate::started(total as u64));

        let records = self.catalog.files.find(&filter)?;
        Ok(InvalidFileScan {
            store: self,
            records,
            check_size,
            progress,
            checked: 0,
        })
    }

    /// Run a full scan and summarize it
    pub fn validate_integrity(
        &self,
        filter: RecordQuery,
        check_size: bool,
        progress: &dyn ProgressReporter,
    ) -> Result<ValidationReport> {
        let mut report = ValidationReport::new();

        let mut scan = self.scan_for_invalid(filter, check_size, progress)?;
        for invalid in scan.by_ref() {
            report.invalid_files.push(invalid?);
        }

        report.total_files = scan.checked();
        report.valid_files = report.total_files - report.invalid_files.len();

        info!(
            assetstore = %self.id(),
            total = report.total_files,
            valid = report.valid_files,
            invalid = report.invalid_files.len(),
            "Integrity validation completed"
        );
        Ok(report)
    }
}
