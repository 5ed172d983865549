//! Tree import
//!
//! Adopts an existing directory tree without copying it: directories become
//! folders, files become items holding an imported file record that points at
//! the original absolute path. Imported bytes are never hashed, moved or
//! deleted by the assetstore.
//!
//! Re-running an import over the same tree reuses the folders, items and file
//! records created the first time; file records are refreshed with the current
//! size and modification time.

use crate::error::{Result, StoreError};
use crate::progress::{ProgressReporter, ProgressUpdate};
use crate::storage::assetstore::FilesystemAssetstore;
use crate::storage::metadata_store::{ContentRecord, Folder, Item, ParentType, RecordQuery};
use crate::utils::path::canonicalize_path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;
use walkdir::WalkDir;

/// Counts of what an import touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub folders: usize,
    pub items: usize,
    pub files: usize,
}

impl FilesystemAssetstore {
    /// Mirror the tree under `path` into metadata records
    ///
    /// Entries are visited in sorted order. Directories become folders under
    /// the current parent; files become an item plus an imported file record,
    /// which requires the current parent to be a folder. Symbolic links are
    /// skipped.
    ///
    /// # Arguments
    ///
    /// * `path` - Existing directory to import
    /// * `parent_id` / `parent_type` - Where the top-level entries go
    /// * `user` - Creator recorded on new folders, items and files
    /// * `progress` - Receives one message per entry
    ///
    /// # Errors
    ///
    /// - `Validation` if `path` is not a directory
    /// - `InvalidParent` if a file would land directly under a non-folder
    pub fn import_tree(
        &self,
        path: &Path,
        parent_id: Uuid,
        parent_type: ParentType,
        user: Option<Uuid>,
        progress: &dyn ProgressReporter,
    ) -> Result<ImportSummary> {
        if !path.is_dir() {
            return Err(StoreError::validation_error(format!(
                "Import path is not a directory: {}",
                path.display()
            )));
        }

        let root = canonicalize_path(path)?;
        let mut parents: HashMap<PathBuf, (Uuid, ParentType)> = HashMap::new();
        parents.insert(root.clone(), (parent_id, parent_type));

        let mut summary = ImportSummary::default();

        for entry in WalkDir::new(&root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf);
                StoreError::io_error(format!("Failed to walk import tree: {}", e), path)
            })?;

            let entry_path = entry.path();
            let (current_id, current_type) = entry_path
                .parent()
                .and_then(|dir| parents.get(dir).copied())
                .ok_or_else(|| {
                    StoreError::io_error(
                        "Import entry visited before its directory",
                        Some(entry_path.to_path_buf()),
                    )
                })?;

            let name = entry.file_name().to_string_lossy().into_owned();
            progress.update(ProgressUpdate::message(name.clone()));

            let file_type = entry.file_type();
            if file_type.is_dir() {
                let folder = self.find_or_create_folder(&name, current_id, current_type, user)?;
                parents.insert(entry_path.to_path_buf(), (folder.id, ParentType::Folder));
                summary.folders += 1;
            } else if file_type.is_file() {
                if !current_type.can_hold_files() {
                    return Err(StoreError::InvalidParent {
                        path: entry_path.to_path_buf(),
                        parent_type: current_type,
                    });
                }
                let item = self.find_or_create_item(&name, current_id, user)?;
                self.import_file(&item, entry_path, user, Some(&name), None)?;
                summary.items += 1;
                summary.files += 1;
            } else {
                debug!(path = %entry_path.display(), "Skipping non-regular entry during import");
            }
        }

        info!(
            assetstore = %self.id(),
            path = %root.display(),
            folders = summary.folders,
            files = summary.files,
            "Imported directory tree"
        );
        Ok(summary)
    }

    /// Attach one external file to `item` without copying it
    ///
    /// Reuses the item's file record of the same name if there is one.
    /// `mime_type` defaults to a guess from the file extension.
    pub fn import_file(
        &self,
        item: &Item,
        path: &Path,
        user: Option<Uuid>,
        name: Option<&str>,
        mime_type: Option<&str>,
    ) -> Result<ContentRecord> {
        let path = canonicalize_path(path)?;
        let metadata = fs::metadata(&path).map_err(|e| {
            StoreError::io_error(format!("Failed to stat import file: {}", e), Some(path.clone()))
        })?;
        if !metadata.is_file() {
            return Err(StoreError::validation_error(format!(
                "Import path is not a file: {}",
                path.display()
            )));
        }

        let name = match name {
            Some(name) => name.to_owned(),
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let mime_type = mime_type
            .map(str::to_owned)
            .or_else(|| mime_guess::from_path(&path).first_raw().map(str::to_owned));
        let mtime = metadata.modified().ok().map(DateTime::<Utc>::from);

        let query = RecordQuery::default().with_parent(item.id).with_name(&name);
        let existing = self.catalog.files.find_one(&query)?;
        let reused = existing.is_some();

        let mut record = existing.unwrap_or_else(|| {
            let mut record = ContentRecord::new(&name, self.id(), metadata.len());
            record.item_id = Some(item.id);
            record.creator_id = user;
            record
        });
        record.assetstore_id = self.id();
        record.size = metadata.len();
        record.mtime = mtime;
        record.path = path;
        record.imported = true;
        record.digest = None;
        record.mime_type = mime_type;

        if reused {
            self.catalog.files.save(&record)?;
        } else {
            record = self.catalog.files.create(record)?;
        }

        debug!(
            file = %record.id,
            path = %record.path.display(),
            size = record.size,
            reused = reused,
            "Imported file"
        );
        Ok(record)
    }

    fn find_or_create_folder(
        &self,
        name: &str,
        parent_id: Uuid,
        parent_type: ParentType,
        user: Option<Uuid>,
    ) -> Result<Folder> {
        let query = RecordQuery::default()
            .with_parent(parent_id)
            .with_parent_type(parent_type)
            .with_name(name);

        match self.catalog.folders.find_one(&query)? {
            Some(folder) => Ok(folder),
            None => self
                .catalog
                .folders
                .create(Folder::new(name, parent_id, parent_type, user)),
        }
    }

    fn find_or_create_item(&self, name: &str, folder_id: Uuid, user: Option<Uuid>) -> Result<Item> {
        let query = RecordQuery::default().with_parent(folder_id).with_name(name);

        match self.catalog.items.find_one(&query)? {
            Some(item) => Ok(item),
            None => self.catalog.items.create(Item::new(name, folder_id, user)),
        }
    }
}
