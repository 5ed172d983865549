use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

use crate::storage::metadata_store::ParentType;

/**
 * 存储错误类型 - 使用 miette 提供用户友好的错误诊断
 *
 * 文件系统竞争（分片目录已存在、并发 finalize）在内部吸收，不会出现在这里
 */
#[derive(Error, Debug, Diagnostic)]
pub enum StoreError {
    #[error("IO error: {0}")]
    #[diagnostic(code(assetstore::io_error))]
    Io(#[from] std::io::Error),

    #[error("IO error: {message}")]
    #[diagnostic(code(assetstore::io_error_detailed))]
    IoDetailed {
        message: String,
        path: Option<PathBuf>,
    },

    #[error("Validation error: {0}")]
    #[diagnostic(
        code(assetstore::validation_error),
        help("The assetstore root must be an absolute, writable directory")
    )]
    Validation(String),

    #[error("Upload would exceed its declared size: {received} + {attempted} > {size}")]
    #[diagnostic(
        code(assetstore::size_exceeded),
        help("Resume from the offset reported by request_offset and send no more than the declared size")
    )]
    SizeExceeded {
        received: u64,
        attempted: u64,
        size: u64,
    },

    #[error("Upload is incomplete: received {received} of {size} bytes")]
    #[diagnostic(code(assetstore::incomplete_upload))]
    IncompleteUpload { received: u64, size: u64 },

    #[error("Scratch file is shorter than the recorded offset: recorded {recorded}, on disk {on_disk}")]
    #[diagnostic(
        code(assetstore::upload_out_of_sync),
        help("The scratch file was truncated externally; cancel and restart the upload")
    )]
    UploadOutOfSync { recorded: u64, on_disk: u64 },

    #[error("Corrupt digest state: {0}")]
    #[diagnostic(code(assetstore::corrupt_digest_state))]
    CorruptDigestState(String),

    #[error("Not found: {0}")]
    #[diagnostic(code(assetstore::not_found))]
    NotFound(String),

    #[error("Files cannot be imported directly underneath a {parent_type}: {}", .path.display())]
    #[diagnostic(
        code(assetstore::invalid_parent),
        help("Import into a folder, or place the file inside a subdirectory")
    )]
    InvalidParent {
        path: PathBuf,
        parent_type: ParentType,
    },

    #[error("Metadata store error: {0}")]
    #[diagnostic(code(assetstore::metadata_error))]
    Metadata(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(assetstore::config_error))]
    Config(String),
}

impl StoreError {
    /**
     * 创建验证错误
     */
    pub fn validation_error(message: impl Into<String>) -> Self {
        StoreError::Validation(message.into())
    }

    /**
     * 创建未找到错误
     */
    pub fn not_found(message: impl Into<String>) -> Self {
        StoreError::NotFound(message.into())
    }

    /**
     * 创建元数据存储错误
     */
    pub fn metadata_error(message: impl Into<String>) -> Self {
        StoreError::Metadata(message.into())
    }

    /**
     * 创建详细的IO错误
     */
    pub fn io_error(message: impl Into<String>, path: Option<PathBuf>) -> Self {
        StoreError::IoDetailed {
            message: message.into(),
            path,
        }
    }
}

/**
 * 统一结果类型
 */
pub type Result<T> = std::result::Result<T, StoreError>;
