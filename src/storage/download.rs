//! Byte-range streaming
//!
//! [`ByteRangeStreamer`] is a descriptor, not an open file. Every call to
//! [`ByteRangeStreamer::chunks`] builds a fresh iterator that opens the file on
//! its first pull, so the same descriptor can be replayed (e.g. to retry a
//! transfer) and nothing is held open until the consumer actually reads.
//!
//! Since the first pull is the real read, a file removed after
//! [`FilesystemAssetstore::stream`] surfaces there as a `NotFound` item.

use crate::error::{Result, StoreError};
use crate::storage::assetstore::FilesystemAssetstore;
use crate::storage::metadata_store::ContentRecord;
use bytes::Bytes;
use futures::Stream;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

impl FilesystemAssetstore {
    /// Describe a read of `record`'s bytes in `[start, end)`
    ///
    /// `end` defaults to and is capped at `record.size`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the bytes are not a regular file right now
    pub fn stream(
        &self,
        record: &ContentRecord,
        start: Option<u64>,
        end: Option<u64>,
    ) -> Result<ByteRangeStreamer> {
        let path = self.full_path(record);
        if !path.is_file() {
            return Err(StoreError::not_found(format!(
                "Content for {} not found at {}",
                record.name,
                path.display()
            )));
        }

        let size = record.size;
        let start = start.unwrap_or(0);
        let end = end.unwrap_or(size).min(size);

        Ok(ByteRangeStreamer {
            path,
            start,
            end,
            size,
            buffer_size: self.buffer_size,
        })
    }
}

/// Restartable description of a byte range over one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteRangeStreamer {
    path: PathBuf,
    start: u64,
    end: u64,
    size: u64,
    buffer_size: usize,
}

impl ByteRangeStreamer {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    /// Exclusive end offset
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Size of the whole object
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of bytes the stream will yield
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this covers less than the whole object
    pub fn is_partial(&self) -> bool {
        self.start > 0 || self.end < self.size
    }

    /// Fresh lazy iterator over the range
    pub fn chunks(&self) -> ChunkIter {
        ChunkIter {
            path: self.path.clone(),
            position: self.start,
            end: self.end,
            buffer_size: self.buffer_size,
            file: None,
            done: false,
        }
    }

    /// Advisory HTTP range metadata for this read
    ///
    /// `Content-Range` is only present for a non-empty partial range.
    pub fn range_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("Accept-Ranges", "bytes".to_string()),
            ("Content-Length", self.len().to_string()),
        ];
        if self.is_partial() && !self.is_empty() {
            headers.push((
                "Content-Range",
                format!("bytes {}-{}/{}", self.start, self.end - 1, self.size),
            ));
        }
        headers
    }

    /// Stream the range from a blocking worker
    ///
    /// Reads run on tokio's blocking pool and hand chunks over a channel of
    /// capacity one, so at most one chunk is read ahead of the consumer.
    /// Must be called from within a tokio runtime.
    pub fn into_async_stream(self) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes>>(1);

        tokio::task::spawn_blocking(move || {
            for chunk in self.chunks() {
                let failed = chunk.is_err();
                // Receiver dropped: consumer lost interest
                if tx.blocking_send(chunk).is_err() || failed {
                    break;
                }
            }
            debug!(path = %self.path.display(), "Async stream producer finished");
        });

        futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        })
    }
}

/// Pull-based reader over `[position, end)`
///
/// Each item is at most `buffer_size` bytes. Dropping the iterator closes the
/// file.
#[derive(Debug)]
pub struct ChunkIter {
    path: PathBuf,
    position: u64,
    end: u64,
    buffer_size: usize,
    file: Option<File>,
    done: bool,
}

impl ChunkIter {
    fn open(&self) -> Result<File> {
        let mut file = File::open(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::not_found(format!(
                "Content not found at {}",
                self.path.display()
            )),
            _ => StoreError::io_error(
                format!("Failed to open content for streaming: {}", e),
                Some(self.path.clone()),
            ),
        })?;
        file.seek(SeekFrom::Start(self.position))?;
        Ok(file)
    }

    fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.file.is_none() {
            self.file = Some(self.open()?);
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(None);
        };

        let want = (self.end - self.position).min(self.buffer_size as u64);
        let mut buffer = Vec::with_capacity(want as usize);
        file.by_ref().take(want).read_to_end(&mut buffer)?;

        if buffer.is_empty() {
            // File is shorter than its record claims
            return Ok(None);
        }
        self.position += buffer.len() as u64;
        Ok(Some(Bytes::from(buffer)))
    }
}

impl Iterator for ChunkIter {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.position >= self.end {
            self.file = None;
            return None;
        }

        match self.read_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.done = true;
                self.file = None;
                None
            }
            Err(e) => {
                self.done = true;
                self.file = None;
                Some(Err(e))
            }
        }
    }
}
