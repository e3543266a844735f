//! The storage traits: raw file access and schema-aware table access.
//!
//! [`FileStorage`] is the byte/text level interface every backend provides.
//! [`DataStorage`] reads and writes tables in a named format on top of a
//! storage location. Callers obtain both through the storage manager and
//! never learn which backend sits behind them.
//!
//! # Paths
//!
//! All paths are backend-relative logical paths (`"dir/file.csv"`), never
//! absolute native paths. Resolution to native locations is private to each
//! implementation.

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use bytes::Bytes;

use crate::stream::{ByteReadStream, ByteWriteStream, TextReadStream, TextWriteStream};
use crate::types::{FileStat, FormatOptions, TableSchema, TextEncoding};
use crate::Result;

/// Uniform byte/text level file operations against one storage location.
///
/// Implementations must be `Send + Sync`; a single instance is shared by all
/// callers of a storage key. Operations on different paths may run
/// concurrently. No operation retries internally.
///
/// Only the stream primitives, `exists`, `stat`, `ls`, `mkdir` and `rm` are
/// required; the whole-content reads and writes are provided on top of the
/// streams.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Check if a file or directory exists. Returns `false` for anything missing.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Size in bytes of the entry at `path`.
    async fn size(&self, path: &str) -> Result<u64> {
        Ok(self.stat(path).await?.size)
    }

    /// Stat the entry at `path`. Returns [`TroveError::NotFound`] if absent.
    ///
    /// [`TroveError::NotFound`]: crate::TroveError::NotFound
    async fn stat(&self, path: &str) -> Result<FileStat>;

    /// List the direct children of the directory at `path`.
    ///
    /// Children are returned as storage paths (relative to the storage root),
    /// sorted. Fails with NotFound if `path` is not an existing directory.
    async fn ls(&self, path: &str) -> Result<Vec<String>>;

    /// Create a directory.
    ///
    /// With `recursive = false` missing parents are an error; with
    /// `exists_ok = false` an existing target is an error.
    async fn mkdir(&self, path: &str, recursive: bool, exists_ok: bool) -> Result<()>;

    /// Remove a file or directory. Non-empty directories need `recursive`.
    async fn rm(&self, path: &str, recursive: bool) -> Result<()>;

    /// Read the full content of a file.
    async fn read_bytes(&self, path: &str) -> Result<Bytes> {
        let mut stream = self.read_byte_stream(path).await?;
        stream.read_to_end().await
    }

    /// Open a file for streaming reads.
    async fn read_byte_stream(&self, path: &str) -> Result<ByteReadStream>;

    /// Write the full content of a file.
    ///
    /// With `overwrite = false` the write is an exclusive create and fails
    /// with AlreadyExists if the target exists, leaving it untouched.
    async fn write_bytes(&self, path: &str, data: Bytes, overwrite: bool) -> Result<()> {
        let mut stream = self.write_byte_stream(path, overwrite).await?;
        stream.write_all(&data).await?;
        stream.close().await
    }

    /// Open a file for streaming writes. The handle must be closed to commit.
    async fn write_byte_stream(&self, path: &str, overwrite: bool) -> Result<ByteWriteStream>;

    /// Read and decode the full content of a text file.
    async fn read_text(&self, path: &str, encoding: TextEncoding) -> Result<String> {
        let mut stream = self.read_text_stream(path, encoding).await?;
        stream.read_to_string().await
    }

    /// Open a text file for streaming reads.
    async fn read_text_stream(&self, path: &str, encoding: TextEncoding) -> Result<TextReadStream> {
        let stream = self.read_byte_stream(path).await?;
        Ok(TextReadStream::new(stream, encoding))
    }

    /// Encode and write the full content of a text file.
    async fn write_text(
        &self,
        path: &str,
        data: &str,
        encoding: TextEncoding,
        overwrite: bool,
    ) -> Result<()> {
        let mut stream = self.write_text_stream(path, encoding, overwrite).await?;
        stream.write_str(data).await?;
        stream.close().await
    }

    /// Open a text file for streaming writes. The handle must be closed to commit.
    async fn write_text_stream(
        &self,
        path: &str,
        encoding: TextEncoding,
        overwrite: bool,
    ) -> Result<TextWriteStream> {
        let stream = self.write_byte_stream(path, overwrite).await?;
        Ok(TextWriteStream::new(stream, encoding))
    }
}

/// Schema-aware table reads and writes against one storage location.
#[async_trait]
pub trait DataStorage: Send + Sync {
    /// Read the table stored at `path` in `format`.
    ///
    /// If the schema declares fields, only those columns are read, in schema
    /// order; otherwise every column is read.
    async fn read_table(
        &self,
        schema: &TableSchema,
        path: &str,
        format: &str,
        options: &FormatOptions,
    ) -> Result<RecordBatch>;

    /// Write `batch` to `path` in `format`.
    ///
    /// If the schema declares fields, only those columns are written. With
    /// `overwrite = false` an existing target fails with AlreadyExists.
    async fn write_table(
        &self,
        schema: &TableSchema,
        batch: &RecordBatch,
        path: &str,
        format: &str,
        options: &FormatOptions,
        overwrite: bool,
    ) -> Result<()>;
}
