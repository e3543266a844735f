//! Table storage on top of any [`FileStorage`].
//!
//! [`CommonDataStorage`] looks up a codec in the [`FormatRegistry`] and
//! streams table content through the file storage. With pushdown enabled the
//! codec instead reads and writes the native file under the storage root
//! directly, skipping the stream layer entirely.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, instrument, warn};

use trove_core::config::StorageConfig;
use trove_core::error::TroveError;
use trove_core::path::{is_root, resolve_native};
use trove_core::storage::{DataStorage, FileStorage};
use trove_core::types::{FormatOptions, TableSchema, TextEncoding};
use trove_core::Result;

use crate::format::{FormatRegistry, TableFormat, TableSource};
use crate::local::LocalStorageOptions;

/// A [`DataStorage`] that works with any [`FileStorage`] backend.
pub struct CommonDataStorage {
    file_storage: Arc<dyn FileStorage>,
    formats: Arc<FormatRegistry>,
    /// Resolved storage root, present only when pushdown is enabled.
    pushdown_root: Option<PathBuf>,
}

impl CommonDataStorage {
    /// Create table storage over `file_storage`.
    ///
    /// With `pushdown` set the configuration must carry a `root_path` that
    /// resolves to an existing directory.
    pub fn new(
        config: &StorageConfig,
        file_storage: Arc<dyn FileStorage>,
        formats: Arc<FormatRegistry>,
        pushdown: bool,
    ) -> Result<Self> {
        let pushdown_root = if pushdown {
            let root = LocalStorageOptions::from_config(config)?.resolve_root()?;
            debug!(root = %root.display(), "Table pushdown enabled");
            Some(root)
        } else {
            None
        };
        Ok(Self {
            file_storage,
            formats,
            pushdown_root,
        })
    }

    pub fn pushdown_enabled(&self) -> bool {
        self.pushdown_root.is_some()
    }

    async fn read_via_stream(&self, codec: &Arc<dyn TableFormat>, path: &str) -> Result<Bytes> {
        if codec.is_binary() {
            let mut stream = self.file_storage.read_byte_stream(path).await?;
            stream.read_to_end().await
        } else {
            let mut stream = self
                .file_storage
                .read_text_stream(path, TextEncoding::Utf8)
                .await?;
            Ok(Bytes::from(stream.read_to_string().await?))
        }
    }

    async fn write_via_stream(
        &self,
        codec: &Arc<dyn TableFormat>,
        path: &str,
        content: Vec<u8>,
        overwrite: bool,
    ) -> Result<()> {
        if codec.is_binary() {
            let mut stream = self.file_storage.write_byte_stream(path, overwrite).await?;
            stream.write_all(&content).await?;
            stream.close().await
        } else {
            let text = String::from_utf8(content).map_err(|e| {
                TroveError::access(format!("Encoded {} content is not valid UTF-8", codec.name()), e)
            })?;
            let mut stream = self
                .file_storage
                .write_text_stream(path, TextEncoding::Utf8, overwrite)
                .await?;
            stream.write_str(&text).await?;
            stream.close().await
        }
    }
}

#[async_trait]
impl DataStorage for CommonDataStorage {
    #[instrument(skip(self, schema, options), fields(path = %path, format = %format))]
    async fn read_table(
        &self,
        schema: &TableSchema,
        path: &str,
        format: &str,
        options: &FormatOptions,
    ) -> Result<RecordBatch> {
        let codec = self.formats.get(format)?;
        let schema = schema.clone();
        let options = options.clone();

        let batch = if let Some(root) = &self.pushdown_root {
            let native = resolve_native(root, path)?;
            let storage_path = path.to_string();
            run_blocking(move || {
                let file = std::fs::File::open(&native)
                    .map_err(|e| TroveError::from_io(e, &storage_path))?;
                codec.decode(TableSource::Native(file), &schema, &options)
            })
            .await?
        } else {
            let content = self.read_via_stream(&codec, path).await?;
            run_blocking(move || codec.decode(TableSource::Buffered(content), &schema, &options))
                .await?
        };

        debug!(
            rows = batch.num_rows(),
            columns = batch.num_columns(),
            pushdown = self.pushdown_enabled(),
            "Read table"
        );
        Ok(batch)
    }

    #[instrument(skip(self, schema, batch, options), fields(path = %path, format = %format))]
    async fn write_table(
        &self,
        schema: &TableSchema,
        batch: &RecordBatch,
        path: &str,
        format: &str,
        options: &FormatOptions,
        overwrite: bool,
    ) -> Result<()> {
        let codec = self.formats.get(format)?;
        let schema = schema.clone();
        let options = options.clone();
        let batch = batch.clone();

        if let Some(root) = &self.pushdown_root {
            if is_root(path) {
                return Err(TroveError::access_msg("Cannot write a table over the storage root"));
            }
            let native = resolve_native(root, path)?;
            let storage_path = path.to_string();
            run_blocking(move || {
                write_native(codec.as_ref(), &native, &storage_path, overwrite, |sink| {
                    codec.encode(sink, &schema, &batch, &options)
                })
            })
            .await?;
        } else {
            let encoder = codec.clone();
            let content = run_blocking(move || {
                let mut buffer: Vec<u8> = Vec::new();
                encoder.encode(&mut buffer, &schema, &batch, &options)?;
                Ok(buffer)
            })
            .await?;
            self.write_via_stream(&codec, path, content, overwrite).await?;
        }

        debug!(pushdown = self.pushdown_enabled(), "Wrote table");
        Ok(())
    }
}

/// Encode straight into the native file at `native`.
///
/// Exclusive writes create the target and remove it again if encoding fails.
/// Overwrites encode into a sibling temporary file that is renamed over the
/// target only on success, so a failed encode leaves prior content intact.
fn write_native<F>(
    codec: &dyn TableFormat,
    native: &Path,
    storage_path: &str,
    overwrite: bool,
    encode: F,
) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let target = if overwrite {
        temp_sibling(native, storage_path)?
    } else {
        native.to_path_buf()
    };

    let mut open = OpenOptions::new();
    open.write(true);
    if overwrite {
        open.create(true).truncate(true);
    } else {
        open.create_new(true);
    }
    let file = open.open(&target).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => TroveError::access(
            format!("Cannot create {storage_path}: parent directory does not exist"),
            e,
        ),
        _ => TroveError::from_io(e, storage_path),
    })?;

    let mut writer = BufWriter::new(file);
    let written = encode(&mut writer).and_then(|()| {
        writer
            .flush()
            .map_err(|e| TroveError::from_io(e, storage_path))
    });
    drop(writer);

    if let Err(err) = written {
        if let Err(cleanup) = fs::remove_file(&target) {
            warn!(path = %storage_path, error = %cleanup, "Failed to clean up after {} encode error", codec.name());
        }
        return Err(err);
    }

    if overwrite {
        fs::rename(&target, native).map_err(|e| {
            let _ = fs::remove_file(&target);
            TroveError::access(format!("Failed to replace {storage_path}"), e)
        })?;
    }
    Ok(())
}

/// Temporary path next to `native`, in the same directory so the final rename
/// stays on one filesystem.
fn temp_sibling(native: &Path, storage_path: &str) -> Result<PathBuf> {
    let name = native
        .file_name()
        .ok_or_else(|| TroveError::access_msg(format!("Invalid table path [{storage_path}]")))?;
    let mut temp_name = std::ffi::OsString::from(".");
    temp_name.push(name);
    temp_name.push(".trove-tmp");
    Ok(native.with_file_name(temp_name))
}

/// Run synchronous codec work on the blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TroveError::Internal {
            message: format!("Blocking task panicked: {e}"),
        })?
}
