//! Filesystem-backed storage rooted at a local directory.
//!
//! [`LocalFileStorage`] implements the [`FileStorage`] trait on top of
//! `tokio::fs`. Exclusive-create writes use `OpenOptions::create_new(true)`
//! which maps to `O_CREAT | O_EXCL` on POSIX systems, so concurrent writers
//! racing on one path see exactly one winner.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, instrument};

use trove_core::config::{StorageConfig, ROOT_PATH_OPTION};
use trove_core::error::TroveError;
use trove_core::path::{is_root, resolve_native, to_storage_path};
use trove_core::storage::{DataStorage, FileStorage};
use trove_core::stream::{ByteReadStream, ByteWriteStream};
use trove_core::types::{FileStat, FileType};
use trove_core::Result;

use crate::common::CommonDataStorage;
use crate::format::builtin_formats;
use crate::manager::StorageTypeRegistry;

/// Storage type tag for local filesystem storage.
pub const LOCAL_STORAGE: &str = "LOCAL_STORAGE";

/// Options recognised by local storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalStorageOptions {
    /// Root directory; must already exist.
    pub root_path: PathBuf,
}

impl LocalStorageOptions {
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let root_path = config.required_option(ROOT_PATH_OPTION)?;
        Ok(Self {
            root_path: PathBuf::from(root_path),
        })
    }

    /// Canonicalise the root directory. It must exist and be a directory.
    pub fn resolve_root(&self) -> Result<PathBuf> {
        let root = std::fs::canonicalize(&self.root_path).map_err(|e| {
            TroveError::config(format!(
                "Storage root {} cannot be resolved: {e}",
                self.root_path.display()
            ))
        })?;
        if !root.is_dir() {
            return Err(TroveError::config(format!(
                "Storage root {} is not a directory",
                root.display()
            )));
        }
        Ok(root)
    }
}

/// A [`FileStorage`] backed by the local filesystem.
///
/// All storage paths are mapped to native paths under the resolved root,
/// which is fixed at construction.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    /// Create a new `LocalFileStorage` rooted at an existing directory.
    pub fn new(root_path: impl AsRef<Path>) -> Result<Self> {
        let options = LocalStorageOptions {
            root_path: root_path.as_ref().to_path_buf(),
        };
        let root = options.resolve_root()?;
        debug!(root = %root.display(), "LocalFileStorage initialised");
        Ok(Self { root })
    }

    /// Create a `LocalFileStorage` from a storage configuration entry.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let options = LocalStorageOptions::from_config(config)?;
        Self::new(options.root_path)
    }

    /// The resolved root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the native filesystem path for a storage path.
    pub fn native_path(&self, path: &str) -> Result<PathBuf> {
        resolve_native(&self.root, path)
    }

    async fn open_for_write(&self, path: &str, overwrite: bool) -> Result<fs::File> {
        let native = self.native_path(path)?;
        let mut options = fs::OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        options.open(&native).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TroveError::access(
                format!("Cannot create {path}: parent directory does not exist"),
                e,
            ),
            _ => TroveError::from_io(e, path),
        })
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    #[instrument(skip(self), fields(path = %path))]
    async fn exists(&self, path: &str) -> Result<bool> {
        let native = self.native_path(path)?;
        let exists = fs::metadata(&native).await.is_ok();
        debug!("exists {} → {}", path, exists);
        Ok(exists)
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn stat(&self, path: &str) -> Result<FileStat> {
        let native = self.native_path(path)?;
        let metadata = fs::metadata(&native)
            .await
            .map_err(|e| TroveError::from_io(e, path))?;
        Ok(stat_from_metadata(&metadata))
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn ls(&self, path: &str) -> Result<Vec<String>> {
        let native = self.native_path(path)?;
        let is_dir = fs::metadata(&native)
            .await
            .map(|m| m.is_dir())
            .map_err(|e| TroveError::from_io(e, path))?;
        if !is_dir {
            return Err(TroveError::NotFound {
                path: path.to_string(),
            });
        }

        let mut entries = fs::read_dir(&native)
            .await
            .map_err(|e| TroveError::from_io(e, path))?;

        let mut children = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| TroveError::access(format!("Failed to read directory entry in {path}"), e))?
        {
            let child = entry.path();
            // Follows symlinks; dangling links and special files are skipped.
            match fs::metadata(&child).await {
                Ok(m) if m.is_file() || m.is_dir() => {
                    children.push(to_storage_path(&self.root, &child)?);
                }
                _ => {}
            }
        }
        children.sort();
        debug!("Listed {} entries in '{}'", children.len(), path);
        Ok(children)
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn mkdir(&self, path: &str, recursive: bool, exists_ok: bool) -> Result<()> {
        let native = self.native_path(path)?;

        if let Ok(metadata) = fs::metadata(&native).await {
            return if exists_ok && metadata.is_dir() {
                Ok(())
            } else {
                Err(TroveError::AlreadyExists {
                    path: path.to_string(),
                })
            };
        }

        let result = if recursive {
            fs::create_dir_all(&native).await
        } else {
            fs::create_dir(&native).await
        };

        match result {
            Ok(()) => {
                debug!("Created directory {}", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && exists_ok => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(TroveError::access(
                format!("Cannot create directory {path}: parent directory does not exist"),
                e,
            )),
            Err(e) => Err(TroveError::from_io(e, path)),
        }
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn rm(&self, path: &str, recursive: bool) -> Result<()> {
        if is_root(path) {
            return Err(TroveError::access_msg("Cannot remove the storage root"));
        }
        let native = self.native_path(path)?;
        let metadata = fs::symlink_metadata(&native)
            .await
            .map_err(|e| TroveError::from_io(e, path))?;

        let result = if metadata.is_dir() {
            if recursive {
                fs::remove_dir_all(&native).await
            } else {
                fs::remove_dir(&native).await
            }
        } else {
            fs::remove_file(&native).await
        };

        result.map_err(|e| TroveError::from_io(e, path))?;
        debug!("Removed {}", path);
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn read_byte_stream(&self, path: &str) -> Result<ByteReadStream> {
        let native = self.native_path(path)?;
        let file = fs::File::open(&native)
            .await
            .map_err(|e| TroveError::from_io(e, path))?;
        Ok(ByteReadStream::new(path, Box::new(file)))
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn write_byte_stream(&self, path: &str, overwrite: bool) -> Result<ByteWriteStream> {
        let file = self.open_for_write(path, overwrite).await?;
        Ok(ByteWriteStream::new(path, Box::new(file)))
    }
}

/// Translate native metadata into a backend-neutral [`FileStat`].
fn stat_from_metadata(metadata: &std::fs::Metadata) -> FileStat {
    let file_type = if metadata.is_file() {
        Some(FileType::File)
    } else if metadata.is_dir() {
        Some(FileType::Directory)
    } else {
        None
    };

    let mut stat = FileStat::new(file_type, metadata.len());
    stat.mtime = metadata.modified().ok().map(to_utc);
    stat.atime = metadata.accessed().ok().map(to_utc);

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        // Inode change time, as reported by stat(2).
        stat.ctime = DateTime::from_timestamp(metadata.ctime(), metadata.ctime_nsec() as u32);
        stat.uid = Some(metadata.uid());
        stat.gid = Some(metadata.gid());
        stat.mode = Some(metadata.mode());
    }

    #[cfg(not(unix))]
    {
        stat.ctime = metadata.created().ok().map(to_utc);
    }

    stat
}

fn to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

/// Register the local storage type: [`LocalFileStorage`] for files and a
/// pushdown-enabled [`CommonDataStorage`] for tables.
pub fn register_local_storage(registry: &mut StorageTypeRegistry) {
    registry.register(
        LOCAL_STORAGE,
        |config| {
            let storage: Arc<dyn FileStorage> = Arc::new(LocalFileStorage::from_config(config)?);
            Ok(storage)
        },
        |config, file_storage| {
            let storage: Arc<dyn DataStorage> = Arc::new(CommonDataStorage::new(
                config,
                file_storage,
                builtin_formats(),
                true,
            )?);
            Ok(storage)
        },
    );
}
