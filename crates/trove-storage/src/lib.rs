//! Storage backends, table formats and the storage manager for Trove.
//!
//! - [`LocalFileStorage`]: filesystem-backed [`FileStorage`](trove_core::FileStorage)
//! - [`CommonDataStorage`]: table reads and writes over any file storage, with
//!   native-file pushdown where the backend allows it
//! - [`format`]: the table format registry and the CSV and Parquet codecs
//! - [`StorageManager`]: the directory of configured storage locations

pub mod common;
pub mod format;
pub mod local;
pub mod manager;

pub use common::CommonDataStorage;
pub use format::{builtin_formats, FormatRegistry, TableFormat, TableSource};
pub use local::{LocalFileStorage, LOCAL_STORAGE};
pub use manager::{
    global_registry, register_builtin_storage_types, register_storage_type, StorageManager,
    StorageTypeRegistry,
};
