//! Trove core types, traits, configuration, and errors.
//!
//! This crate provides the foundational building blocks for the Trove storage
//! layer: the backend-neutral [`FileStat`] descriptor, the [`FileStorage`] and
//! [`DataStorage`] traits, scoped stream handles, storage configuration
//! records, and the unified error type.

pub mod config;
pub mod error;
pub mod path;
pub mod storage;
pub mod stream;
pub mod types;

pub use config::{StorageConfig, SystemConfig};
pub use error::TroveError;
pub use storage::{DataStorage, FileStorage};
pub use stream::{ByteReadStream, ByteWriteStream, TextReadStream, TextWriteStream};
pub use types::*;

/// Convenience Result type using [`TroveError`].
pub type Result<T> = std::result::Result<T, TroveError>;
