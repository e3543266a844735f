//! Unified error types for Trove.
//!
//! All errors in Trove are represented by [`TroveError`], using `thiserror`
//! for ergonomic error definitions. Library code never uses `unwrap()`;
//! all fallible operations return `Result<T, TroveError>`.

use std::io;

use thiserror::Error;

/// The unified error type for all Trove storage operations.
#[derive(Error, Debug)]
pub enum TroveError {
    /// The operation required an existing path, but nothing is there.
    #[error("Not found: {path}")]
    NotFound {
        /// The storage path that was not found.
        path: String,
    },

    /// An exclusive create (write or mkdir) targeted a path that already exists.
    #[error("Already exists: {path}")]
    AlreadyExists {
        /// The storage path that already exists.
        path: String,
    },

    /// A backend I/O operation failed for a reason not classified above.
    #[error("Storage access error: {message}")]
    StorageAccess {
        /// Human-readable description of the failure.
        message: String,
        /// The underlying error, if available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A format or storage type is not registered, or configuration is invalid.
    #[error("Storage configuration error: {message}")]
    StorageConfig {
        /// Description of the configuration problem.
        message: String,
    },

    /// The backend does not implement the requested operation.
    #[error("Unsupported: {message}")]
    Unsupported {
        /// Description of the unsupported operation.
        message: String,
    },

    /// No storage is configured under the requested key.
    #[error("Storage key not found: {key}")]
    KeyNotFound {
        /// The storage key that was requested.
        key: String,
    },

    /// An internal error (bug).
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl TroveError {
    /// Create a storage access error from a message and source error.
    pub fn access(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::StorageAccess {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a storage access error from a message only.
    pub fn access_msg(message: impl Into<String>) -> Self {
        Self::StorageAccess {
            message: message.into(),
            source: None,
        }
    }

    /// Create a storage configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::StorageConfig {
            message: message.into(),
        }
    }

    /// Classify an I/O error raised while operating on `path`.
    ///
    /// `NotFound` and `AlreadyExists` keep their meaning; every other kind
    /// becomes [`TroveError::StorageAccess`] with the path in the message.
    pub fn from_io(err: io::Error, path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound {
                path: path.to_string(),
            },
            io::ErrorKind::AlreadyExists => Self::AlreadyExists {
                path: path.to_string(),
            },
            _ => Self::access(format!("I/O failure on {path}"), err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_not_found() {
        let err = TroveError::from_io(io::Error::from(io::ErrorKind::NotFound), "a/b.txt");
        assert!(matches!(err, TroveError::NotFound { ref path } if path == "a/b.txt"));
        assert_eq!(err.to_string(), "Not found: a/b.txt");
    }

    #[test]
    fn test_from_io_already_exists() {
        let err = TroveError::from_io(io::Error::from(io::ErrorKind::AlreadyExists), "x.csv");
        assert!(matches!(err, TroveError::AlreadyExists { .. }));
    }

    #[test]
    fn test_from_io_other_is_storage_access() {
        let err = TroveError::from_io(
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
            "locked.bin",
        );
        match err {
            TroveError::StorageAccess { message, source } => {
                assert!(message.contains("locked.bin"));
                assert!(source.is_some());
            }
            other => panic!("Expected StorageAccess, got {other:?}"),
        }
    }

    #[test]
    fn test_config_error_display() {
        let err = TroveError::config("Requested storage format [avro] is not available");
        assert_eq!(
            err.to_string(),
            "Storage configuration error: Requested storage format [avro] is not available"
        );
    }

    #[test]
    fn test_key_not_found_display() {
        let err = TroveError::KeyNotFound {
            key: "missing".into(),
        };
        assert_eq!(err.to_string(), "Storage key not found: missing");
    }
}
