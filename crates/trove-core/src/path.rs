//! Logical storage paths and their resolution to native paths.
//!
//! A storage path is relative and forward-slash separated. The empty path and
//! `"."` both denote the storage root. Absolute paths and `..` segments are
//! rejected so a path can never escape its root.

use std::path::{Component, Path, PathBuf};

use crate::error::TroveError;
use crate::Result;

/// Resolve `storage_path` against `root`, rejecting paths that leave it.
pub fn resolve_native(root: &Path, storage_path: &str) -> Result<PathBuf> {
    let mut resolved = root.to_path_buf();
    for component in Path::new(storage_path).components() {
        match component {
            Component::Normal(segment) => resolved.push(segment),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(TroveError::access_msg(format!(
                    "Invalid storage path [{storage_path}]: must be relative and stay inside the storage root"
                )));
            }
        }
    }
    Ok(resolved)
}

/// Whether `storage_path` denotes the storage root itself.
pub fn is_root(storage_path: &str) -> bool {
    Path::new(storage_path)
        .components()
        .all(|c| matches!(c, Component::CurDir))
}

/// Express a native path below `root` as a forward-slash storage path.
pub fn to_storage_path(root: &Path, native: &Path) -> Result<String> {
    let relative = native.strip_prefix(root).map_err(|e| TroveError::Internal {
        message: format!("Path prefix strip failed: {e}"),
    })?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/"))
}
