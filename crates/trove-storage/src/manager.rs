//! Storage type registry and the storage manager.
//!
//! Backends are bound to a storage-type tag in a [`StorageTypeRegistry`] by an
//! explicit call during startup. The [`StorageManager`] then builds one
//! [`FileStorage`] and one [`DataStorage`] per named storage location in the
//! system configuration and hands them out by storage key.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::{debug, info, warn};

use trove_core::config::{StorageConfig, SystemConfig};
use trove_core::error::TroveError;
use trove_core::storage::{DataStorage, FileStorage};
use trove_core::Result;

/// Builds the file storage for one configured location.
pub type FileStorageFactory =
    Arc<dyn Fn(&StorageConfig) -> Result<Arc<dyn FileStorage>> + Send + Sync>;

/// Builds the table storage for one configured location from its file storage.
pub type DataStorageFactory =
    Arc<dyn Fn(&StorageConfig, Arc<dyn FileStorage>) -> Result<Arc<dyn DataStorage>> + Send + Sync>;

#[derive(Clone)]
struct StorageTypeBinding {
    file_factory: FileStorageFactory,
    data_factory: DataStorageFactory,
}

/// Maps storage-type tags to backend factories.
#[derive(Clone, Default)]
pub struct StorageTypeRegistry {
    bindings: HashMap<String, StorageTypeBinding>,
}

impl StorageTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in storage type bound.
    pub fn with_builtin_types() -> Self {
        let mut registry = Self::new();
        crate::local::register_local_storage(&mut registry);
        registry
    }

    /// Bind a storage type. Re-registering a tag replaces the earlier binding.
    pub fn register<F, D>(&mut self, storage_type: &str, file_factory: F, data_factory: D)
    where
        F: Fn(&StorageConfig) -> Result<Arc<dyn FileStorage>> + Send + Sync + 'static,
        D: Fn(&StorageConfig, Arc<dyn FileStorage>) -> Result<Arc<dyn DataStorage>>
            + Send
            + Sync
            + 'static,
    {
        let binding = StorageTypeBinding {
            file_factory: Arc::new(file_factory),
            data_factory: Arc::new(data_factory),
        };
        if self.bindings.insert(storage_type.to_string(), binding).is_some() {
            warn!(storage_type, "Storage type registered again, replacing earlier binding");
        } else {
            debug!(storage_type, "Registered storage type");
        }
    }

    pub fn contains(&self, storage_type: &str) -> bool {
        self.bindings.contains_key(storage_type)
    }

    /// Registered storage-type tags, sorted.
    pub fn storage_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.bindings.keys().cloned().collect();
        types.sort();
        types
    }

    fn binding(&self, storage_type: &str) -> Option<&StorageTypeBinding> {
        self.bindings.get(storage_type)
    }
}

impl fmt::Debug for StorageTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageTypeRegistry")
            .field("storage_types", &self.storage_types())
            .finish()
    }
}

/// The process-wide storage type registry.
pub fn global_registry() -> &'static RwLock<StorageTypeRegistry> {
    static GLOBAL: OnceLock<RwLock<StorageTypeRegistry>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(StorageTypeRegistry::new()))
}

/// Bind a storage type in the process-wide registry.
///
/// Call during startup, before any [`StorageManager::new`].
pub fn register_storage_type<F, D>(storage_type: &str, file_factory: F, data_factory: D)
where
    F: Fn(&StorageConfig) -> Result<Arc<dyn FileStorage>> + Send + Sync + 'static,
    D: Fn(&StorageConfig, Arc<dyn FileStorage>) -> Result<Arc<dyn DataStorage>>
        + Send
        + Sync
        + 'static,
{
    global_registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(storage_type, file_factory, data_factory);
}

/// Bind every built-in storage type in the process-wide registry.
pub fn register_builtin_storage_types() {
    let mut registry = global_registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    crate::local::register_local_storage(&mut registry);
    info!(storage_types = ?registry.storage_types(), "Built-in storage types registered");
}

/// Directory of the configured storage locations.
///
/// Construction either builds every configured location or fails; there is
/// no partially initialised manager.
pub struct StorageManager {
    file_storage: HashMap<String, Arc<dyn FileStorage>>,
    data_storage: HashMap<String, Arc<dyn DataStorage>>,
}

impl StorageManager {
    /// Build every configured storage location using the process-wide registry.
    pub fn new(config: &SystemConfig) -> Result<Self> {
        let registry = global_registry()
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Self::with_registry(config, &registry)
    }

    /// Build every configured storage location using an explicit registry.
    pub fn with_registry(config: &SystemConfig, registry: &StorageTypeRegistry) -> Result<Self> {
        let mut file_storage = HashMap::new();
        let mut data_storage = HashMap::new();

        let mut keys: Vec<&String> = config.storage.keys().collect();
        keys.sort();

        for storage_key in keys {
            let storage_config = &config.storage[storage_key];
            let (files, data) = create_storage(registry, storage_key, storage_config)?;
            file_storage.insert(storage_key.clone(), files);
            data_storage.insert(storage_key.clone(), data);
        }

        info!(locations = file_storage.len(), "Storage manager initialised");
        Ok(Self {
            file_storage,
            data_storage,
        })
    }

    pub fn has_file_storage(&self, storage_key: &str) -> bool {
        self.file_storage.contains_key(storage_key)
    }

    pub fn get_file_storage(&self, storage_key: &str) -> Result<Arc<dyn FileStorage>> {
        self.file_storage
            .get(storage_key)
            .cloned()
            .ok_or_else(|| TroveError::KeyNotFound {
                key: storage_key.to_string(),
            })
    }

    pub fn has_data_storage(&self, storage_key: &str) -> bool {
        self.data_storage.contains_key(storage_key)
    }

    pub fn get_data_storage(&self, storage_key: &str) -> Result<Arc<dyn DataStorage>> {
        self.data_storage
            .get(storage_key)
            .cloned()
            .ok_or_else(|| TroveError::KeyNotFound {
                key: storage_key.to_string(),
            })
    }

    /// Configured storage keys, sorted.
    pub fn storage_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.file_storage.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageManager")
            .field("storage_keys", &self.storage_keys())
            .finish()
    }
}

fn create_storage(
    registry: &StorageTypeRegistry,
    storage_key: &str,
    storage_config: &StorageConfig,
) -> Result<(Arc<dyn FileStorage>, Arc<dyn DataStorage>)> {
    let storage_type = &storage_config.storage_type;
    let binding = registry.binding(storage_type).ok_or_else(|| {
        TroveError::config(format!(
            "Storage type [{storage_type}] for storage [{storage_key}] is not available"
        ))
    })?;

    let files = (binding.file_factory)(storage_config)?;
    let data = (binding.data_factory)(storage_config, files.clone())?;

    debug!(storage_key, storage_type = %storage_type, "Created storage");
    Ok((files, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LOCAL_STORAGE;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use trove_core::config::ROOT_PATH_OPTION;

    fn local_config(dir: &TempDir) -> StorageConfig {
        StorageConfig::new(LOCAL_STORAGE)
            .with_option(ROOT_PATH_OPTION, dir.path().to_string_lossy())
    }

    #[test]
    fn test_builtin_registry_has_local() {
        let registry = StorageTypeRegistry::with_builtin_types();
        assert!(registry.contains(LOCAL_STORAGE));
        assert_eq!(registry.storage_types(), vec![LOCAL_STORAGE.to_string()]);
    }

    #[test]
    fn test_manager_builds_configured_locations() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let config = SystemConfig::new()
            .with_storage("primary", local_config(&a))
            .with_storage("archive", local_config(&b));

        let manager =
            StorageManager::with_registry(&config, &StorageTypeRegistry::with_builtin_types())
                .unwrap();
        assert_eq!(manager.storage_keys(), vec!["archive", "primary"]);
        assert!(manager.has_file_storage("primary"));
        assert!(manager.has_data_storage("archive"));
        assert!(manager.get_file_storage("primary").is_ok());
        assert!(manager.get_data_storage("archive").is_ok());
    }

    #[test]
    fn test_missing_key_lookup() {
        let manager = StorageManager::with_registry(
            &SystemConfig::new(),
            &StorageTypeRegistry::with_builtin_types(),
        )
        .unwrap();
        assert!(!manager.has_file_storage("missing"));
        assert!(!manager.has_data_storage("missing"));
        assert!(matches!(
            manager.get_file_storage("missing"),
            Err(TroveError::KeyNotFound { ref key }) if key == "missing"
        ));
        assert!(matches!(
            manager.get_data_storage("missing"),
            Err(TroveError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn test_unknown_storage_type_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = SystemConfig::new()
            .with_storage("good", local_config(&dir))
            .with_storage("bad", StorageConfig::new("HDFS_STORAGE"));

        match StorageManager::with_registry(&config, &StorageTypeRegistry::with_builtin_types()) {
            Err(TroveError::StorageConfig { message }) => {
                assert!(message.contains("HDFS_STORAGE"));
                assert!(message.contains("bad"));
            }
            other => panic!("Expected StorageConfig error, got {other:?}"),
        }
    }

    #[test]
    fn test_unresolvable_root_is_fatal() {
        let config = SystemConfig::new().with_storage(
            "primary",
            StorageConfig::new(LOCAL_STORAGE).with_option(ROOT_PATH_OPTION, "/nonexistent/trove"),
        );
        let result =
            StorageManager::with_registry(&config, &StorageTypeRegistry::with_builtin_types());
        assert!(matches!(result, Err(TroveError::StorageConfig { .. })));
    }

    #[test]
    fn test_reregistration_last_wins() {
        let first_calls = Arc::new(AtomicUsize::new(0));
        let second_calls = Arc::new(AtomicUsize::new(0));

        let mut registry = StorageTypeRegistry::new();
        for counter in [first_calls.clone(), second_calls.clone()] {
            registry.register(
                "COUNTING",
                move |config| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let storage: Arc<dyn FileStorage> =
                        Arc::new(crate::local::LocalFileStorage::from_config(config)?);
                    Ok(storage)
                },
                |config, files| {
                    let storage: Arc<dyn DataStorage> = Arc::new(
                        crate::common::CommonDataStorage::new(
                            config,
                            files,
                            crate::format::builtin_formats(),
                            false,
                        )?,
                    );
                    Ok(storage)
                },
            );
        }
        assert_eq!(registry.storage_types(), vec!["COUNTING"]);

        let dir = TempDir::new().unwrap();
        let mut storage_config = local_config(&dir);
        storage_config.storage_type = "COUNTING".into();
        let config = SystemConfig::new().with_storage("counted", storage_config);
        StorageManager::with_registry(&config, &registry).unwrap();

        assert_eq!(first_calls.load(Ordering::SeqCst), 0);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_data_factory_receives_file_storage() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_factory = seen.clone();

        let mut registry = StorageTypeRegistry::with_builtin_types();
        registry.register(
            "WRAPPED",
            |config| {
                let storage: Arc<dyn FileStorage> =
                    Arc::new(crate::local::LocalFileStorage::from_config(config)?);
                Ok(storage)
            },
            move |config, files| {
                seen_in_factory.fetch_add(Arc::strong_count(&files), Ordering::SeqCst);
                let storage: Arc<dyn DataStorage> = Arc::new(
                    crate::common::CommonDataStorage::new(
                        config,
                        files,
                        crate::format::builtin_formats(),
                        true,
                    )?,
                );
                Ok(storage)
            },
        );

        let dir = TempDir::new().unwrap();
        let mut storage_config = local_config(&dir);
        storage_config.storage_type = "WRAPPED".into();
        let manager =
            StorageManager::with_registry(&SystemConfig::new().with_storage("w", storage_config), &registry)
                .unwrap();

        // The handle passed in plus the one kept for the file storage map.
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(manager.has_data_storage("w"));
    }
}
