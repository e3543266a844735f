//! Integration test: configured storage end to end.
//!
//! config → manager → file and table operations through named storage.

use std::sync::Arc;

use arrow::array::{Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;

use trove_core::config::SystemConfig;
use trove_core::types::{FieldDef, FormatOptions, TableSchema};
use trove_core::TroveError;
use trove_storage::{register_builtin_storage_types, StorageManager};

/// Build a manager with one "primary" location rooted at `root`.
fn start_manager(root: &std::path::Path) -> StorageManager {
    register_builtin_storage_types();
    let config = SystemConfig::from_json_str(
        &serde_json::json!({
            "storage": {
                "primary": {
                    "storage_type": "LOCAL_STORAGE",
                    "storage_config": {"root_path": root.display().to_string()}
                }
            }
        })
        .to_string(),
    )
    .expect("Config should parse");
    StorageManager::new(&config).expect("Manager should start")
}

fn people() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, false),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(vec![1, 2])),
            Arc::new(StringArray::from(vec!["ada", "grace"])),
        ],
    )
    .unwrap()
}

#[tokio::test]
async fn test_primary_write_stat_read() {
    let tmp = tempfile::TempDir::new().unwrap();
    let manager = start_manager(tmp.path());

    let files = manager.get_file_storage("primary").unwrap();
    files
        .write_bytes("a.txt", Bytes::from_static(b"hello"), false)
        .await
        .unwrap();

    assert!(files.exists("a.txt").await.unwrap());
    assert_eq!(files.size("a.txt").await.unwrap(), 5);
    assert_eq!(
        files.read_bytes("a.txt").await.unwrap(),
        Bytes::from_static(b"hello")
    );
    // Lands under the configured root
    assert_eq!(std::fs::read(tmp.path().join("a.txt")).unwrap(), b"hello");
}

#[tokio::test]
async fn test_projected_csv_table() {
    let tmp = tempfile::TempDir::new().unwrap();
    let manager = start_manager(tmp.path());
    let tables = manager.get_data_storage("primary").unwrap();
    let files = manager.get_file_storage("primary").unwrap();

    let schema = TableSchema::new(vec![FieldDef::new("id", "int64")]);
    tables
        .write_table(&schema, &people(), "t.csv", "csv", &FormatOptions::new(), false)
        .await
        .unwrap();

    let text = files
        .read_text("t.csv", Default::default())
        .await
        .unwrap();
    assert_eq!(text, "id\n1\n2\n");

    let batch = tables
        .read_table(&schema, "t.csv", "csv", &FormatOptions::new())
        .await
        .unwrap();
    assert_eq!(batch.num_columns(), 1);
    assert_eq!(batch.schema().field(0).name(), "id");
    let ids = batch
        .column(0)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids.value(0), 1);
    assert_eq!(ids.value(1), 2);
}

#[tokio::test]
async fn test_missing_storage_key() {
    let tmp = tempfile::TempDir::new().unwrap();
    let manager = start_manager(tmp.path());

    assert!(!manager.has_file_storage("missing"));
    match manager.get_file_storage("missing") {
        Err(TroveError::KeyNotFound { key }) => assert_eq!(key, "missing"),
        Err(other) => panic!("Expected KeyNotFound, got {other}"),
        Ok(_) => panic!("Expected KeyNotFound, got a storage"),
    }
    assert!(matches!(
        manager.get_data_storage("missing"),
        Err(TroveError::KeyNotFound { .. })
    ));
}

#[tokio::test]
async fn test_unregistered_format() {
    let tmp = tempfile::TempDir::new().unwrap();
    let manager = start_manager(tmp.path());
    let tables = manager.get_data_storage("primary").unwrap();

    let err = tables
        .write_table(
            &TableSchema::all_columns(),
            &people(),
            "t.avro",
            "avro",
            &FormatOptions::new(),
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TroveError::StorageConfig { .. }));

    let files = manager.get_file_storage("primary").unwrap();
    assert!(!files.exists("t.avro").await.unwrap());
}

#[tokio::test]
async fn test_ls_through_manager() {
    let tmp = tempfile::TempDir::new().unwrap();
    let manager = start_manager(tmp.path());
    let files = manager.get_file_storage("primary").unwrap();

    files.mkdir("d/e", true, false).await.unwrap();
    files
        .write_bytes("d/x.bin", Bytes::from_static(&[0, 1]), false)
        .await
        .unwrap();
    files
        .write_bytes("d/e/y.bin", Bytes::from_static(&[2]), false)
        .await
        .unwrap();

    assert_eq!(files.ls("d").await.unwrap(), vec!["d/e", "d/x.bin"]);
}

#[tokio::test]
async fn test_parquet_table_via_manager() {
    let tmp = tempfile::TempDir::new().unwrap();
    let manager = start_manager(tmp.path());
    let tables = manager.get_data_storage("primary").unwrap();

    let mut options = FormatOptions::new();
    options.insert("compression".into(), "snappy".into());
    tables
        .write_table(
            &TableSchema::all_columns(),
            &people(),
            "people.parquet",
            "PARQUET",
            &options,
            false,
        )
        .await
        .unwrap();

    let schema = TableSchema::new(vec![FieldDef::new("name", "string")]);
    let batch = tables
        .read_table(&schema, "people.parquet", "parquet", &FormatOptions::new())
        .await
        .unwrap();
    let names = batch
        .column(0)
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(batch.num_columns(), 1);
    assert_eq!(names.value(1), "grace");
}

#[test]
fn test_unknown_storage_type_fails_construction() {
    register_builtin_storage_types();
    let config = SystemConfig::from_json_str(
        r#"{"storage": {"remote": {"storage_type": "S3_STORAGE", "storage_config": {}}}}"#,
    )
    .unwrap();
    match StorageManager::new(&config) {
        Err(TroveError::StorageConfig { message }) => {
            assert!(message.contains("S3_STORAGE"));
            assert!(message.contains("remote"));
        }
        Err(other) => panic!("Expected StorageConfig, got {other}"),
        Ok(_) => panic!("Expected construction to fail"),
    }
}
