//! Table format plugins and the format registry.
//!
//! A [`TableFormat`] converts between serialized bytes and an Arrow
//! [`RecordBatch`]. Codecs are synchronous; callers on the async path run
//! them inside `spawn_blocking`. A codec reads from a [`TableSource`], which
//! is either a native file (pushdown) or a buffer filled from a storage
//! stream, so formats with random-access readers can use the file directly.

pub mod csv;
pub mod parquet;

use std::collections::HashMap;
use std::io::Write;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use tracing::debug;

use trove_core::error::TroveError;
use trove_core::types::{FormatOptions, TableSchema};
use trove_core::Result;

pub use self::csv::{CsvFormat, CsvOptions};
pub use self::parquet::{ParquetFormat, ParquetOptions};

/// Where a codec reads its input from.
pub enum TableSource {
    /// A native file opened on the pushdown path.
    Native(std::fs::File),
    /// Content buffered from a storage stream.
    Buffered(Bytes),
}

impl TableSource {
    /// Whether the source holds no data at all.
    pub fn is_empty(&self) -> Result<bool> {
        match self {
            Self::Native(file) => file
                .metadata()
                .map(|m| m.len() == 0)
                .map_err(|e| TroveError::access("Failed to stat table source", e)),
            Self::Buffered(bytes) => Ok(bytes.is_empty()),
        }
    }
}

/// A codec for one table serialization format.
pub trait TableFormat: Send + Sync {
    /// Lower-case format name used for registry lookups.
    fn name(&self) -> &str;

    /// Whether the format is binary. Text formats go through text streams.
    fn is_binary(&self) -> bool;

    /// Decode a table, projecting the schema's fields when it declares any.
    fn decode(
        &self,
        source: TableSource,
        schema: &TableSchema,
        options: &FormatOptions,
    ) -> Result<RecordBatch>;

    /// Encode a table, writing only the schema's fields when it declares any.
    fn encode(
        &self,
        sink: &mut (dyn Write + Send),
        schema: &TableSchema,
        batch: &RecordBatch,
        options: &FormatOptions,
    ) -> Result<()>;
}

/// Maps lower-cased format names to codecs.
#[derive(Clone, Default)]
pub struct FormatRegistry {
    formats: HashMap<String, Arc<dyn TableFormat>>,
}

impl FormatRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in `csv` and `parquet` formats.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CsvFormat));
        registry.register(Arc::new(ParquetFormat));
        registry
    }

    /// Add a format, replacing any format registered under the same name.
    pub fn register(&mut self, format: Arc<dyn TableFormat>) {
        let name = format.name().to_lowercase();
        debug!(format = %name, "Registered table format");
        self.formats.insert(name, format);
    }

    /// Look up a format by name, case-insensitively.
    pub fn get(&self, name: &str) -> Result<Arc<dyn TableFormat>> {
        self.formats
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| {
                TroveError::config(format!("Requested storage format [{name}] is not available"))
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.formats.contains_key(&name.to_lowercase())
    }

    /// Registered format names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.formats.keys().cloned().collect();
        names.sort();
        names
    }
}

/// The shared registry of built-in formats.
pub fn builtin_formats() -> Arc<FormatRegistry> {
    static BUILTIN: OnceLock<Arc<FormatRegistry>> = OnceLock::new();
    BUILTIN
        .get_or_init(|| Arc::new(FormatRegistry::builtin()))
        .clone()
}

/// Parse an optional typed value from a format option map.
pub(crate) fn parse_option<T: FromStr>(
    options: &FormatOptions,
    format: &str,
    key: &str,
) -> Result<Option<T>> {
    match options.get(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            TroveError::config(format!(
                "Invalid value [{raw}] for {format} option [{key}]"
            ))
        }),
    }
}

/// Parse an optional single-byte option such as a delimiter.
pub(crate) fn parse_byte_option(
    options: &FormatOptions,
    format: &str,
    key: &str,
) -> Result<Option<u8>> {
    match options.get(key) {
        None => Ok(None),
        Some(raw) => {
            let value = match raw.as_str() {
                "\\t" | "tab" => "\t",
                other => other,
            };
            match value.as_bytes() {
                [byte] => Ok(Some(*byte)),
                _ => Err(TroveError::config(format!(
                    "Invalid value [{raw}] for {format} option [{key}]: expected a single character"
                ))),
            }
        }
    }
}

/// Parse a boolean option, accepting `true/false`, `yes/no` and `1/0`.
pub(crate) fn parse_bool_option(
    options: &FormatOptions,
    format: &str,
    key: &str,
) -> Result<Option<bool>> {
    match options.get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(None),
        Some(v) => match v.as_str() {
            "true" | "yes" | "1" => Ok(Some(true)),
            "false" | "no" | "0" => Ok(Some(false)),
            _ => Err(TroveError::config(format!(
                "Invalid value [{v}] for {format} option [{key}]: expected a boolean"
            ))),
        },
    }
}

/// Log option keys a format does not recognise.
pub(crate) fn log_unknown_options(options: &FormatOptions, format: &str, known: &[&str]) {
    for key in options.keys().filter(|k| !known.contains(&k.as_str())) {
        debug!(format, option = %key, "Ignoring unrecognised format option");
    }
}

/// Column indices of the schema's fields within `batch`, or `None` for all columns.
pub(crate) fn projection_indices(
    schema: &TableSchema,
    batch: &RecordBatch,
) -> Result<Option<Vec<usize>>> {
    let Some(names) = schema.field_names() else {
        return Ok(None);
    };
    let batch_schema = batch.schema();
    names
        .iter()
        .map(|name| {
            batch_schema.index_of(name).map_err(|_| {
                TroveError::access_msg(format!("Column [{name}] is not present in the table"))
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

/// Restrict `batch` to the schema's fields, in schema order.
pub(crate) fn project_batch(schema: &TableSchema, batch: &RecordBatch) -> Result<RecordBatch> {
    match projection_indices(schema, batch)? {
        None => Ok(batch.clone()),
        Some(indices) => batch
            .project(&indices)
            .map_err(|e| TroveError::access("Failed to project table columns", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use trove_core::types::FieldDef;

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec!["a", "b"])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_builtin_lookup_is_case_insensitive() {
        let registry = FormatRegistry::builtin();
        assert_eq!(registry.get("CSV").unwrap().name(), "csv");
        assert_eq!(registry.get("Parquet").unwrap().name(), "parquet");
        assert_eq!(registry.names(), vec!["csv", "parquet"]);
    }

    #[test]
    fn test_unregistered_format_is_config_error() {
        let registry = FormatRegistry::new();
        match registry.get("parquet") {
            Err(TroveError::StorageConfig { message }) => assert!(message.contains("parquet")),
            Err(other) => panic!("Expected StorageConfig, got {other:?}"),
            Ok(_) => panic!("Expected StorageConfig, got a format"),
        }
    }

    #[test]
    fn test_parse_options() {
        let mut options = FormatOptions::new();
        options.insert("delimiter".into(), "\\t".into());
        options.insert("header".into(), "No".into());
        options.insert("batch_size".into(), "128".into());

        assert_eq!(
            parse_byte_option(&options, "csv", "delimiter").unwrap(),
            Some(b'\t')
        );
        assert_eq!(
            parse_bool_option(&options, "csv", "header").unwrap(),
            Some(false)
        );
        assert_eq!(
            parse_option::<usize>(&options, "csv", "batch_size").unwrap(),
            Some(128)
        );
        assert_eq!(parse_byte_option(&options, "csv", "quote").unwrap(), None);
    }

    #[test]
    fn test_parse_invalid_options() {
        let mut options = FormatOptions::new();
        options.insert("delimiter".into(), ";;".into());
        options.insert("header".into(), "maybe".into());
        options.insert("batch_size".into(), "-3".into());

        assert!(parse_byte_option(&options, "csv", "delimiter").is_err());
        assert!(parse_bool_option(&options, "csv", "header").is_err());
        assert!(parse_option::<usize>(&options, "csv", "batch_size").is_err());
    }

    #[test]
    fn test_project_batch() {
        let schema = TableSchema::new(vec![FieldDef::new("name", "string")]);
        let projected = project_batch(&schema, &batch()).unwrap();
        assert_eq!(projected.num_columns(), 1);
        assert_eq!(projected.schema().field(0).name(), "name");

        let all = project_batch(&TableSchema::all_columns(), &batch()).unwrap();
        assert_eq!(all.num_columns(), 2);
    }

    #[test]
    fn test_project_batch_missing_column() {
        let schema = TableSchema::new(vec![FieldDef::new("missing", "string")]);
        let err = project_batch(&schema, &batch()).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
