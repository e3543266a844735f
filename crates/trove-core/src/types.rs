//! Backend-neutral data types shared by every storage implementation.
//!
//! [`FileStat`] describes a filesystem entry without depending on any one
//! backend's native stat structure. [`TableSchema`] is the read-only field
//! list used to project columns during tabular reads and writes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TroveError;
use crate::Result;

/// Format-specific options forwarded verbatim to a table format codec.
pub type FormatOptions = HashMap<String, String>;

/// The kind of a filesystem entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    File,
    Directory,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileType::File => write!(f, "FILE"),
            FileType::Directory => write!(f, "DIRECTORY"),
        }
    }
}

/// Stat information for a storage entry, independent of the backend.
///
/// Timestamps are held in UTC. Fields a backend cannot supply are `None`;
/// `file_type` is `None` for entries that are neither a regular file nor a
/// directory (sockets, devices, FIFOs).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub file_type: Option<FileType>,
    pub size: u64,

    pub ctime: Option<DateTime<Utc>>,
    pub mtime: Option<DateTime<Utc>>,
    pub atime: Option<DateTime<Utc>>,

    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub mode: Option<u32>,
}

impl FileStat {
    /// A stat record with only the required fields set.
    pub fn new(file_type: Option<FileType>, size: u64) -> Self {
        Self {
            file_type,
            size,
            ctime: None,
            mtime: None,
            atime: None,
            uid: None,
            gid: None,
            mode: None,
        }
    }

    pub fn is_file(&self) -> bool {
        self.file_type == Some(FileType::File)
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == Some(FileType::Directory)
    }
}

/// Character encoding for text reads and writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextEncoding {
    #[default]
    Utf8,
}

impl TextEncoding {
    /// Parse an encoding name such as `"utf-8"`.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            other => Err(TroveError::config(format!(
                "Text encoding [{other}] is not available"
            ))),
        }
    }

    /// Decode raw bytes read from `path` into a string.
    pub fn decode(self, data: Vec<u8>, path: &str) -> Result<String> {
        match self {
            Self::Utf8 => String::from_utf8(data).map_err(|e| {
                TroveError::access(format!("Content of {path} is not valid UTF-8"), e)
            }),
        }
    }

    /// Encode a string for writing.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Utf8 => write!(f, "utf-8"),
        }
    }
}

/// Schema descriptor for a table: an ordered list of named fields.
///
/// An empty field list means "all columns" for both reads and writes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Ordered list of field definitions.
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

/// A single field in a table schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Type string (e.g., "int64", "float64", "string", "boolean", "datetime").
    #[serde(default = "default_data_type")]
    pub data_type: String,
    /// Whether the field can contain null values.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_data_type() -> String {
    "string".to_string()
}

fn default_nullable() -> bool {
    true
}

impl FieldDef {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
        }
    }

    /// The Arrow type for this field's type string.
    pub fn arrow_type(&self) -> DataType {
        type_string_to_arrow(&self.data_type)
    }
}

impl TableSchema {
    pub fn new(fields: Vec<FieldDef>) -> Self {
        Self { fields }
    }

    /// A schema with no fields: read or write every column.
    pub fn all_columns() -> Self {
        Self::default()
    }

    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Field names to project, or `None` when the schema selects all columns.
    pub fn field_names(&self) -> Option<Vec<&str>> {
        if self.fields.is_empty() {
            None
        } else {
            Some(self.fields.iter().map(|f| f.name.as_str()).collect())
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Build an Arrow schema from the declared fields.
    pub fn to_arrow(&self) -> Arc<Schema> {
        let fields: Vec<Field> = self
            .fields
            .iter()
            .map(|f| Field::new(&f.name, f.arrow_type(), f.nullable))
            .collect();
        Arc::new(Schema::new(fields))
    }

    /// Build a table schema describing every field of an Arrow schema.
    pub fn from_arrow(schema: &Schema) -> Self {
        let fields = schema
            .fields()
            .iter()
            .map(|f| FieldDef {
                name: f.name().clone(),
                data_type: arrow_type_to_string(f.data_type()),
                nullable: f.is_nullable(),
            })
            .collect();
        Self { fields }
    }
}

/// Convert a type string to an Arrow DataType.
pub fn type_string_to_arrow(type_str: &str) -> DataType {
    match type_str.to_lowercase().as_str() {
        "int8" => DataType::Int8,
        "int16" => DataType::Int16,
        "int32" => DataType::Int32,
        "int64" | "int" | "integer" => DataType::Int64,
        "uint8" => DataType::UInt8,
        "uint16" => DataType::UInt16,
        "uint32" => DataType::UInt32,
        "uint64" => DataType::UInt64,
        "float32" | "float" => DataType::Float32,
        "float64" | "double" | "decimal" => DataType::Float64,
        "string" | "utf8" | "text" => DataType::Utf8,
        "boolean" | "bool" => DataType::Boolean,
        "datetime" | "timestamp" => DataType::Timestamp(TimeUnit::Microsecond, None),
        "date" => DataType::Date32,
        _ => DataType::Utf8,
    }
}

/// Convert an Arrow DataType to a type string.
pub fn arrow_type_to_string(dt: &DataType) -> String {
    match dt {
        DataType::Int8 => "int8".into(),
        DataType::Int16 => "int16".into(),
        DataType::Int32 => "int32".into(),
        DataType::Int64 => "int64".into(),
        DataType::UInt8 => "uint8".into(),
        DataType::UInt16 => "uint16".into(),
        DataType::UInt32 => "uint32".into(),
        DataType::UInt64 => "uint64".into(),
        DataType::Float32 => "float32".into(),
        DataType::Float64 => "float64".into(),
        DataType::Utf8 | DataType::LargeUtf8 => "string".into(),
        DataType::Boolean => "boolean".into(),
        DataType::Timestamp(_, _) => "datetime".into(),
        DataType::Date32 | DataType::Date64 => "date".into(),
        _ => "string".into(),
    }
}
