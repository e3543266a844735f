//! Parquet table format.
//!
//! Supports projection pushdown (reading only the schema's columns) and
//! writes with a configurable compression codec, LZ4 by default.

use std::io::Write;

use ::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use ::parquet::arrow::{ArrowWriter, ProjectionMask};
use ::parquet::basic::{Compression, ZstdLevel};
use ::parquet::file::properties::WriterProperties;
use ::parquet::file::reader::ChunkReader;
use arrow::record_batch::{RecordBatch, RecordBatchReader};

use trove_core::error::TroveError;
use trove_core::types::{FormatOptions, TableSchema};
use trove_core::Result;

use super::{log_unknown_options, parse_option, project_batch, TableFormat, TableSource};

const FORMAT_NAME: &str = "parquet";

/// Recognised Parquet options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParquetOptions {
    /// Compression codec (`compression`: uncompressed, snappy, lz4, zstd).
    pub compression: Compression,
    /// Rows per decoded batch (`batch_size`).
    pub batch_size: Option<usize>,
}

impl Default for ParquetOptions {
    fn default() -> Self {
        Self {
            compression: Compression::LZ4,
            batch_size: None,
        }
    }
}

impl ParquetOptions {
    const KEYS: [&'static str; 2] = ["compression", "batch_size"];

    pub fn from_options(options: &FormatOptions) -> Result<Self> {
        log_unknown_options(options, FORMAT_NAME, &Self::KEYS);
        let compression = match options.get("compression").map(|c| c.to_ascii_lowercase()) {
            None => Compression::LZ4,
            Some(codec) => match codec.as_str() {
                "uncompressed" | "none" => Compression::UNCOMPRESSED,
                "snappy" => Compression::SNAPPY,
                "lz4" => Compression::LZ4,
                "zstd" => Compression::ZSTD(ZstdLevel::default()),
                other => {
                    return Err(TroveError::config(format!(
                        "Invalid value [{other}] for parquet option [compression]"
                    )))
                }
            },
        };
        Ok(Self {
            compression,
            batch_size: parse_option(options, FORMAT_NAME, "batch_size")?,
        })
    }
}

/// Columnar Parquet tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParquetFormat;

impl ParquetFormat {
    fn decode_from<T: ChunkReader + 'static>(
        &self,
        source: T,
        schema: &TableSchema,
        options: &ParquetOptions,
    ) -> Result<RecordBatch> {
        let mut reader_builder = ParquetRecordBatchReaderBuilder::try_new(source)
            .map_err(|e| TroveError::access("Failed to open Parquet reader", e))?;

        if let Some(batch_size) = options.batch_size {
            reader_builder = reader_builder.with_batch_size(batch_size);
        }

        // Apply projection if specified
        if let Some(names) = schema.field_names() {
            let file_schema = reader_builder.schema().clone();
            let indices = names
                .iter()
                .map(|name| {
                    file_schema.index_of(name).map_err(|_| {
                        TroveError::access_msg(format!(
                            "Column [{name}] is not present in the Parquet data"
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let mask = ProjectionMask::roots(reader_builder.parquet_schema(), indices);
            reader_builder = reader_builder.with_projection(mask);
        }

        let reader = reader_builder
            .build()
            .map_err(|e| TroveError::access("Failed to build Parquet reader", e))?;
        let output_schema = reader.schema();

        let mut batches = Vec::new();
        for batch_result in reader {
            let batch = batch_result
                .map_err(|e| TroveError::access("Failed to read Parquet batch", e))?;
            batches.push(batch);
        }

        let merged = arrow::compute::concat_batches(&output_schema, &batches)
            .map_err(|e| TroveError::access("Failed to concatenate Parquet batches", e))?;

        // Projection masks keep file order; reorder to schema order.
        project_batch(schema, &merged)
    }
}

impl TableFormat for ParquetFormat {
    fn name(&self) -> &str {
        FORMAT_NAME
    }

    fn is_binary(&self) -> bool {
        true
    }

    fn decode(
        &self,
        source: TableSource,
        schema: &TableSchema,
        options: &FormatOptions,
    ) -> Result<RecordBatch> {
        let options = ParquetOptions::from_options(options)?;
        match source {
            TableSource::Native(file) => self.decode_from(file, schema, &options),
            TableSource::Buffered(bytes) => self.decode_from(bytes, schema, &options),
        }
    }

    fn encode(
        &self,
        sink: &mut (dyn Write + Send),
        schema: &TableSchema,
        batch: &RecordBatch,
        options: &FormatOptions,
    ) -> Result<()> {
        let options = ParquetOptions::from_options(options)?;
        let projected = project_batch(schema, batch)?;

        let props = WriterProperties::builder()
            .set_compression(options.compression)
            .build();

        let mut writer = ArrowWriter::try_new(sink, projected.schema(), Some(props))
            .map_err(|e| TroveError::access("Failed to create Parquet writer", e))?;
        writer
            .write(&projected)
            .map_err(|e| TroveError::access("Failed to write Parquet batch", e))?;
        writer
            .close()
            .map_err(|e| TroveError::access("Failed to finalise Parquet file", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::array::{Array, Float64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use bytes::Bytes;
    use trove_core::types::FieldDef;

    fn readings() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("name", DataType::Utf8, false),
            Field::new("value", DataType::Float64, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["alpha", "beta", "gamma"])),
                Arc::new(Float64Array::from(vec![1.0, 2.0, 3.0])),
            ],
        )
        .unwrap()
    }

    fn encode(schema: &TableSchema, options: &FormatOptions) -> Bytes {
        let mut out: Vec<u8> = Vec::new();
        ParquetFormat
            .encode(&mut out, schema, &readings(), options)
            .unwrap();
        Bytes::from(out)
    }

    #[test]
    fn test_round_trip_all_columns() {
        let data = encode(&TableSchema::all_columns(), &FormatOptions::new());
        let batch = ParquetFormat
            .decode(
                TableSource::Buffered(data),
                &TableSchema::all_columns(),
                &FormatOptions::new(),
            )
            .unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.num_columns(), 2);
        let names = batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        let values = batch
            .column(1)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(names.value(2), "gamma");
        assert_eq!(values.value(1), 2.0);
    }

    #[test]
    fn test_read_with_projection_in_schema_order() {
        let data = encode(&TableSchema::all_columns(), &FormatOptions::new());
        let schema = TableSchema::new(vec![
            FieldDef::new("value", "float64"),
            FieldDef::new("name", "string"),
        ]);
        let batch = ParquetFormat
            .decode(TableSource::Buffered(data), &schema, &FormatOptions::new())
            .unwrap();
        assert_eq!(batch.num_columns(), 2);
        assert_eq!(batch.schema().field(0).name(), "value");
        assert_eq!(batch.schema().field(1).name(), "name");
    }

    #[test]
    fn test_write_restricted_to_schema_fields() {
        let schema = TableSchema::new(vec![FieldDef::new("name", "string")]);
        let data = encode(&schema, &FormatOptions::new());
        let batch = ParquetFormat
            .decode(
                TableSource::Buffered(data),
                &TableSchema::all_columns(),
                &FormatOptions::new(),
            )
            .unwrap();
        assert_eq!(batch.num_columns(), 1);
        assert_eq!(batch.num_rows(), 3);
    }

    #[test]
    fn test_compression_options() {
        let mut options = FormatOptions::new();
        options.insert("compression".into(), "ZSTD".into());
        assert_eq!(
            ParquetOptions::from_options(&options).unwrap().compression,
            Compression::ZSTD(ZstdLevel::default())
        );
        let data = encode(&TableSchema::all_columns(), &options);
        assert!(!data.is_empty());

        options.insert("compression".into(), "brotli-ish".into());
        assert!(matches!(
            ParquetOptions::from_options(&options),
            Err(TroveError::StorageConfig { .. })
        ));
    }

    #[test]
    fn test_decode_garbage_is_storage_access() {
        let err = ParquetFormat
            .decode(
                TableSource::Buffered(Bytes::from_static(b"not parquet")),
                &TableSchema::all_columns(),
                &FormatOptions::new(),
            )
            .unwrap_err();
        assert!(matches!(err, TroveError::StorageAccess { .. }));
    }
}
