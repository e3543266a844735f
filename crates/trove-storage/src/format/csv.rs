//! CSV table format, backed by `arrow::csv`.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;

use trove_core::error::TroveError;
use trove_core::types::{FormatOptions, TableSchema};
use trove_core::Result;

use super::{
    log_unknown_options, parse_bool_option, parse_byte_option, parse_option, project_batch,
    TableFormat, TableSource,
};

const FORMAT_NAME: &str = "csv";

const DEFAULT_BATCH_SIZE: usize = 8192;

/// Recognised CSV options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvOptions {
    /// Field delimiter (`delimiter`, default `,`).
    pub delimiter: u8,
    /// Whether the first row holds column names (`header`, default true).
    pub header: bool,
    /// Quote character (`quote`, default `"`).
    pub quote: u8,
    /// Escape character (`escape`, none by default).
    pub escape: Option<u8>,
    /// Rows per decoded batch (`batch_size`).
    pub batch_size: usize,
    /// Rows sampled for type inference (`infer_rows`, all rows by default).
    pub infer_rows: Option<usize>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            header: true,
            quote: b'"',
            escape: None,
            batch_size: DEFAULT_BATCH_SIZE,
            infer_rows: None,
        }
    }
}

impl CsvOptions {
    const KEYS: [&'static str; 6] = [
        "delimiter",
        "header",
        "quote",
        "escape",
        "batch_size",
        "infer_rows",
    ];

    /// Parse the recognised keys out of a format option map.
    pub fn from_options(options: &FormatOptions) -> Result<Self> {
        log_unknown_options(options, FORMAT_NAME, &Self::KEYS);
        let defaults = Self::default();
        Ok(Self {
            delimiter: parse_byte_option(options, FORMAT_NAME, "delimiter")?
                .unwrap_or(defaults.delimiter),
            header: parse_bool_option(options, FORMAT_NAME, "header")?.unwrap_or(defaults.header),
            quote: parse_byte_option(options, FORMAT_NAME, "quote")?.unwrap_or(defaults.quote),
            escape: parse_byte_option(options, FORMAT_NAME, "escape")?,
            batch_size: parse_option(options, FORMAT_NAME, "batch_size")?
                .unwrap_or(defaults.batch_size),
            infer_rows: parse_option(options, FORMAT_NAME, "infer_rows")?,
        })
    }

    fn format(&self) -> Format {
        let format = Format::default()
            .with_header(self.header)
            .with_delimiter(self.delimiter)
            .with_quote(self.quote);
        match self.escape {
            Some(escape) => format.with_escape(escape),
            None => format,
        }
    }
}

/// Comma-separated text tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvFormat;

impl CsvFormat {
    fn decode_from<R: Read + Seek>(
        &self,
        mut reader: R,
        schema: &TableSchema,
        options: &CsvOptions,
    ) -> Result<RecordBatch> {
        let (inferred, _) = options
            .format()
            .infer_schema(&mut reader, options.infer_rows)
            .map_err(|e| TroveError::access("Failed to infer CSV layout", e))?;
        reader
            .seek(SeekFrom::Start(0))
            .map_err(|e| TroveError::access("Failed to rewind CSV source", e))?;

        let (file_schema, projection) = resolve_read_schema(&inferred, schema, options.header)?;

        let mut builder = ReaderBuilder::new(file_schema)
            .with_header(options.header)
            .with_delimiter(options.delimiter)
            .with_quote(options.quote)
            .with_batch_size(options.batch_size);
        if let Some(escape) = options.escape {
            builder = builder.with_escape(escape);
        }
        if let Some(indices) = projection {
            builder = builder.with_projection(indices);
        }

        let csv_reader = builder
            .build(reader)
            .map_err(|e| TroveError::access("Failed to open CSV reader", e))?;
        let output_schema = csv_reader.schema();

        let batches = csv_reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| TroveError::access("Failed to decode CSV data", e))?;

        arrow::compute::concat_batches(&output_schema, &batches)
            .map_err(|e| TroveError::access("Failed to concatenate CSV batches", e))
    }
}

impl TableFormat for CsvFormat {
    fn name(&self) -> &str {
        FORMAT_NAME
    }

    fn is_binary(&self) -> bool {
        false
    }

    fn decode(
        &self,
        source: TableSource,
        schema: &TableSchema,
        options: &FormatOptions,
    ) -> Result<RecordBatch> {
        let options = CsvOptions::from_options(options)?;

        if source.is_empty()? {
            return Ok(RecordBatch::new_empty(schema.to_arrow()));
        }

        match source {
            TableSource::Native(file) => self.decode_from(file, schema, &options),
            TableSource::Buffered(bytes) => self.decode_from(Cursor::new(bytes), schema, &options),
        }
    }

    fn encode(
        &self,
        sink: &mut (dyn Write + Send),
        schema: &TableSchema,
        batch: &RecordBatch,
        options: &FormatOptions,
    ) -> Result<()> {
        let options = CsvOptions::from_options(options)?;
        let projected = project_batch(schema, batch)?;

        let mut builder = WriterBuilder::new()
            .with_header(options.header)
            .with_delimiter(options.delimiter)
            .with_quote(options.quote);
        if let Some(escape) = options.escape {
            builder = builder.with_escape(escape);
        }

        let mut writer = builder.build(sink);
        writer
            .write(&projected)
            .map_err(|e| TroveError::access("Failed to encode CSV data", e))?;
        Ok(())
    }
}

/// Combine the inferred file layout with the declared schema.
///
/// Declared fields override inferred types and select the projected columns,
/// in schema order. Without a header row the declared fields name the columns
/// by position instead. Without declared fields every inferred column is read.
fn resolve_read_schema(
    inferred: &Schema,
    schema: &TableSchema,
    header: bool,
) -> Result<(SchemaRef, Option<Vec<usize>>)> {
    let Some(names) = schema.field_names() else {
        return Ok((Arc::new(inferred.clone()), None));
    };

    if !header {
        if names.len() != inferred.fields().len() {
            return Err(TroveError::access_msg(format!(
                "CSV data has {} columns but the schema declares {} fields",
                inferred.fields().len(),
                names.len()
            )));
        }
        let fields: Vec<Field> = schema
            .fields
            .iter()
            .map(|declared| Field::new(&declared.name, declared.arrow_type(), true))
            .collect();
        return Ok((Arc::new(Schema::new(fields)), None));
    }

    let projection = names
        .iter()
        .map(|name| {
            inferred.index_of(name).map_err(|_| {
                TroveError::access_msg(format!("Column [{name}] is not present in the CSV data"))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let fields: Vec<Field> = inferred
        .fields()
        .iter()
        .map(|field| match schema.field(field.name()) {
            Some(declared) => Field::new(field.name(), declared.arrow_type(), true),
            None => field.as_ref().clone(),
        })
        .collect();

    Ok((Arc::new(Schema::new(fields)), Some(projection)))
}
