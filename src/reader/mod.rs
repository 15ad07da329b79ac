//! Loading input tables into [`RecordTable`]s
//!
//! CSV files are read with the `csv` crate and Parquet files with the arrow
//! reader. Every column is read as text except Parquet date columns, which
//! become [`FieldValue::Date`]. Blank and null values are missing.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use arrow::array::{Array, ArrayRef, Date32Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Schema as ArrowSchema};
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::config::{InputConfig, SourceFormat, TableSource};
use crate::error::{LinkageError, Result};
use crate::models::{FieldValue, RecordTable, Schema};
use crate::utils::logging::{log_operation_complete, log_operation_start, log_warning};

type Rows = Vec<(String, Vec<FieldValue>)>;

/// Load one table described by `source`
pub fn load_table(source: &TableSource) -> Result<RecordTable> {
    match source.resolved_format()? {
        SourceFormat::Csv => read_csv(source),
        SourceFormat::Parquet => read_parquet(source),
    }
}

/// Load the left table and, when linking, the right table in parallel
///
/// # Returns
///
/// The left table and the right table, `None` in deduplication mode
pub fn load_tables(input: &InputConfig) -> Result<(RecordTable, Option<RecordTable>)> {
    let (left, right) = rayon::join(
        || load_table(&input.left),
        || input.right.as_ref().map(load_table).transpose(),
    );
    Ok((left?, right?))
}

/// Standardized field names and their source columns, in table order
///
/// Without an explicit mapping every column except the id column is read
/// under its own name.
fn field_columns(source: &TableSource, columns: &[String]) -> Vec<(String, String)> {
    if source.fields.is_empty() {
        columns
            .iter()
            .filter(|column| **column != source.id_field)
            .map(|column| (column.clone(), column.clone()))
            .collect()
    } else {
        source
            .fields
            .iter()
            .map(|(field, column)| (field.clone(), column.clone()))
            .collect()
    }
}

fn missing_column(source: &TableSource, column: &str) -> LinkageError {
    LinkageError::Schema(format!(
        "column '{column}' of table '{}' not found in {}",
        source.name,
        source.path.display()
    ))
}

fn missing_id(source: &TableSource, row: usize) -> LinkageError {
    LinkageError::Schema(format!(
        "row {row} of table '{}' has no value in id column '{}'",
        source.name, source.id_field
    ))
}

fn build_table(source: &TableSource, fields: &[(String, String)], rows: Rows, start: Instant) -> Result<RecordTable> {
    let schema = Schema::new(fields.iter().map(|(field, _)| field.clone()))?;
    let table = RecordTable::new(source.name.clone(), schema, rows)?;
    if table.is_empty() {
        log_warning(&format!("Table '{}' has no records", source.name), Some(&source.path));
    }
    log_operation_complete("read", &source.path, table.len(), Some(start.elapsed()));
    Ok(table)
}

/// Read a delimited text table
pub fn read_csv(source: &TableSource) -> Result<RecordTable> {
    let start = Instant::now();
    log_operation_start("Reading CSV table", &source.path);

    let delimiter = u8::try_from(source.delimiter).map_err(|_| {
        LinkageError::ConfigValidation(format!(
            "delimiter {:?} of table '{}' is not a single byte",
            source.delimiter, source.name
        ))
    })?;
    let file = File::open(&source.path).map_err(|e| LinkageError::file(&source.path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_reader(file);

    let headers: Vec<String> = reader.headers()?.iter().map(ToString::to_string).collect();
    let position = |column: &str| {
        headers
            .iter()
            .position(|header| header == column)
            .ok_or_else(|| missing_column(source, column))
    };
    let id_column = position(&source.id_field)?;
    let fields = field_columns(source, &headers);
    let columns = fields
        .iter()
        .map(|(_, column)| position(column))
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let id = record
            .get(id_column)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| missing_id(source, row))?;
        let values = columns
            .iter()
            .map(|&column| record.get(column).map_or(FieldValue::Missing, FieldValue::text))
            .collect();
        rows.push((id.to_string(), values));
    }

    build_table(source, &fields, rows, start)
}

/// Column of a record batch converted for reading field values
enum Column {
    Text(StringArray),
    Date(Date32Array),
}

impl Column {
    fn new(array: &ArrayRef) -> Result<Self> {
        match array.data_type() {
            DataType::Date32 | DataType::Date64 => {
                let dates = cast(array, &DataType::Date32)?;
                dates
                    .as_any()
                    .downcast_ref::<Date32Array>()
                    .cloned()
                    .map(Self::Date)
                    .ok_or_else(|| LinkageError::Schema("date column did not cast to Date32".to_string()))
            }
            _ => {
                let text = cast(array, &DataType::Utf8)?;
                text.as_any()
                    .downcast_ref::<StringArray>()
                    .cloned()
                    .map(Self::Text)
                    .ok_or_else(|| LinkageError::Schema("column did not cast to Utf8".to_string()))
            }
        }
    }

    fn value(&self, row: usize) -> FieldValue {
        match self {
            Self::Text(array) if array.is_valid(row) => FieldValue::text(array.value(row)),
            Self::Date(array) if array.is_valid(row) => array
                .value_as_date(row)
                .map_or(FieldValue::Missing, FieldValue::Date),
            _ => FieldValue::Missing,
        }
    }
}

/// Top-level column indices of `names` in the file schema
fn projection(schema: &ArrowSchema, names: &[&str], source: &TableSource) -> Result<Vec<usize>> {
    let mut indices = names
        .iter()
        .map(|name| schema.index_of(name).map_err(|_| missing_column(source, name)))
        .collect::<Result<Vec<_>>>()?;
    indices.sort_unstable();
    indices.dedup();
    Ok(indices)
}

/// Read a Parquet table, projecting only the configured columns
pub fn read_parquet(source: &TableSource) -> Result<RecordTable> {
    let start = Instant::now();
    log_operation_start("Reading parquet table", &source.path);

    let file = File::open(&source.path).map_err(|e| LinkageError::file(&source.path, e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    let file_schema: Arc<ArrowSchema> = Arc::clone(builder.schema());
    let columns: Vec<String> = file_schema
        .fields()
        .iter()
        .map(|field| field.name().clone())
        .collect();
    let fields = field_columns(source, &columns);

    let wanted: Vec<&str> = std::iter::once(source.id_field.as_str())
        .chain(fields.iter().map(|(_, column)| column.as_str()))
        .collect();
    let mask = ProjectionMask::roots(builder.parquet_schema(), projection(&file_schema, &wanted, source)?);
    let reader = builder.with_projection(mask).build()?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch?;
        let schema = batch.schema();
        let column = |name: &str| -> Result<Column> {
            let index = schema.index_of(name).map_err(|_| missing_column(source, name))?;
            Column::new(batch.column(index))
        };
        let ids = column(&source.id_field)?;
        let values = fields
            .iter()
            .map(|(_, name)| column(name))
            .collect::<Result<Vec<_>>>()?;

        for row in 0..batch.num_rows() {
            let id = match ids.value(row) {
                FieldValue::Missing => return Err(missing_id(source, rows.len())),
                value => value.to_string(),
            };
            rows.push((id, values.iter().map(|column| column.value(row)).collect()));
        }
    }

    build_table(source, &fields, rows, start)
}

/// Whether `path` looks like a table this module can read
#[must_use]
pub fn is_supported(path: &Path) -> bool {
    SourceFormat::from_path(path).is_some()
}
