//! Record and table model
//!
//! A [`RecordTable`] is the in-memory form of one standardized input table.
//! Every record carries a stable source identifier and one [`FieldValue`] per
//! schema field. Tables are immutable once built.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use rustc_hash::FxHashMap;

use crate::error::{LinkageError, Result};
use crate::models::types::Side;

/// Standardized value of a single field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum FieldValue {
    /// No value recorded
    #[default]
    Missing,
    /// Standardized text
    Text(String),
    /// Calendar date
    Date(NaiveDate),
}

impl FieldValue {
    /// Build a text value; blank strings become [`FieldValue::Missing`]
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            Self::Missing
        } else {
            Self::Text(value)
        }
    }

    #[must_use]
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Textual form of the value, `None` when missing
    ///
    /// Dates render as `YYYY-MM-DD`.
    #[must_use]
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Missing => None,
            Self::Text(text) => Some(Cow::Borrowed(text.as_str())),
            Self::Date(date) => Some(Cow::Owned(date.format("%Y-%m-%d").to_string())),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => Ok(()),
            Self::Text(text) => f.write_str(text),
            Self::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::text(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Missing, Into::into)
    }
}

/// Ordered list of standardized field names of a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<String>,
    positions: FxHashMap<String, usize>,
}

impl Schema {
    /// Create a schema, rejecting duplicate field names
    pub fn new<I, S>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        let mut positions = FxHashMap::default();
        for (index, field) in fields.iter().enumerate() {
            if positions.insert(field.clone(), index).is_some() {
                return Err(LinkageError::Schema(format!(
                    "field '{field}' is declared twice"
                )));
            }
        }
        Ok(Self { fields, positions })
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    #[must_use]
    pub fn index_of(&self, field: &str) -> Option<usize> {
        self.positions.get(field).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One row of an input table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    id: String,
    values: Vec<FieldValue>,
}

impl Record {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    /// Value at a schema position; out-of-range positions read as missing
    #[must_use]
    pub fn value(&self, index: usize) -> &FieldValue {
        static MISSING: FieldValue = FieldValue::Missing;
        self.values.get(index).unwrap_or(&MISSING)
    }
}

/// An immutable table of records sharing one schema
#[derive(Debug, Clone)]
pub struct RecordTable {
    name: String,
    schema: Arc<Schema>,
    records: Vec<Record>,
    rows_by_id: FxHashMap<String, usize>,
}

impl RecordTable {
    /// Create a table from `(id, values)` rows
    ///
    /// # Errors
    ///
    /// Returns [`LinkageError::Schema`] when a row has the wrong number of
    /// values and [`LinkageError::DuplicateRecordId`] when two rows share an id.
    pub fn new(
        name: impl Into<String>,
        schema: Schema,
        rows: impl IntoIterator<Item = (String, Vec<FieldValue>)>,
    ) -> Result<Self> {
        let name = name.into();
        let mut records = Vec::new();
        let mut rows_by_id = FxHashMap::default();

        for (id, values) in rows {
            if values.len() != schema.len() {
                return Err(LinkageError::Schema(format!(
                    "record '{id}' in table '{name}' has {} values, schema has {} fields",
                    values.len(),
                    schema.len()
                )));
            }
            if rows_by_id.insert(id.clone(), records.len()).is_some() {
                return Err(LinkageError::DuplicateRecordId { table: name, id });
            }
            records.push(Record { id, values });
        }

        Ok(Self {
            name,
            schema: Arc::new(schema),
            records,
            rows_by_id,
        })
    }

    /// Start building a table with the given standardized fields
    #[must_use]
    pub fn builder(name: impl Into<String>, fields: &[&str]) -> RecordTableBuilder {
        RecordTableBuilder::new(name, fields)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn record(&self, row: usize) -> &Record {
        &self.records[row]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Row position of a record id
    #[must_use]
    pub fn row_of(&self, id: &str) -> Option<usize> {
        self.rows_by_id.get(id).copied()
    }

    /// Resolve a field name, reporting `context` when it is absent
    pub fn require_field(&self, context: &str, field: &str) -> Result<usize> {
        self.schema
            .index_of(field)
            .ok_or_else(|| LinkageError::UnknownField {
                context: context.to_string(),
                table: self.name.clone(),
                field: field.to_string(),
            })
    }
}

/// Builder for small in-memory tables
#[derive(Debug, Clone)]
pub struct RecordTableBuilder {
    name: String,
    fields: Vec<String>,
    rows: Vec<(String, Vec<FieldValue>)>,
}

impl RecordTableBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            name: name.into(),
            fields: fields.iter().map(ToString::to_string).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a record
    #[must_use]
    pub fn record<I, V>(mut self, id: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        self.rows
            .push((id.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn build(self) -> Result<RecordTable> {
        RecordTable::new(self.name, Schema::new(self.fields)?, self.rows)
    }
}

/// The tables taking part in one run
///
/// In deduplication mode both sides refer to the same table.
#[derive(Debug, Clone, Copy)]
pub struct TablePair<'a> {
    pub left: &'a RecordTable,
    pub right: &'a RecordTable,
    pub dedup: bool,
}

impl<'a> TablePair<'a> {
    /// Link two distinct tables
    #[must_use]
    pub const fn link(left: &'a RecordTable, right: &'a RecordTable) -> Self {
        Self {
            left,
            right,
            dedup: false,
        }
    }

    /// Deduplicate a single table against itself
    #[must_use]
    pub const fn dedup(table: &'a RecordTable) -> Self {
        Self {
            left: table,
            right: table,
            dedup: true,
        }
    }

    #[must_use]
    pub const fn table(&self, side: Side) -> &'a RecordTable {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_is_missing() {
        assert!(FieldValue::from("").is_missing());
        assert!(FieldValue::from("   ").is_missing());
        assert_eq!(FieldValue::from("ann"), FieldValue::Text("ann".to_string()));
        assert!(FieldValue::from(None::<&str>).is_missing());

        let date = NaiveDate::from_ymd_opt(1980, 2, 3).unwrap();
        assert_eq!(FieldValue::from(date).as_text().unwrap(), "1980-02-03");
    }

    #[test]
    fn builder_validates_rows() {
        let table = RecordTable::builder("people", &["fname", "lname"])
            .record("a1", ["ann", "lee"])
            .record("a2", ["bob", ""])
            .build()
            .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.row_of("a2"), Some(1));
        assert!(table.record(1).value(1).is_missing());
        assert_eq!(table.schema().index_of("lname"), Some(1));

        let duplicate = RecordTable::builder("people", &["fname"])
            .record("a1", ["ann"])
            .record("a1", ["bob"])
            .build();
        assert!(matches!(
            duplicate,
            Err(LinkageError::DuplicateRecordId { .. })
        ));

        let short = RecordTable::builder("people", &["fname", "lname"])
            .record("a1", ["ann"])
            .build();
        assert!(matches!(short, Err(LinkageError::Schema(_))));
    }

    #[test]
    fn unknown_field_names_context() {
        let table = RecordTable::builder("people", &["fname"]).build().unwrap();
        let err = table.require_field("blocking pass 0", "ssn").unwrap_err();
        assert!(err.to_string().contains("ssn"));
        assert!(err.to_string().contains("blocking pass 0"));
    }
}
