//! Repository client capability and the values it returns.
//!
//! The low-level binding to the repository is opaque to the connector:
//! it is anything that implements [`RepositoryClient`], taking a filter,
//! a view expression and a column list and handing back a [`RecordSet`].
//! Content bytes are likewise pulled through an opaque [`ContentFetcher`].

use std::fmt;

use chrono::NaiveDateTime;

use crate::date_format;
use crate::error::ConnectorError;

/// A single value returned by the repository.
///
/// Numeric columns may come back as any of the three numeric kinds
/// depending on the database backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// Boolean.
    Bool(bool),
    /// 32-bit integer.
    Integer(i32),
    /// 64-bit integer.
    Long(i64),
    /// Double-precision float.
    Double(f64),
    /// Text.
    Text(String),
    /// Timestamp without zone.
    Date(NaiveDateTime),
}

impl Value {
    /// Returns the value as an `i64` when it is an integer kind.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a timestamp.
    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the value as a string slice when it is text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns `true` for `NULL`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// A short name for the value kind, for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Date(d) => f.write_str(&date_format::to_iso8601(d)),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Date(v)
    }
}

/// Tabular query result: named columns and rows of [`Value`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl RecordSet {
    /// Creates an empty record set with the given columns.
    #[must_use]
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row. Rows shorter than the column list are padded with
    /// `NULL`; extra values are dropped.
    pub fn push(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    /// Builder-style [`push`](Self::push).
    #[must_use]
    pub fn with_row(mut self, row: Vec<Value>) -> Self {
        self.push(row);
        self
    }

    /// Column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the row at `index`.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        self.rows.get(index).map(|values| Row {
            columns: &self.columns,
            values,
        })
    }

    /// Iterates over the rows.
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|values| Row {
            columns: &self.columns,
            values,
        })
    }
}

/// A borrowed view of one row in a [`RecordSet`].
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> Row<'a> {
    /// Looks up a column value by name, ignoring ASCII case.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .map(|i| &self.values[i])
    }

    /// Reads an integer column.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ReadError` if the column is missing or not
    /// an integer.
    pub fn i64(&self, column: &str) -> Result<i64, ConnectorError> {
        match self.get(column) {
            Some(v) => v.as_i64().ok_or_else(|| {
                ConnectorError::ReadError(format!(
                    "column {column}: expected integer, got {}",
                    v.kind()
                ))
            }),
            None => Err(ConnectorError::ReadError(format!("missing column {column}"))),
        }
    }

    /// Reads a timestamp column.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ReadError` if the column is missing or not
    /// a date.
    pub fn date(&self, column: &str) -> Result<NaiveDateTime, ConnectorError> {
        match self.get(column) {
            Some(v) => v.as_date().ok_or_else(|| {
                ConnectorError::ReadError(format!(
                    "column {column}: expected date, got {}",
                    v.kind()
                ))
            }),
            None => Err(ConnectorError::ReadError(format!("missing column {column}"))),
        }
    }

    /// Iterates over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

/// The repository's query capability.
///
/// Implementations issue `select <columns> from <view> where <filter>`
/// against the repository's metadata tables. A query that matches nothing
/// returns an empty [`RecordSet`], not an error.
pub trait RepositoryClient: Send + Sync {
    /// Runs a query.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ReadError` or `ConnectionFailed` when the
    /// repository rejects the query or cannot be reached.
    fn query(
        &self,
        filter: &str,
        view: &str,
        columns: &[String],
    ) -> Result<RecordSet, ConnectorError>;

    /// Runs a query whose failure is expected and not fatal, such as a
    /// probe for a dialect-specific system view. Returns `None` on failure.
    fn query_no_throw(&self, filter: &str, view: &str, columns: &[String]) -> Option<RecordSet> {
        match self.query(filter, view, columns) {
            Ok(rows) => Some(rows),
            Err(e) => {
                tracing::debug!(view, error = %e, "no-throw query failed");
                None
            }
        }
    }

    /// Verifies that the repository is reachable with the configured
    /// credentials.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ConnectionFailed` if it is not.
    fn ping(&self) -> Result<(), ConnectorError>;
}

/// Fetches document content bytes.
///
/// Content retrieval strategies live behind this trait; the traversal core
/// never touches content itself.
pub trait ContentFetcher: Send + Sync {
    /// Returns the content of the given item, or `None` if it has none.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if the content cannot be retrieved.
    fn fetch(&self, data_id: i64) -> Result<Option<Vec<u8>>, ConnectorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Integer(7).as_i64(), Some(7));
        assert_eq!(Value::Long(-7).as_i64(), Some(-7));
        assert_eq!(Value::Double(7.0).as_i64(), None);
        assert_eq!(Value::Text("x".into()).as_str(), Some("x"));
        assert!(Value::Null.is_null());
        let d = ts("2021-02-03 04:05:06");
        assert_eq!(Value::Date(d).as_date(), Some(d));
    }

    #[test]
    fn test_record_set_rows() {
        let rs = RecordSet::new(["DataID", "ModifyDate"])
            .with_row(vec![Value::Integer(10), Value::Date(ts("2021-01-01 00:00:00"))])
            .with_row(vec![Value::Long(11)]);

        assert_eq!(rs.len(), 2);
        let first = rs.row(0).unwrap();
        assert_eq!(first.i64("dataid").unwrap(), 10);
        assert_eq!(first.date("ModifyDate").unwrap(), ts("2021-01-01 00:00:00"));

        let second = rs.row(1).unwrap();
        assert!(second.get("ModifyDate").unwrap().is_null());
        assert!(second.date("ModifyDate").is_err());
        assert!(second.i64("ParentID").is_err());
    }

    #[test]
    fn test_row_iter() {
        let rs = RecordSet::new(["A", "B"]).with_row(vec![Value::from(1), Value::from("two")]);
        let pairs: Vec<(String, String)> = rs
            .row(0)
            .unwrap()
            .iter()
            .map(|(c, v)| (c.to_string(), v.to_string()))
            .collect();
        assert_eq!(
            pairs,
            vec![("A".into(), "1".into()), ("B".into(), "two".into())]
        );
    }
}
