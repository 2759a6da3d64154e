//! Storage session abstraction
//!
//! The loader talks to the relational engine only through [`StorageSession`]:
//! point writes, queries, bulk loads and per-file commit/rollback. A session
//! is owned by one driver and never shared, matching the single connection
//! of a batch run.
//!
//! Transactions are implicit: the first operation after a commit or rollback
//! opens a new one.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::Result;
use crate::queries::{CopyStatement, Query, Statement, TableName};

pub use memory::MemorySession;
pub use postgres::PgSession;

/// Text form of timestamps in bulk transfers and in the in-memory engine
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// A typed, nullable statement parameter or result value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(Option<i32>),
    Float(Option<f64>),
    Text(Option<String>),
    Timestamp(Option<NaiveDateTime>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        match self {
            SqlValue::Int(v) => v.is_none(),
            SqlValue::Float(v) => v.is_none(),
            SqlValue::Text(v) => v.is_none(),
            SqlValue::Timestamp(v) => v.is_none(),
        }
    }

    /// Unescaped text representation, `None` for NULL
    pub fn to_text(&self) -> Option<String> {
        match self {
            SqlValue::Int(v) => v.map(|v| v.to_string()),
            SqlValue::Float(v) => v.map(|v| v.to_string()),
            SqlValue::Text(v) => v.clone(),
            SqlValue::Timestamp(v) => v.map(|v| v.format(TIMESTAMP_FORMAT).to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(Some(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Float(v) => *v,
            SqlValue::Int(v) => v.map(f64::from),
            _ => None,
        }
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(Some(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(Some(v))
    }
}

impl From<Option<f64>> for SqlValue {
    fn from(v: Option<f64>) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(Some(v.to_string()))
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        SqlValue::Text(Some(v.clone()))
    }
}

impl From<&Option<String>> for SqlValue {
    fn from(v: &Option<String>) -> Self {
        SqlValue::Text(v.clone())
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::Timestamp(Some(v))
    }
}

/// Rows that can be written to a destination table
pub trait ToSqlValues {
    /// Values in the column order of the statement or copy target
    fn to_sql_values(&self) -> Vec<SqlValue>;
}

/// Rows returned by [`StorageSession::query`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl ResultTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Relational engine contract consumed by the loader
#[async_trait]
pub trait StorageSession: Send {
    /// Human-readable engine name for logs
    fn engine(&self) -> &'static str;

    /// Run a parameterized point write, returning rows affected
    async fn execute(&mut self, statement: &Statement, params: &[SqlValue]) -> Result<u64>;

    /// Run a read-only query
    async fn query(&mut self, query: &Query) -> Result<ResultTable>;

    /// Bulk-load tab-delimited rows into every column of `table`
    async fn bulk_load(&mut self, table: TableName, data: &[u8]) -> Result<u64>;

    /// Bulk-load tab-delimited rows through an explicit copy statement
    async fn bulk_load_with_statement(&mut self, copy: &CopyStatement, data: &[u8])
        -> Result<u64>;

    /// Commit the open transaction, if any
    async fn commit(&mut self) -> Result<()>;

    /// Discard the open transaction, if any
    async fn rollback(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_text_representation() {
        assert_eq!(SqlValue::from(42).to_text().as_deref(), Some("42"));
        assert_eq!(SqlValue::from(175.0).to_text().as_deref(), Some("175"));
        assert_eq!(SqlValue::Float(None).to_text(), None);
        assert!(SqlValue::Text(None).is_null());

        let ts = NaiveDate::from_ymd_opt(2018, 11, 2)
            .and_then(|d| d.and_hms_milli_opt(1, 25, 34, 796))
            .map(SqlValue::from);
        assert_eq!(
            ts.and_then(|v| v.to_text()).as_deref(),
            Some("2018-11-02 01:25:34.796")
        );
    }

    #[test]
    fn test_result_table_lookup() {
        let table = ResultTable {
            columns: vec!["song_id".to_string(), "duration".to_string()],
            rows: vec![vec![SqlValue::from("S1"), SqlValue::from(1.5)]],
        };
        assert_eq!(table.column_index("duration"), Some(1));
        assert_eq!(table.column_index("title"), None);
        assert_eq!(table.rows[0][1].as_f64(), Some(1.5));
        assert_eq!(table.len(), 1);
    }
}
