//! In-memory storage engine
//!
//! Keeps every table as a list of text rows in table column order and
//! enforces the same constraints as the relational schema: primary and
//! unique keys, foreign keys and the songplays serial. Used for dry runs
//! and tests.
//!
//! A transaction is a working copy of all tables taken on the first
//! operation after a commit or rollback. Bulk loads are staged on a copy of
//! the target table and only applied when every row passes, so a rejected
//! load leaves no partial rows behind.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::{ResultTable, SqlValue, StorageSession};
use crate::error::{EtlError, Result};
use crate::queries::{ConflictPolicy, CopyStatement, Query, Statement, TableName, REFERENCE_SELECT};
use crate::tsv;

type Row = Vec<Option<String>>;
type Tables = BTreeMap<TableName, TableData>;

#[derive(Debug, Clone, Default)]
struct TableData {
    rows: Vec<Row>,
    last_serial: i64,
}

impl TableData {
    fn position_of(&self, key: &[usize], row: &Row) -> Option<usize> {
        self.rows
            .iter()
            .position(|existing| key.iter().all(|&i| existing[i].is_some() && existing[i] == row[i]))
    }

    fn assign_serial(&mut self, table: TableName, row: &mut Row) {
        let Some(column) = table.generated_column() else {
            return;
        };
        let Some(idx) = table.columns().iter().position(|c| *c == column) else {
            return;
        };
        match row[idx].as_deref().and_then(|v| v.parse::<i64>().ok()) {
            Some(explicit) => self.last_serial = self.last_serial.max(explicit),
            None => {
                self.last_serial += 1;
                row[idx] = Some(self.last_serial.to_string());
            },
        }
    }
}

/// Storage session backed by in-process tables
#[derive(Debug, Default)]
pub struct MemorySession {
    committed: Tables,
    working: Option<Tables>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed rows of `table`, in insertion order
    pub fn table_rows(&self, table: TableName) -> Vec<Vec<Option<String>>> {
        self.committed
            .get(&table)
            .map(|data| data.rows.clone())
            .unwrap_or_default()
    }

    /// Committed values of one column of `table`
    pub fn column_values(&self, table: TableName, column: &str) -> Vec<Option<String>> {
        let Some(idx) = table.columns().iter().position(|c| *c == column) else {
            return Vec::new();
        };
        self.committed
            .get(&table)
            .map(|data| data.rows.iter().map(|row| row[idx].clone()).collect())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: TableName) -> usize {
        self.committed.get(&table).map_or(0, |data| data.rows.len())
    }

    pub fn in_transaction(&self) -> bool {
        self.working.is_some()
    }

    fn tables(&self) -> &Tables {
        self.working.as_ref().unwrap_or(&self.committed)
    }

    fn tables_mut(&mut self) -> &mut Tables {
        self.working.get_or_insert_with(|| self.committed.clone())
    }

    fn load(&mut self, table: TableName, columns: &[&str], data: &[u8]) -> Result<u64> {
        let positions = positions(table, columns)?;
        let width = table.columns().len();

        let decoded = tsv::decode(data)
            .map_err(|e| EtlError::Storage(format!("invalid bulk data for {}: {}", table, e)))?;

        let mut rows = Vec::with_capacity(decoded.len());
        for (line, values) in decoded.into_iter().enumerate() {
            if values.len() != positions.len() {
                return Err(EtlError::Storage(format!(
                    "bulk data for {} line {}: expected {} columns, got {}",
                    table,
                    line + 1,
                    positions.len(),
                    values.len()
                )));
            }
            let mut row: Row = vec![None; width];
            for (&idx, value) in positions.iter().zip(values) {
                row[idx] = value;
            }
            rows.push(row);
        }

        let loaded = append_rows(self.tables_mut(), table, rows)?;
        debug!(engine = "memory", table = %table, rows = loaded, "Bulk load applied");
        Ok(loaded)
    }
}

#[async_trait]
impl StorageSession for MemorySession {
    fn engine(&self) -> &'static str {
        "memory"
    }

    async fn execute(&mut self, statement: &Statement, params: &[SqlValue]) -> Result<u64> {
        if params.len() != statement.columns.len() {
            return Err(EtlError::Storage(format!(
                "{} expects {} parameters, got {}",
                statement.name,
                statement.columns.len(),
                params.len()
            )));
        }

        let table = statement.table;
        let assigned = positions(table, statement.columns)?;
        let primary = primary_key(table)?;

        let mut row: Row = vec![None; table.columns().len()];
        for (&idx, value) in assigned.iter().zip(params) {
            row[idx] = value.to_text();
        }

        let tables = self.tables_mut();
        let existing = tables
            .get(&table)
            .and_then(|data| data.position_of(&primary, &row));

        match (existing, statement.conflict) {
            (Some(_), ConflictPolicy::DoNothing) => Ok(0),
            (Some(pos), ConflictPolicy::Overwrite) => {
                let data = tables.entry(table).or_default();
                for &idx in assigned.iter().filter(|idx| !primary.contains(*idx)) {
                    data.rows[pos][idx] = row[idx].take();
                }
                Ok(1)
            },
            (None, _) => append_rows(tables, table, vec![row]),
        }
    }

    async fn query(&mut self, query: &Query) -> Result<ResultTable> {
        if query.name != REFERENCE_SELECT.name {
            return Err(EtlError::Storage(format!(
                "query '{}' is not supported by the memory engine",
                query.name
            )));
        }
        reference_join(self.tables())
    }

    async fn bulk_load(&mut self, table: TableName, data: &[u8]) -> Result<u64> {
        self.load(table, table.columns(), data)
    }

    async fn bulk_load_with_statement(&mut self, copy: &CopyStatement, data: &[u8]) -> Result<u64> {
        self.load(copy.table, copy.columns, data)
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(working) = self.working.take() {
            self.committed = working;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.working = None;
        Ok(())
    }
}

fn positions(table: TableName, columns: &[&str]) -> Result<Vec<usize>> {
    let all = table.columns();
    columns
        .iter()
        .map(|column| {
            all.iter().position(|c| c == column).ok_or_else(|| {
                EtlError::Storage(format!("column '{}' of relation '{}' does not exist", column, table))
            })
        })
        .collect()
}

fn primary_key(table: TableName) -> Result<Vec<usize>> {
    let key = table
        .unique_keys()
        .first()
        .ok_or_else(|| EtlError::Storage(format!("relation '{}' has no primary key", table)))?;
    positions(table, key)
}

/// Insert rows into a staged copy of `table`, replacing it only if all pass
fn append_rows(tables: &mut Tables, table: TableName, rows: Vec<Row>) -> Result<u64> {
    let mut staged = tables.get(&table).cloned().unwrap_or_default();
    let count = rows.len() as u64;

    for mut row in rows {
        staged.assign_serial(table, &mut row);
        check_constraints(tables, table, &staged, &row)?;
        staged.rows.push(row);
    }

    tables.insert(table, staged);
    Ok(count)
}

fn check_constraints(tables: &Tables, table: TableName, staged: &TableData, row: &Row) -> Result<()> {
    for (n, key) in table.unique_keys().iter().enumerate() {
        let idx = positions(table, key)?;
        let values: Option<Vec<&str>> = idx.iter().map(|&i| row[i].as_deref()).collect();
        let Some(values) = values else {
            if n == 0 {
                return Err(EtlError::Storage(format!(
                    "null value in primary key ({}) of relation '{}'",
                    key.join(", "),
                    table
                )));
            }
            continue;
        };

        if staged.position_of(&idx, row).is_some() {
            return Err(EtlError::KeyCollision {
                table: table.to_string(),
                detail: format!("Key ({})=({}) already exists.", key.join(", "), values.join(", ")),
            });
        }
    }

    for fk in table.foreign_keys() {
        let child = positions(table, fk.columns)?;
        let values: Option<Vec<&str>> = child.iter().map(|&i| row[i].as_deref()).collect();
        let Some(values) = values else {
            continue;
        };

        let parent = positions(fk.parent, fk.references)?;
        let found = tables.get(&fk.parent).is_some_and(|data| {
            data.rows.iter().any(|candidate| {
                parent
                    .iter()
                    .zip(&values)
                    .all(|(&i, v)| candidate[i].as_deref() == Some(*v))
            })
        });

        if !found {
            return Err(EtlError::ForeignKey {
                table: table.to_string(),
                detail: format!(
                    "Key ({})=({}) is not present in table \"{}\".",
                    fk.columns.join(", "),
                    values.join(", "),
                    fk.parent
                ),
            });
        }
    }

    Ok(())
}

/// songs ⋈ artists on artist_id, ordered by song_id
fn reference_join(tables: &Tables) -> Result<ResultTable> {
    let song_cols = positions(TableName::Songs, &["song_id", "title", "artist_id", "duration"])?;
    let artist_cols = positions(TableName::Artists, &["artist_id", "name"])?;

    let names: HashMap<&str, Option<&str>> = tables
        .get(&TableName::Artists)
        .map(|data| {
            data.rows
                .iter()
                .filter_map(|row| {
                    row[artist_cols[0]]
                        .as_deref()
                        .map(|id| (id, row[artist_cols[1]].as_deref()))
                })
                .collect()
        })
        .unwrap_or_default();

    let mut joined = Vec::new();
    if let Some(songs) = tables.get(&TableName::Songs) {
        for row in &songs.rows {
            let Some(artist_id) = row[song_cols[2]].as_deref() else {
                continue;
            };
            let Some(artist_name) = names.get(artist_id) else {
                continue;
            };

            let duration = row[song_cols[3]]
                .as_deref()
                .map(str::parse::<f64>)
                .transpose()
                .map_err(|e| EtlError::Storage(format!("songs.duration is not a number: {}", e)))?;

            joined.push(vec![
                SqlValue::Text(row[song_cols[0]].clone()),
                SqlValue::from(artist_id),
                SqlValue::Text(row[song_cols[1]].clone()),
                SqlValue::Text(artist_name.map(str::to_string)),
                SqlValue::Float(duration),
            ]);
        }
    }

    joined.sort_by(|a, b| a[0].as_str().cmp(&b[0].as_str()));

    Ok(ResultTable {
        columns: REFERENCE_SELECT.columns.iter().map(|c| c.to_string()).collect(),
        rows: joined,
    })
}
