//! Loader strategies
//!
//! Two distinct write paths, chosen per destination table:
//!
//! - [`point_write`]: one parameterized insert per row, with the statement's
//!   own conflict policy (upsert for users, insert-or-skip for songs and
//!   artists).
//! - [`bulk_append`]: the whole table serialized to the `COPY` text format
//!   and handed to the engine in one call. No conflict handling; rows must
//!   already be free of key collisions.

use tracing::debug;

use crate::error::Result;
use crate::queries::{CopyStatement, Statement, TableName};
use crate::storage::{StorageSession, ToSqlValues};
use crate::tsv;

/// Destination of a bulk append
#[derive(Debug, Clone, Copy)]
pub enum BulkTarget<'a> {
    /// Every column of the table, in table order
    Table(TableName),
    /// An explicit column list
    Statement(&'a CopyStatement),
}

impl BulkTarget<'_> {
    pub fn table(&self) -> TableName {
        match self {
            BulkTarget::Table(table) => *table,
            BulkTarget::Statement(copy) => copy.table,
        }
    }
}

/// Execute `statement` once per row, returning the total rows affected
pub async fn point_write<S, R>(session: &mut S, statement: &Statement, rows: &[R]) -> Result<u64>
where
    S: StorageSession + ?Sized,
    R: ToSqlValues + Sync,
{
    let mut affected = 0;
    for row in rows {
        affected += session.execute(statement, &row.to_sql_values()).await?;
    }

    debug!(
        statement = statement.name,
        table = %statement.table,
        rows = rows.len(),
        affected,
        "Point writes complete"
    );
    Ok(affected)
}

/// Stream `rows` to the engine's bulk-load channel in one operation
pub async fn bulk_append<S, R>(session: &mut S, target: BulkTarget<'_>, rows: &[R]) -> Result<u64>
where
    S: StorageSession + ?Sized,
    R: ToSqlValues + Sync,
{
    if rows.is_empty() {
        return Ok(0);
    }

    let payload = tsv::encode_rows(rows);
    let loaded = match target {
        BulkTarget::Table(table) => session.bulk_load(table, &payload).await?,
        BulkTarget::Statement(copy) => session.bulk_load_with_statement(copy, &payload).await?,
    };

    debug!(
        table = %target.table(),
        rows = rows.len(),
        bytes = payload.len(),
        loaded,
        "Bulk append complete"
    );
    Ok(loaded)
}
