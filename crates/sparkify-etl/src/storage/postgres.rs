//! PostgreSQL storage engine
//!
//! Point writes and queries run as prepared statements; bulk loads stream
//! through `COPY ... FROM STDIN` in text format. All of it happens inside one
//! transaction per file, begun lazily on the first operation.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Postgres, Row, Transaction, TypeInfo};
use std::time::Duration;
use tracing::{debug, info};

use super::{ResultTable, SqlValue, StorageSession};
use crate::error::{EtlError, Result};
use crate::queries::{CopyStatement, Query, Statement, TableName};
use sparkify_common::config::DatabaseConfig;

/// Open the connection pool for a batch run.
///
/// The loader is sequential, so the pool holds a single connection.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(&config.url)
        .await?;

    info!(
        connect_timeout_secs = config.connect_timeout_secs,
        "Database connection pool created"
    );
    Ok(pool)
}

/// Apply pending schema migrations
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    info!("Database migrations complete");
    Ok(())
}

/// Storage session over a PostgreSQL pool
pub struct PgSession {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSession {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, tx: None }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn transaction(&mut self) -> Result<&mut Transaction<'static, Postgres>> {
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => self.pool.begin().await?,
        };
        Ok(self.tx.insert(tx))
    }

    async fn copy_in(&mut self, table: TableName, sql: &str, data: &[u8]) -> Result<u64> {
        let tx = self.transaction().await?;
        let mut copy = tx
            .copy_in_raw(sql)
            .await
            .map_err(|e| load_error(table, e))?;

        if let Err(err) = copy.send(data).await {
            if let Err(abort) = copy.abort(err.to_string()).await {
                debug!(table = %table, error = %abort, "COPY abort reported an error");
            }
            return Err(load_error(table, err));
        }

        let rows = copy.finish().await.map_err(|e| load_error(table, e))?;
        debug!(engine = "postgres", table = %table, rows, bytes = data.len(), "COPY complete");
        Ok(rows)
    }
}

#[async_trait]
impl StorageSession for PgSession {
    fn engine(&self) -> &'static str {
        "postgres"
    }

    async fn execute(&mut self, statement: &Statement, params: &[SqlValue]) -> Result<u64> {
        let mut query = sqlx::query(statement.sql);
        for param in params {
            query = match param {
                SqlValue::Int(v) => query.bind(*v),
                SqlValue::Float(v) => query.bind(*v),
                SqlValue::Text(v) => query.bind(v.clone()),
                SqlValue::Timestamp(v) => query.bind(*v),
            };
        }

        let tx = self.transaction().await?;
        let result = query
            .execute(&mut **tx)
            .await
            .map_err(|e| load_error(statement.table, e))?;
        Ok(result.rows_affected())
    }

    async fn query(&mut self, query: &Query) -> Result<ResultTable> {
        let tx = self.transaction().await?;
        let rows = sqlx::query(query.sql).fetch_all(&mut **tx).await?;

        let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>>>()?;
        Ok(ResultTable {
            columns: query.columns.iter().map(|c| c.to_string()).collect(),
            rows,
        })
    }

    async fn bulk_load(&mut self, table: TableName, data: &[u8]) -> Result<u64> {
        self.copy_in(table, table.copy_sql(), data).await
    }

    async fn bulk_load_with_statement(&mut self, copy: &CopyStatement, data: &[u8]) -> Result<u64> {
        self.copy_in(copy.table, copy.sql, data).await
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}

/// Map constraint violations to their loader error
fn load_error(table: TableName, error: sqlx::Error) -> EtlError {
    if let sqlx::Error::Database(ref db_err) = error {
        let detail = db_err.message().to_string();
        if db_err.is_unique_violation() {
            return EtlError::KeyCollision {
                table: table.to_string(),
                detail,
            };
        }
        if db_err.is_foreign_key_violation() {
            return EtlError::ForeignKey {
                table: table.to_string(),
                detail,
            };
        }
    }
    EtlError::Database(error)
}

fn decode_row(row: &PgRow) -> Result<Vec<SqlValue>> {
    row.columns()
        .iter()
        .map(|column| {
            let idx = column.ordinal();
            let value = match column.type_info().name() {
                "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => SqlValue::Text(row.try_get(idx)?),
                "INT4" => SqlValue::Int(row.try_get(idx)?),
                "INT2" => SqlValue::Int(row.try_get::<Option<i16>, _>(idx)?.map(i32::from)),
                "FLOAT8" => SqlValue::Float(row.try_get(idx)?),
                "FLOAT4" => SqlValue::Float(row.try_get::<Option<f32>, _>(idx)?.map(f64::from)),
                "TIMESTAMP" => SqlValue::Timestamp(row.try_get(idx)?),
                other => {
                    return Err(EtlError::Storage(format!(
                        "unsupported column type {} for '{}'",
                        other,
                        column.name()
                    )))
                },
            };
            Ok(value)
        })
        .collect()
}
