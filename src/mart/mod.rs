//! Mart materialization.
//!
//! Output rows are written to a SQLite mart database, one table per metric
//! family: granularity key columns, then a nullable value column and a
//! coverage flag column per metric. A materialization replaces exactly the
//! partitions present in the input set: never a full-table rewrite, and
//! never a partial row patch. Each partition key is replaced inside its own
//! transaction, so readers never observe a half-updated multi-column row,
//! and re-running the same partition set is idempotent.

use std::collections::BTreeSet;
use std::path::Path;

use rusqlite::{params_from_iter, Connection};
use thiserror::Error;

use crate::engine::aggregate::DualSum;
use crate::engine::coverage::CoverageFlag;
use crate::facts::PartitionKey;

#[derive(Debug, Error)]
pub enum MartError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Write conflict: table '{table}' key '{key}' was already written in this run")]
    WriteConflict { table: String, key: PartitionKey },

    #[error("Row key arity {actual} does not match table '{table}' dimensions ({expected})")]
    KeyArity {
        table: String,
        expected: usize,
        actual: usize,
    },
}

pub type MartResult<T> = Result<T, MartError>;

/// Denormalized output record for one partition key: every metric column
/// of the target table, updated together or not at all.
#[derive(Debug, Clone, PartialEq)]
pub struct MartRow {
    pub key: PartitionKey,
    /// (metric name, value, flag) in table column order.
    pub values: Vec<(String, Option<f64>, CoverageFlag)>,
}

/// SQLite-backed mart database. Single writer: all writes for a run go
/// through one `MartDb`, serializing them per table by construction.
pub struct MartDb {
    conn: Connection,
    /// (table, key) pairs written in the current run; a repeat is a
    /// WriteConflict, detected before anything for that key is committed.
    written: BTreeSet<(String, PartitionKey)>,
}

impl MartDb {
    pub fn open(path: &Path) -> MartResult<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn,
            written: BTreeSet::new(),
        })
    }

    /// In-memory mart (for testing).
    pub fn open_in_memory() -> MartResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            written: BTreeSet::new(),
        })
    }

    /// Reset per-run write tracking. Called once at the start of each run;
    /// reruns may legitimately rewrite partitions from earlier runs.
    pub fn begin_run(&mut self) {
        self.written.clear();
    }

    /// Read access for downstream consumers and tests. Mart tables are
    /// read-only to everything but the materializer.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn ensure_table(&self, table: &str, dims: &[String], metrics: &[String]) -> MartResult<()> {
        let mut columns: Vec<String> = dims
            .iter()
            .map(|d| format!("\"{}\" TEXT NOT NULL", d))
            .collect();
        for m in metrics {
            columns.push(format!("\"{}\" REAL", m));
            columns.push(format!("\"{}_flag\" TEXT NOT NULL", m));
        }
        let key_cols: Vec<String> = dims.iter().map(|d| format!("\"{}\"", d)).collect();
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({}, PRIMARY KEY ({}))",
            table,
            columns.join(", "),
            key_cols.join(", ")
        );
        self.conn.execute_batch(&sql)?;
        Ok(())
    }

    /// Replace the given partitions of `table`.
    ///
    /// Each row's delete + insert runs in one transaction: all metric
    /// columns for the key land together or not at all. Rows must cover
    /// the full metric column set of the table (the engine assembles them
    /// that way); a second write to the same key in one run aborts with
    /// WriteConflict before touching that key.
    pub fn materialize(
        &mut self,
        table: &str,
        dims: &[String],
        metrics: &[String],
        rows: &[MartRow],
    ) -> MartResult<usize> {
        self.ensure_table(table, dims, metrics)?;

        let delete_sql = format!(
            "DELETE FROM \"{}\" WHERE {}",
            table,
            dims.iter()
                .map(|d| format!("\"{}\" = ?", d))
                .collect::<Vec<_>>()
                .join(" AND ")
        );
        let mut insert_cols: Vec<String> = dims.iter().map(|d| format!("\"{}\"", d)).collect();
        for m in metrics {
            insert_cols.push(format!("\"{}\"", m));
            insert_cols.push(format!("\"{}_flag\"", m));
        }
        let placeholders: Vec<&str> = insert_cols.iter().map(|_| "?").collect();
        let insert_sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            table,
            insert_cols.join(", "),
            placeholders.join(", ")
        );

        for row in rows {
            if row.key.arity() != dims.len() {
                return Err(MartError::KeyArity {
                    table: table.to_string(),
                    expected: dims.len(),
                    actual: row.key.arity(),
                });
            }
            let run_key = (table.to_string(), row.key.clone());
            if !self.written.insert(run_key) {
                return Err(MartError::WriteConflict {
                    table: table.to_string(),
                    key: row.key.clone(),
                });
            }

            let tx = self.conn.transaction()?;
            tx.execute(&delete_sql, params_from_iter(row.key.values()))?;

            let mut params: Vec<rusqlite::types::Value> = row
                .key
                .values()
                .iter()
                .map(|v| rusqlite::types::Value::Text(v.clone()))
                .collect();
            for metric in metrics {
                let (value, flag) = row
                    .values
                    .iter()
                    .find(|(name, _, _)| name == metric)
                    .map(|(_, v, f)| (*v, *f))
                    .unwrap_or((None, CoverageFlag::Partial));
                params.push(match value {
                    Some(v) => rusqlite::types::Value::Real(v),
                    None => rusqlite::types::Value::Null,
                });
                params.push(rusqlite::types::Value::Text(flag.as_str().to_string()));
            }
            tx.execute(&insert_sql, params_from_iter(params))?;
            tx.commit()?;
        }

        Ok(rows.len())
    }

    /// Write dual-aggregate rollup rows to `<table>_rollup`.
    pub fn materialize_rollup(
        &mut self,
        table: &str,
        dims: &[String],
        metric: &str,
        groups: &[(PartitionKey, DualSum)],
    ) -> MartResult<usize> {
        let rollup_table = format!("{}_rollup", table);
        let mut columns: Vec<String> = dims
            .iter()
            .map(|d| format!("\"{}\" TEXT NOT NULL", d))
            .collect();
        columns.push("\"metric\" TEXT NOT NULL".to_string());
        columns.push("\"known_sum\" REAL NOT NULL".to_string());
        columns.push("\"total_sum_min\" REAL NOT NULL".to_string());
        columns.push("\"partial_rows\" INTEGER NOT NULL".to_string());
        let mut key_cols: Vec<String> = dims.iter().map(|d| format!("\"{}\"", d)).collect();
        key_cols.push("\"metric\"".to_string());
        let create_sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({}, PRIMARY KEY ({}))",
            rollup_table,
            columns.join(", "),
            key_cols.join(", ")
        );
        self.conn.execute_batch(&create_sql)?;

        let delete_sql = format!(
            "DELETE FROM \"{}\" WHERE {} AND \"metric\" = ?",
            rollup_table,
            dims.iter()
                .map(|d| format!("\"{}\" = ?", d))
                .collect::<Vec<_>>()
                .join(" AND ")
        );
        let insert_sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            rollup_table,
            key_cols
                .iter()
                .map(String::as_str)
                .chain(["\"known_sum\"", "\"total_sum_min\"", "\"partial_rows\""])
                .collect::<Vec<_>>()
                .join(", "),
            vec!["?"; dims.len() + 4].join(", ")
        );

        for (key, agg) in groups {
            if key.arity() != dims.len() {
                return Err(MartError::KeyArity {
                    table: rollup_table.clone(),
                    expected: dims.len(),
                    actual: key.arity(),
                });
            }
            let run_key = (
                rollup_table.clone(),
                PartitionKey::new(
                    key.values()
                        .iter()
                        .cloned()
                        .chain([metric.to_string()]),
                ),
            );
            if !self.written.insert(run_key) {
                return Err(MartError::WriteConflict {
                    table: rollup_table.clone(),
                    key: key.clone(),
                });
            }

            let tx = self.conn.transaction()?;
            {
                let mut params: Vec<rusqlite::types::Value> = key
                    .values()
                    .iter()
                    .map(|v| rusqlite::types::Value::Text(v.clone()))
                    .collect();
                params.push(rusqlite::types::Value::Text(metric.to_string()));
                tx.execute(&delete_sql, params_from_iter(params.clone()))?;
                params.push(rusqlite::types::Value::Real(agg.known_sum));
                params.push(rusqlite::types::Value::Real(agg.total_sum_min));
                params.push(rusqlite::types::Value::Integer(agg.partial_rows as i64));
                tx.execute(&insert_sql, params_from_iter(params))?;
            }
            tx.commit()?;
        }

        Ok(groups.len())
    }
}
