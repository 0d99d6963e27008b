//! Backing-store boundary.
//!
//! The core only talks to a [`PersistenceGateway`]; [`SqliteGateway`] is the
//! bundled implementation. Saves replace the whole table and failures are
//! reported once, never retried.

use std::path::Path;

use log::{debug, info};
use rusqlite::{Batch, Connection, params_from_iter, types::Value as SqlValue, types::ValueRef};
use serde::Serialize;
use thiserror::Error;

use crate::{
    data::{Value, format_float},
    dataset::{ColumnTypeCategory, Dataset},
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("Cannot derive a table name from '{0}'")]
    InvalidTableName(String),
    #[error("Error saving `{table}`: {message}")]
    Save { table: String, message: String },
    #[error("Query Error: {0}")]
    Query(String),
    #[error("Database error: {0}")]
    Database(String),
}

/// Table identifier derived from an uploaded file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableName(String);

impl TableName {
    /// Final path component, cut at the first `.`, lowercased, spaces as `_`.
    pub fn from_upload(file_name: &str) -> Result<Self, PersistenceError> {
        let base = Path::new(file_name)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = base.split('.').next().unwrap_or_default();
        let derived = stem.trim().to_lowercase().replace(' ', "_");
        if derived.is_empty() {
            return Err(PersistenceError::InvalidTableName(file_name.to_string()));
        }
        Ok(Self(derived))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn quoted(&self) -> String {
        quote_identifier(&self.0)
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryOutcome {
    Rows(QueryResult),
    /// The statement produced no result set.
    NoRows { affected: usize },
}

pub trait PersistenceGateway {
    /// Replaces `table` with the full contents of `dataset`; returns a
    /// human-readable confirmation.
    fn save(&mut self, dataset: &Dataset, table: &TableName) -> Result<String, PersistenceError>;

    fn query(&mut self, sql: &str) -> Result<QueryOutcome, PersistenceError>;

    fn list_tables(&mut self) -> Result<Vec<String>, PersistenceError>;
}

pub struct SqliteGateway {
    conn: Connection,
}

impl SqliteGateway {
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path).map_err(|err| {
            PersistenceError::Database(format!("opening {}: {err}", path.display()))
        })?;
        debug!("Opened SQLite store at {:?}", path);
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()
            .map_err(|err| PersistenceError::Database(err.to_string()))?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// `prepare` compiles only the first statement of `sql`, so anything after
    /// it is refused up front instead of being skipped.
    fn ensure_single_statement(&self, sql: &str) -> Result<(), PersistenceError> {
        let mut batch = Batch::new(&self.conn, sql);
        let first = batch
            .next()
            .map_err(|err| PersistenceError::Query(err.to_string()))?;
        if first.is_none() {
            return Err(PersistenceError::Query("no SQL statement to run".to_string()));
        }
        match batch.next() {
            Ok(None) => Ok(()),
            _ => Err(PersistenceError::Query(
                "only one SQL statement can run at a time".to_string(),
            )),
        }
    }

    fn write_table(&mut self, dataset: &Dataset, table: &TableName) -> rusqlite::Result<usize> {
        let definitions = dataset
            .columns()
            .iter()
            .map(|column| {
                format!(
                    "{} {}",
                    quote_identifier(&column.name),
                    affinity(column.native_type().category())
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        let names = dataset
            .columns()
            .iter()
            .map(|column| quote_identifier(&column.name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=dataset.column_count())
            .map(|idx| format!("?{idx}"))
            .collect::<Vec<_>>()
            .join(", ");

        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} ({definitions});",
            table = table.quoted()
        ))?;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} ({names}) VALUES ({placeholders})",
                table.quoted()
            ))?;
            for row in 0..dataset.row_count() {
                let values = dataset
                    .columns()
                    .iter()
                    .map(|column| to_sql_value(column.data.value(row)));
                insert.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;
        Ok(dataset.row_count())
    }
}

impl PersistenceGateway for SqliteGateway {
    fn save(&mut self, dataset: &Dataset, table: &TableName) -> Result<String, PersistenceError> {
        if dataset.is_empty() {
            return Err(PersistenceError::Save {
                table: table.to_string(),
                message: "dataset has no columns".to_string(),
            });
        }
        let rows = self
            .write_table(dataset, table)
            .map_err(|err| PersistenceError::Save {
                table: table.to_string(),
                message: err.to_string(),
            })?;
        info!("Saved {rows} row(s) to table `{table}`");
        Ok(format!("Data saved to `{table}` successfully."))
    }

    fn query(&mut self, sql: &str) -> Result<QueryOutcome, PersistenceError> {
        let query_error = |err: rusqlite::Error| PersistenceError::Query(err.to_string());
        self.ensure_single_statement(sql)?;
        let mut statement = self.conn.prepare(sql).map_err(query_error)?;
        let columns: Vec<String> = statement
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        if columns.is_empty() {
            let affected = statement.execute([]).map_err(query_error)?;
            debug!("Statement affected {affected} row(s)");
            return Ok(QueryOutcome::NoRows { affected });
        }

        let mut rows = Vec::new();
        let mut cursor = statement.query([]).map_err(query_error)?;
        while let Some(row) = cursor.next().map_err(query_error)? {
            let mut cells = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                cells.push(render_sql_value(row.get_ref(idx).map_err(query_error)?));
            }
            rows.push(cells);
        }
        debug!("Query returned {} row(s)", rows.len());
        Ok(QueryOutcome::Rows(QueryResult { columns, rows }))
    }

    fn list_tables(&mut self) -> Result<Vec<String>, PersistenceError> {
        let mut statement = self
            .conn
            .prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .map_err(|err| PersistenceError::Database(err.to_string()))?;
        let names = statement
            .query_map([], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|err| PersistenceError::Database(err.to_string()))?;
        Ok(names)
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn affinity(category: ColumnTypeCategory) -> &'static str {
    match category {
        ColumnTypeCategory::Integer64
        | ColumnTypeCategory::Integer32
        | ColumnTypeCategory::Integer16
        | ColumnTypeCategory::Integer8
        | ColumnTypeCategory::Boolean => "INTEGER",
        ColumnTypeCategory::Float64 | ColumnTypeCategory::Float32 | ColumnTypeCategory::Float16 => {
            "REAL"
        }
        _ => "TEXT",
    }
}

fn to_sql_value(value: Option<Value>) -> SqlValue {
    match value.filter(|v| !v.is_missing()) {
        None => SqlValue::Null,
        Some(Value::Integer(i)) => SqlValue::Integer(i),
        Some(Value::Float(f)) => SqlValue::Real(f),
        Some(Value::Boolean(b)) => SqlValue::Integer(i64::from(b)),
        Some(other) => SqlValue::Text(other.as_display()),
    }
}

fn render_sql_value(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(format_float(f)),
        ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Some(format!("<{} byte blob>", bytes.len())),
    }
}
