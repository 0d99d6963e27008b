#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use csv_steward::dataset::{Column, ColumnData, Dataset};
use csv_steward::persistence::{
    PersistenceError, PersistenceGateway, QueryOutcome, TableName,
};
use tempfile::{TempDir, tempdir};

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

pub const ACCOUNTS_CSV: &str = "customer_id,balance,notes\n1,1000,first\n2,1000,\n3,250,third\n";

/// `customer_id`, `balance`, `notes` with three rows; row 1 has no note.
pub fn accounts() -> Dataset {
    Dataset::new(vec![
        Column::new("customer_id", ColumnData::Int64(vec![Some(1), Some(2), Some(3)])),
        Column::new(
            "balance",
            ColumnData::Int64(vec![Some(1000), Some(1000), Some(250)]),
        ),
        Column::new(
            "notes",
            ColumnData::Text(vec![Some("first".into()), None, Some("third".into())]),
        ),
    ])
    .expect("valid dataset")
}

pub fn text_column(values: &[&str]) -> ColumnData {
    ColumnData::Text(
        values
            .iter()
            .map(|v| (!v.is_empty()).then(|| v.to_string()))
            .collect(),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedTable {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: usize,
}

/// Gateway double that remembers every save.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    pub saves: Vec<SavedTable>,
    pub queries: Vec<String>,
}

impl PersistenceGateway for RecordingGateway {
    fn save(&mut self, dataset: &Dataset, table: &TableName) -> Result<String, PersistenceError> {
        self.saves.push(SavedTable {
            table: table.to_string(),
            columns: dataset.column_names(),
            rows: dataset.row_count(),
        });
        Ok(format!("saved {table}"))
    }

    fn query(&mut self, sql: &str) -> Result<QueryOutcome, PersistenceError> {
        self.queries.push(sql.to_string());
        Ok(QueryOutcome::NoRows { affected: 0 })
    }

    fn list_tables(&mut self) -> Result<Vec<String>, PersistenceError> {
        Ok(self.saves.iter().map(|s| s.table.clone()).collect())
    }
}

/// Gateway double whose every call fails.
#[derive(Debug, Default)]
pub struct FailingGateway {
    pub attempts: usize,
}

impl PersistenceGateway for FailingGateway {
    fn save(&mut self, _dataset: &Dataset, table: &TableName) -> Result<String, PersistenceError> {
        self.attempts += 1;
        Err(PersistenceError::Save {
            table: table.to_string(),
            message: "connection refused".into(),
        })
    }

    fn query(&mut self, _sql: &str) -> Result<QueryOutcome, PersistenceError> {
        self.attempts += 1;
        Err(PersistenceError::Query("connection refused".into()))
    }

    fn list_tables(&mut self) -> Result<Vec<String>, PersistenceError> {
        self.attempts += 1;
        Err(PersistenceError::Database("connection refused".into()))
    }
}
