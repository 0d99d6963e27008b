//! Session context for one uploaded dataset.
//!
//! A [`Session`] owns the live dataset, its snapshot baseline, the critical
//! column set and the derived table name. It is created on upload and replaced
//! wholesale by [`Session::replace_upload`]; nothing about it is global.
//! Automatic steps (optimization, classification, diffing) never fail. User
//! actions (edits, retype, delete, save, query) return their outcome.

use std::io::Write;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    classify::{CriticalColumnSet, Lexicon, identify_critical_columns},
    dataset::{ColumnData, Dataset, NativeType},
    diff::{self, DiffOutcome},
    io_utils,
    optimize::{self, OptimizationReport},
    persistence::{PersistenceError, PersistenceGateway, QueryOutcome, TableName},
    retype::{self, ConversionError},
    snapshot::{Snapshot, SnapshotStore},
};

/// Result of offering an edited dataset to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// The edit left the dataset as it was; nothing was saved.
    NoChange,
    Saved(String),
    /// The edit was kept in memory but persisting it failed.
    SaveFailed(PersistenceError),
}

impl EditOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, EditOutcome::NoChange)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub removed: Vec<String>,
    /// `None` when nothing was removed and no save was attempted.
    pub save: Option<Result<String, PersistenceError>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Retyped {
    pub column: String,
    pub from: NativeType,
    pub to: NativeType,
    /// Present values that became missing during the conversion.
    pub coerced: usize,
}

#[derive(Debug, Clone)]
pub struct Session {
    upload_name: String,
    table: TableName,
    lexicon: Lexicon,
    dataset: Dataset,
    snapshot: SnapshotStore,
    critical: CriticalColumnSet,
    report: Option<OptimizationReport>,
}

impl Session {
    /// Captures the baseline before anything else touches `dataset`.
    pub fn start(
        upload_name: impl Into<String>,
        dataset: Dataset,
        lexicon: Lexicon,
    ) -> Result<Self, PersistenceError> {
        Self::with_store(upload_name.into(), dataset, lexicon, SnapshotStore::new())
    }

    fn with_store(
        upload_name: String,
        dataset: Dataset,
        lexicon: Lexicon,
        mut snapshot: SnapshotStore,
    ) -> Result<Self, PersistenceError> {
        let table = TableName::from_upload(&upload_name)?;
        snapshot.capture(&dataset);
        let critical = identify_critical_columns(&dataset.column_names(), &lexicon);
        info!(
            "Loaded '{}' ({} row(s), {} column(s), {} critical) as table `{}`",
            upload_name,
            dataset.row_count(),
            dataset.column_count(),
            critical.len(),
            table
        );
        Ok(Self {
            upload_name,
            table,
            lexicon,
            dataset,
            snapshot,
            critical,
            report: None,
        })
    }

    /// Ends this session and starts one for a new upload with the same lexicon.
    pub fn replace_upload(
        self,
        upload_name: impl Into<String>,
        dataset: Dataset,
    ) -> Result<Session, PersistenceError> {
        let mut store = self.snapshot;
        store.reset();
        Self::with_store(upload_name.into(), dataset, self.lexicon, store)
    }

    pub fn upload_name(&self) -> &str {
        &self.upload_name
    }

    pub fn table_name(&self) -> &TableName {
        &self.table
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn critical_columns(&self) -> &CriticalColumnSet {
        &self.critical
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.baseline()
    }

    pub fn last_report(&self) -> Option<&OptimizationReport> {
        self.report.as_ref()
    }

    /// Narrows storage in place. Never saves.
    pub fn optimize(&mut self) -> &OptimizationReport {
        let report = optimize::optimize(&mut self.dataset);
        self.report.insert(report)
    }

    /// Replaces the live dataset if `edited` differs from it. Returns whether
    /// it did.
    pub fn stage_edit(&mut self, edited: Dataset) -> bool {
        if edited.fingerprint() == self.dataset.fingerprint() {
            debug!("Edit left the dataset unchanged");
            return false;
        }
        let renamed = edited.column_names() != self.dataset.column_names();
        self.dataset = edited;
        if renamed {
            self.reclassify();
        }
        true
    }

    /// Stages `edited` and persists it when it changed anything.
    pub fn apply_edit<G: PersistenceGateway + ?Sized>(
        &mut self,
        edited: Dataset,
        gateway: &mut G,
    ) -> EditOutcome {
        if !self.stage_edit(edited) {
            return EditOutcome::NoChange;
        }
        match self.save(gateway) {
            Ok(message) => EditOutcome::Saved(message),
            Err(err) => EditOutcome::SaveFailed(err),
        }
    }

    /// Parses `raw` strictly (empty is missing) and applies it as an edit of a
    /// single cell. Numeric cells are read at the widest type of their family;
    /// when the value does not fit the narrowed storage exactly, the column is
    /// widened back instead of rounding or refusing the edit.
    pub fn set_cell<G: PersistenceGateway + ?Sized>(
        &mut self,
        row: usize,
        column: &str,
        raw: &str,
        gateway: &mut G,
    ) -> Result<EditOutcome, ConversionError> {
        let current = &self
            .dataset
            .column(column)
            .ok_or_else(|| ConversionError::UnknownColumn(column.to_string()))?
            .data;
        if row >= current.len() {
            return Err(ConversionError::RowOutOfRange {
                column: column.to_string(),
                row,
                rows: current.len(),
            });
        }
        let target = current.native_type();

        let (mut updated, value) = if target.is_numeric() {
            let widest = self.widest_numeric(column, target);
            let parsed = match parse_cell(column, row, raw, widest) {
                Err(err) if widest == NativeType::Int64 => {
                    parse_cell(column, row, raw, NativeType::Float64).map_err(|_| err)?
                }
                other => other?,
            };
            match retype::convert_column(column, &parsed, target) {
                Ok(narrowed) if narrowed.data.display(0) == parsed.display(0) => {
                    (current.clone(), narrowed.data)
                }
                _ => {
                    let wide = parsed.native_type();
                    let widened = widen(column, current, wide).ok_or_else(|| {
                        ConversionError::InvalidValue {
                            column: column.to_string(),
                            row,
                            value: raw.to_string(),
                            target,
                        }
                    })?;
                    debug!("Column '{column}' widened from {target} to {wide} for an edit");
                    (widened, parsed)
                }
            }
        } else {
            (current.clone(), parse_cell(column, row, raw, target)?)
        };

        if !updated.splice(row, &value, 0) {
            return Err(ConversionError::Unsupported {
                column: column.to_string(),
                from: value.native_type(),
                to: updated.native_type(),
            });
        }
        let mut edited = self.dataset.clone();
        edited
            .replace_data(column, updated)
            .map_err(|_| ConversionError::UnknownColumn(column.to_string()))?;
        Ok(self.apply_edit(edited, gateway))
    }

    /// Float64 for float storage or a column that arrived as floats, Int64
    /// otherwise.
    fn widest_numeric(&self, column: &str, current: NativeType) -> NativeType {
        let arrived_as_float = self
            .snapshot
            .baseline()
            .and_then(|snapshot| snapshot.original_type(column))
            .is_some_and(|native| native.is_float());
        if current.is_float() || arrived_as_float {
            NativeType::Float64
        } else {
            NativeType::Int64
        }
    }

    /// Explicit conversion of one column. The dataset is untouched on error
    /// and nothing is saved on success.
    pub fn retype(&mut self, column: &str, target: NativeType) -> Result<Retyped, ConversionError> {
        let current = &self
            .dataset
            .column(column)
            .ok_or_else(|| ConversionError::UnknownColumn(column.to_string()))?
            .data;
        let from = current.native_type();
        let conversion = retype::convert_column(column, current, target)?;
        self.dataset
            .replace_data(column, conversion.data)
            .map_err(|_| ConversionError::UnknownColumn(column.to_string()))?;
        info!("Converted column '{column}' from {from} to {target}");
        if conversion.coerced > 0 {
            warn!(
                "{} value(s) in '{column}' could not be converted and are now missing",
                conversion.coerced
            );
        }
        Ok(Retyped {
            column: column.to_string(),
            from,
            to: target,
            coerced: conversion.coerced,
        })
    }

    /// Drops every named column present and saves if any were.
    pub fn delete_columns<S, G>(&mut self, names: &[S], gateway: &mut G) -> DeleteOutcome
    where
        S: AsRef<str>,
        G: PersistenceGateway + ?Sized,
    {
        let removed = self.dataset.remove_columns(names);
        if removed.is_empty() {
            debug!("No matching columns to delete");
            return DeleteOutcome {
                removed,
                save: None,
            };
        }
        info!("Deleted column(s): {}", removed.join(", "));
        self.reclassify();
        let save = Some(self.save(gateway));
        DeleteOutcome { removed, save }
    }

    pub fn save<G: PersistenceGateway + ?Sized>(
        &self,
        gateway: &mut G,
    ) -> Result<String, PersistenceError> {
        gateway.save(&self.dataset, &self.table)
    }

    pub fn query<G: PersistenceGateway + ?Sized>(
        &self,
        gateway: &mut G,
        sql: &str,
    ) -> Result<QueryOutcome, PersistenceError> {
        gateway.query(sql)
    }

    pub fn diff(&self) -> DiffOutcome {
        diff::compare(&self.dataset, self.snapshot.baseline(), &self.critical)
    }

    pub fn export_csv<W: Write>(&self, writer: W) -> Result<()> {
        io_utils::write_delimited(&self.dataset, writer, io_utils::DEFAULT_CSV_DELIMITER)
            .with_context(|| format!("Exporting '{}'", self.upload_name))
    }

    pub fn export_csv_string(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.export_csv(&mut buffer)?;
        String::from_utf8(buffer).context("Export produced invalid UTF-8")
    }

    fn reclassify(&mut self) {
        self.critical = identify_critical_columns(&self.dataset.column_names(), &self.lexicon);
        debug!("Critical columns: {:?}", self.critical.iter().collect::<Vec<_>>());
    }
}

/// One raw cell read as `target`. Any coercion counts as an invalid value.
fn parse_cell(
    column: &str,
    row: usize,
    raw: &str,
    target: NativeType,
) -> Result<ColumnData, ConversionError> {
    let staged = ColumnData::Text(vec![(!raw.is_empty()).then(|| raw.to_string())]);
    let invalid = || ConversionError::InvalidValue {
        column: column.to_string(),
        row,
        value: raw.to_string(),
        target,
    };
    match retype::convert_column(column, &staged, target) {
        Ok(parsed) if parsed.coerced == 0 => Ok(parsed.data),
        Ok(_) | Err(ConversionError::InvalidValue { .. }) => Err(invalid()),
        Err(other) => Err(other),
    }
}

/// `data` re-stored as `wide`, provided every cell keeps its value.
fn widen(column: &str, data: &ColumnData, wide: NativeType) -> Option<ColumnData> {
    let widened = retype::convert_column(column, data, wide).ok()?.data;
    (0..data.len())
        .all(|row| widened.display(row) == data.display(row))
        .then_some(widened)
}
