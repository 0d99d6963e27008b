//! Cell-level comparison of the live dataset against its snapshot.
//!
//! Rows are aligned by position. Inserting or deleting a row in the middle of
//! the table therefore shifts every later comparison; a row-count change is
//! reported as [`DiffOutcome::StructuralChange`] instead of a grid.

use serde::Serialize;

use crate::{
    classify::CriticalColumnSet,
    dataset::{ColumnData, Dataset},
    snapshot::Snapshot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellDiffStyle {
    Unchanged,
    Edited,
    EditedCritical,
}

impl CellDiffStyle {
    pub fn is_edited(&self) -> bool {
        !matches!(self, CellDiffStyle::Unchanged)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditedCell<'a> {
    pub row: usize,
    pub column: &'a str,
    pub style: CellDiffStyle,
}

/// Row-major grid of styles over every column of the current dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffGrid {
    columns: Vec<String>,
    cells: Vec<Vec<CellDiffStyle>>,
}

impl DiffGrid {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.cells.len()
    }

    pub fn row(&self, row: usize) -> Option<&[CellDiffStyle]> {
        self.cells.get(row).map(Vec::as_slice)
    }

    pub fn style(&self, row: usize, column: &str) -> Option<CellDiffStyle> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.cells.get(row)?.get(idx).copied()
    }

    pub fn edited_cells(&self) -> impl Iterator<Item = EditedCell<'_>> {
        self.cells.iter().enumerate().flat_map(move |(row, styles)| {
            styles
                .iter()
                .zip(&self.columns)
                .filter(|(style, _)| style.is_edited())
                .map(move |(style, column)| EditedCell {
                    row,
                    column: column.as_str(),
                    style: *style,
                })
        })
    }

    pub fn count(&self, style: CellDiffStyle) -> usize {
        self.cells.iter().flatten().filter(|s| **s == style).count()
    }

    pub fn is_clean(&self) -> bool {
        self.edited_cells().next().is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffOutcome {
    Grid(DiffGrid),
    /// Row counts differ, so positional comparison is meaningless.
    StructuralChange {
        baseline_rows: usize,
        current_rows: usize,
    },
    NoBaseline,
}

impl DiffOutcome {
    pub fn grid(&self) -> Option<&DiffGrid> {
        match self {
            DiffOutcome::Grid(grid) => Some(grid),
            _ => None,
        }
    }
}

pub fn compare(
    current: &Dataset,
    baseline: Option<&Snapshot>,
    critical: &CriticalColumnSet,
) -> DiffOutcome {
    match baseline {
        Some(snapshot) => diff_datasets(current, snapshot.dataset(), critical),
        None => DiffOutcome::NoBaseline,
    }
}

pub fn diff_datasets(
    current: &Dataset,
    baseline: &Dataset,
    critical: &CriticalColumnSet,
) -> DiffOutcome {
    let baseline_rows = baseline.row_count();
    let current_rows = current.row_count();
    if baseline_rows != current_rows {
        return DiffOutcome::StructuralChange {
            baseline_rows,
            current_rows,
        };
    }

    let columns = current.column_names();
    let aligned = baseline.select(&columns);
    let mut cells = vec![Vec::with_capacity(columns.len()); current_rows];
    for column in current.columns() {
        let reference = aligned.column(&column.name).map(|c| &c.data);
        let edited_style = if critical.contains(&column.name) {
            CellDiffStyle::EditedCritical
        } else {
            CellDiffStyle::Edited
        };
        for (row, styles) in cells.iter_mut().enumerate() {
            let style = match reference {
                Some(reference) if cell_changed(reference, &column.data, row) => edited_style,
                _ => CellDiffStyle::Unchanged,
            };
            styles.push(style);
        }
    }

    DiffOutcome::Grid(DiffGrid { columns, cells })
}

/// Missing on both sides is never an edit; otherwise canonical strings decide.
fn cell_changed(baseline: &ColumnData, current: &ColumnData, row: usize) -> bool {
    baseline.display(row) != current.display(row)
}
