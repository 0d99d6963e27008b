mod common;

use csv_steward::classify::{CriticalColumnSet, Lexicon, identify_critical_columns};
use csv_steward::dataset::{Column, ColumnData, Dataset};
use csv_steward::diff::{CellDiffStyle, DiffOutcome, compare, diff_datasets};
use csv_steward::snapshot::SnapshotStore;
use proptest::prelude::*;

use common::accounts;

fn critical_for(dataset: &Dataset) -> CriticalColumnSet {
    identify_critical_columns(&dataset.column_names(), &Lexicon::default())
}

#[test]
fn edited_balance_is_flagged_critical() {
    let baseline = accounts();
    let mut store = SnapshotStore::new();
    store.capture(&baseline);

    let mut current = baseline.clone();
    current
        .replace_data(
            "balance",
            ColumnData::Int64(vec![Some(1000), Some(1500), Some(250)]),
        )
        .unwrap();

    let outcome = compare(&current, store.baseline(), &critical_for(&current));
    let grid = outcome.grid().expect("same row count yields a grid");

    let edited: Vec<_> = grid
        .edited_cells()
        .map(|cell| (cell.row, cell.column.to_string(), cell.style))
        .collect();
    assert_eq!(
        edited,
        vec![(1, "balance".to_string(), CellDiffStyle::EditedCritical)]
    );
    assert_eq!(grid.count(CellDiffStyle::Unchanged), 8);
    assert_eq!(grid.style(1, "notes"), Some(CellDiffStyle::Unchanged));
}

#[test]
fn no_snapshot_is_its_own_signal() {
    let outcome = compare(&accounts(), None, &CriticalColumnSet::default());
    assert_eq!(outcome, DiffOutcome::NoBaseline);
}

#[test]
fn deleted_and_added_columns_are_not_diffed() {
    let baseline = accounts();
    let mut current = baseline.clone();
    current.remove_columns(&["notes"]);
    current
        .push_column(Column::new(
            "risk_score",
            ColumnData::Int64(vec![Some(9), Some(9), Some(9)]),
        ))
        .unwrap();

    let outcome = diff_datasets(&current, &baseline, &critical_for(&current));
    let grid = outcome.grid().unwrap();
    assert_eq!(
        grid.columns(),
        ["customer_id", "balance", "risk_score"].map(String::from)
    );
    assert!(grid.is_clean());
}

#[test]
fn narrowed_types_do_not_count_as_edits() {
    let baseline = accounts();
    let mut current = baseline.clone();
    csv_steward::optimize::optimize(&mut current);

    let outcome = diff_datasets(&current, &baseline, &critical_for(&current));
    assert!(outcome.grid().unwrap().is_clean());
}

#[test]
fn row_count_change_skips_the_grid() {
    let baseline = accounts();
    let current = Dataset::new(
        baseline
            .columns()
            .iter()
            .map(|c| Column::new(c.name.clone(), truncate(&c.data)))
            .collect(),
    )
    .unwrap();

    let outcome = diff_datasets(&current, &baseline, &CriticalColumnSet::default());
    assert_eq!(
        outcome,
        DiffOutcome::StructuralChange {
            baseline_rows: 3,
            current_rows: 2
        }
    );
}

fn truncate(data: &ColumnData) -> ColumnData {
    match data {
        ColumnData::Int64(v) => ColumnData::Int64(v[..2].to_vec()),
        ColumnData::Text(v) => ColumnData::Text(v[..2].to_vec()),
        other => other.clone(),
    }
}

fn cells() -> impl Strategy<Value = Vec<(Option<i64>, Option<i64>)>> {
    prop::collection::vec(
        (prop::option::of(0i64..4), prop::option::of(0i64..4)),
        1..30,
    )
}

proptest! {
    #[test]
    fn missing_on_both_sides_is_never_edited(pairs in cells()) {
        let (before, after): (Vec<_>, Vec<_>) = pairs.iter().copied().unzip();
        let baseline = Dataset::new(vec![Column::new("loan_amount", ColumnData::Int64(before))]).unwrap();
        let current = Dataset::new(vec![Column::new("loan_amount", ColumnData::Int64(after))]).unwrap();

        let outcome = diff_datasets(&current, &baseline, &critical_for(&current));
        let grid = outcome.grid().unwrap();
        for (row, (left, right)) in pairs.iter().enumerate() {
            let style = grid.style(row, "loan_amount").unwrap();
            if left.is_none() && right.is_none() {
                prop_assert_eq!(style, CellDiffStyle::Unchanged);
            }
            if left != right {
                prop_assert_eq!(style, CellDiffStyle::EditedCritical);
            }
            prop_assert_ne!(style, CellDiffStyle::Edited);
        }
    }
}
