mod common;

use csv_steward::data::Value;
use csv_steward::dataset::{Column, ColumnData, ColumnTypeCategory, Dataset, NativeType};
use csv_steward::optimize::{UnchangedReason, optimize};
use proptest::prelude::*;

use common::text_column;

fn same_value(before: &Option<Value>, after: &Option<Value>) -> bool {
    match (before, after) {
        (None, None) => true,
        (Some(Value::Integer(a)), Some(Value::Integer(b))) => a == b,
        (Some(Value::Integer(a)), Some(Value::Float(f))) => *f as i64 == *a && *a as f64 == *f,
        (Some(Value::Float(a)), Some(Value::Integer(b))) => (*b as f64).to_bits() == a.to_bits(),
        (Some(Value::Float(a)), Some(Value::Float(b))) => {
            a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
        }
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[test]
fn narrow_integer_columns_pick_the_smallest_width() {
    let mut dataset = Dataset::new(vec![
        Column::new("age", ColumnData::Int64(vec![Some(10), Some(20), Some(255)])),
        Column::new("age2", ColumnData::Int64(vec![Some(10), Some(20), Some(300)])),
    ])
    .unwrap();

    let report = optimize(&mut dataset);

    assert_eq!(dataset.column("age").unwrap().native_type(), NativeType::UInt8);
    assert_eq!(dataset.column("age2").unwrap().native_type(), NativeType::UInt16);
    assert_eq!(report.categories.get(&ColumnTypeCategory::Integer8), Some(&1));
    assert_eq!(report.categories.get(&ColumnTypeCategory::Integer16), Some(&1));
    assert!(report.memory_after < report.memory_before);
    assert_eq!(dataset.column("age2").unwrap().data.display(2).as_deref(), Some("300"));
}

#[test]
fn unconverted_columns_report_their_reason() {
    let mut dataset = Dataset::new(vec![
        Column::new("ratio", ColumnData::Float64(vec![Some(0.1), Some(0.2), Some(0.3)])),
        Column::new("city", text_column(&["Lagos", "Lima", "Oslo"])),
        Column::new("flag", ColumnData::Boolean(vec![Some(true), None, Some(false)])),
    ])
    .unwrap();

    let report = optimize(&mut dataset);

    let reason = |column: &str| report.outcome(column).unwrap().as_ref().unwrap_err().reason;
    assert_eq!(reason("ratio"), UnchangedReason::NoLosslessFit);
    assert_eq!(
        reason("city"),
        UnchangedReason::HighCardinality {
            distinct: 3,
            rows: 3
        }
    );
    assert_eq!(reason("flag"), UnchangedReason::NotApplicable);
    assert_eq!(report.converted().count(), 0);
    assert_eq!(report.memory_before, report.memory_after);
}

#[test]
fn repetitive_text_becomes_categorical_with_identical_display() {
    let branches = ["north", "south", "north", "", "north", "south"];
    let mut dataset = Dataset::new(vec![Column::new("branch", text_column(&branches))]).unwrap();

    optimize(&mut dataset);

    let column = dataset.column("branch").unwrap();
    assert_eq!(column.native_type(), NativeType::Categorical);
    for (row, expected) in branches.iter().enumerate() {
        let expected = (!expected.is_empty()).then(|| expected.to_string());
        assert_eq!(column.data.display(row), expected);
    }
}

#[test]
fn empty_columns_are_left_alone() {
    let mut dataset = Dataset::new(vec![Column::new("id", ColumnData::Int64(Vec::new()))]).unwrap();
    let report = optimize(&mut dataset);
    assert_eq!(
        report.outcome("id").unwrap().as_ref().unwrap_err().reason,
        UnchangedReason::Empty
    );
}

fn integer_cells() -> impl Strategy<Value = Vec<Option<i64>>> {
    let value = prop_oneof![
        any::<i64>(),
        -200i64..300,
        0i64..70_000,
        (0u32..40).prop_map(|shift| 1i64 << shift),
    ];
    prop::collection::vec(prop::option::of(value), 0..40)
}

fn float_cells() -> impl Strategy<Value = Vec<Option<f64>>> {
    let value = prop_oneof![
        any::<f64>(),
        (-1000i32..1000).prop_map(|v| f64::from(v) / 4.0),
        (-100i32..100).prop_map(f64::from),
        Just(f64::NAN),
    ];
    prop::collection::vec(prop::option::of(value), 0..40)
}

fn label_cells() -> impl Strategy<Value = Vec<Option<String>>> {
    prop::collection::vec(prop::option::of("[a-c]{0,2}"), 0..40)
}

fn sample_dataset(
    ints: Vec<Option<i64>>,
    floats: Vec<Option<f64>>,
    labels: Vec<Option<String>>,
) -> Dataset {
    let rows = ints.len().min(floats.len()).min(labels.len());
    Dataset::new(vec![
        Column::new("ints", ColumnData::Int64(ints[..rows].to_vec())),
        Column::new("floats", ColumnData::Float64(floats[..rows].to_vec())),
        Column::new("labels", ColumnData::Text(labels[..rows].to_vec())),
    ])
    .unwrap()
}

proptest! {
    #[test]
    fn optimization_preserves_every_value(
        ints in integer_cells(),
        floats in float_cells(),
        labels in label_cells(),
    ) {
        let original = sample_dataset(ints, floats, labels);
        let mut optimized = original.clone();
        optimize(&mut optimized);

        prop_assert_eq!(optimized.row_count(), original.row_count());
        prop_assert_eq!(optimized.column_names(), original.column_names());
        for (before, after) in original.columns().iter().zip(optimized.columns()) {
            for row in 0..original.row_count() {
                let (left, right) = (before.data.value(row), after.data.value(row));
                if before.native_type() == NativeType::Text {
                    prop_assert_eq!(before.data.display(row), after.data.display(row));
                } else {
                    prop_assert!(
                        same_value(&left, &right),
                        "{} row {}: {:?} became {:?}", before.name, row, left, right
                    );
                }
            }
        }
    }

    #[test]
    fn optimization_is_idempotent(
        ints in integer_cells(),
        floats in float_cells(),
        labels in label_cells(),
    ) {
        let mut dataset = sample_dataset(ints, floats, labels);
        optimize(&mut dataset);
        let types = dataset.native_types();
        let footprint = dataset.memory_usage();

        let second = optimize(&mut dataset);

        prop_assert_eq!(dataset.native_types(), types);
        prop_assert_eq!(second.memory_before, footprint);
        prop_assert_eq!(second.memory_after, footprint);
        prop_assert_eq!(second.converted().count(), 0);
    }
}
