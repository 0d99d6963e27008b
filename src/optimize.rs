//! Best-effort storage narrowing.
//!
//! Every column is offered one conversion: low-cardinality text becomes
//! categorical, 64-bit numbers move to the narrowest integer width that holds
//! every value exactly, or failing that the narrowest exact float width.
//! Nothing here raises; each column records a [`ColumnOutcome`] instead.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
};

use half::f16;
use log::{debug, info};
use serde::Serialize;

use crate::{
    data::Value,
    dataset::{CategoricalData, ColumnData, ColumnTypeCategory, Dataset, NativeType},
};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Converted {
    pub from: NativeType,
    pub to: NativeType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Unchanged {
    pub native: NativeType,
    pub reason: UnchangedReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnchangedReason {
    /// The storage type is never narrowed.
    NotApplicable,
    /// Too many distinct values for a dictionary to pay off.
    HighCardinality { distinct: usize, rows: usize },
    /// No narrower type holds every value exactly.
    NoLosslessFit,
    /// The dictionary would not fit in 32-bit codes.
    DictionaryOverflow,
    Empty,
}

impl fmt::Display for UnchangedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnchangedReason::NotApplicable => write!(f, "type is not narrowed"),
            UnchangedReason::HighCardinality { distinct, rows } => {
                write!(f, "{distinct} distinct value(s) across {rows} row(s)")
            }
            UnchangedReason::NoLosslessFit => write!(f, "no narrower type preserves every value"),
            UnchangedReason::DictionaryOverflow => write!(f, "too many categories"),
            UnchangedReason::Empty => write!(f, "column has no rows"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnOutcome {
    pub column: String,
    pub result: Result<Converted, Unchanged>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationReport {
    pub memory_before: usize,
    pub memory_after: usize,
    pub outcomes: Vec<ColumnOutcome>,
    pub categories: BTreeMap<ColumnTypeCategory, usize>,
}

impl OptimizationReport {
    pub fn memory_before_mb(&self) -> f64 {
        self.memory_before as f64 / BYTES_PER_MB
    }

    pub fn memory_after_mb(&self) -> f64 {
        self.memory_after as f64 / BYTES_PER_MB
    }

    pub fn converted(&self) -> impl Iterator<Item = (&str, &Converted)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|c| (o.column.as_str(), c)))
    }

    pub fn unchanged(&self) -> impl Iterator<Item = (&str, &Unchanged)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|u| (o.column.as_str(), u)))
    }

    pub fn outcome(&self, column: &str) -> Option<&Result<Converted, Unchanged>> {
        self.outcomes
            .iter()
            .find(|o| o.column == column)
            .map(|o| &o.result)
    }
}

/// Count of columns per semantic category.
pub fn category_histogram(dataset: &Dataset) -> BTreeMap<ColumnTypeCategory, usize> {
    let mut histogram = BTreeMap::new();
    for column in dataset.columns() {
        *histogram.entry(column.native_type().category()).or_insert(0) += 1;
    }
    histogram
}

pub fn optimize(dataset: &mut Dataset) -> OptimizationReport {
    let memory_before = dataset.memory_usage();
    let mut outcomes = Vec::with_capacity(dataset.column_count());

    for name in dataset.column_names() {
        let Some(column) = dataset.column(&name) else {
            continue;
        };
        let from = column.native_type();
        let result = match optimize_column(&column.data) {
            Ok(narrowed) => {
                let to = narrowed.native_type();
                match dataset.replace_data(&name, narrowed) {
                    Ok(_) => Ok(Converted { from, to }),
                    Err(err) => {
                        debug!("Column '{name}': narrowed data rejected ({err})");
                        Err(Unchanged {
                            native: from,
                            reason: UnchangedReason::NoLosslessFit,
                        })
                    }
                }
            }
            Err(reason) => Err(Unchanged {
                native: from,
                reason,
            }),
        };
        match &result {
            Ok(converted) => debug!("Column '{name}': {} -> {}", converted.from, converted.to),
            Err(unchanged) => debug!("Column '{name}' kept as {}: {}", unchanged.native, unchanged.reason),
        }
        outcomes.push(ColumnOutcome {
            column: name,
            result,
        });
    }

    let report = OptimizationReport {
        memory_before,
        memory_after: dataset.memory_usage(),
        outcomes,
        categories: category_histogram(dataset),
    };
    info!(
        "Memory usage reduced from {:.2} MB to {:.2} MB ({} of {} column(s) narrowed)",
        report.memory_before_mb(),
        report.memory_after_mb(),
        report.converted().count(),
        report.outcomes.len()
    );
    report
}

/// Narrower storage for one column, or the reason it stays as is.
pub fn optimize_column(data: &ColumnData) -> Result<ColumnData, UnchangedReason> {
    let applicable = matches!(
        data,
        ColumnData::Text(_) | ColumnData::Int64(_) | ColumnData::Float64(_)
    );
    if !applicable {
        return Err(UnchangedReason::NotApplicable);
    }
    if data.is_empty() {
        return Err(UnchangedReason::Empty);
    }
    match data {
        ColumnData::Text(values) => categorize(values),
        ColumnData::Int64(values) => downcast_integers(values)
            .or_else(|| {
                let as_floats = exact_floats(values)?;
                downcast_floats(&as_floats).filter(|narrowed| integers_survive(values, narrowed))
            })
            .ok_or(UnchangedReason::NoLosslessFit),
        ColumnData::Float64(values) => integral_values(values)
            .and_then(|ints| downcast_integers(&ints))
            .or_else(|| downcast_floats(values))
            .ok_or(UnchangedReason::NoLosslessFit),
        _ => Err(UnchangedReason::NotApplicable),
    }
}

fn categorize(values: &[Option<String>]) -> Result<ColumnData, UnchangedReason> {
    let rows = values.len();
    let distinct = values
        .iter()
        .flatten()
        .map(String::as_str)
        .collect::<HashSet<_>>()
        .len();
    if distinct * 2 >= rows {
        return Err(UnchangedReason::HighCardinality { distinct, rows });
    }
    CategoricalData::encode(values.iter().map(|v| v.as_deref()))
        .map(ColumnData::Categorical)
        .ok_or(UnchangedReason::DictionaryOverflow)
}

/// Narrowest 8/16/32-bit integer storage. Non-negative columns use the
/// unsigned family.
fn downcast_integers(values: &[Option<i64>]) -> Option<ColumnData> {
    if values.iter().flatten().all(|v| *v >= 0) {
        narrow::<u8>(values)
            .map(ColumnData::UInt8)
            .or_else(|| narrow::<u16>(values).map(ColumnData::UInt16))
            .or_else(|| narrow::<u32>(values).map(ColumnData::UInt32))
    } else {
        narrow::<i8>(values)
            .map(ColumnData::Int8)
            .or_else(|| narrow::<i16>(values).map(ColumnData::Int16))
            .or_else(|| narrow::<i32>(values).map(ColumnData::Int32))
    }
}

fn narrow<T: TryFrom<i64>>(values: &[Option<i64>]) -> Option<Vec<Option<T>>> {
    values
        .iter()
        .map(|value| match value {
            Some(v) => T::try_from(*v).ok().map(Some),
            None => Some(None),
        })
        .collect()
}

/// Every present value as an exact `i64`, if the column is integral.
fn integral_values(values: &[Option<f64>]) -> Option<Vec<Option<i64>>> {
    values
        .iter()
        .map(|value| match value {
            Some(v) => {
                let fits = v.is_finite()
                    && v.fract() == 0.0
                    && !(*v == 0.0 && v.is_sign_negative())
                    && *v >= i64::MIN as f64
                    && *v < i64::MAX as f64;
                fits.then_some(Some(*v as i64))
            }
            None => Some(None),
        })
        .collect()
}

fn exact_floats(values: &[Option<i64>]) -> Option<Vec<Option<f64>>> {
    values
        .iter()
        .map(|value| match value {
            Some(v) => {
                let widened = *v as f64;
                (widened >= i64::MIN as f64 && widened < i64::MAX as f64 && widened as i64 == *v)
                    .then_some(Some(widened))
            }
            None => Some(None),
        })
        .collect()
}

fn integers_survive(original: &[Option<i64>], narrowed: &ColumnData) -> bool {
    original
        .iter()
        .enumerate()
        .all(|(row, value)| match (value, narrowed.value(row)) {
            (None, None) => true,
            (Some(v), Some(Value::Float(f))) => f as i64 == *v && *v as f64 == f,
            _ => false,
        })
}

fn downcast_floats(values: &[Option<f64>]) -> Option<ColumnData> {
    let half = values
        .iter()
        .map(|value| match value {
            Some(v) => {
                let narrowed = f16::from_f64(*v);
                same_float(narrowed.to_f64(), *v).then_some(Some(narrowed))
            }
            None => Some(None),
        })
        .collect::<Option<Vec<_>>>();
    if let Some(half) = half {
        return Some(ColumnData::Float16(half));
    }
    values
        .iter()
        .map(|value| match value {
            Some(v) => {
                let narrowed = *v as f32;
                same_float(narrowed as f64, *v).then_some(Some(narrowed))
            }
            None => Some(None),
        })
        .collect::<Option<Vec<_>>>()
        .map(ColumnData::Float32)
}

fn same_float(left: f64, right: f64) -> bool {
    left.to_bits() == right.to_bits() || (left.is_nan() && right.is_nan())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_pick_the_unsigned_family_when_non_negative() {
        let narrowed = optimize_column(&ColumnData::Int64(vec![Some(10), Some(20), Some(255)]))
            .expect("narrowed");
        assert_eq!(narrowed.native_type(), NativeType::UInt8);

        let signed = optimize_column(&ColumnData::Int64(vec![Some(-1), Some(127)])).unwrap();
        assert_eq!(signed.native_type(), NativeType::Int8);
    }

    #[test]
    fn fractional_floats_fall_back_to_float_widths() {
        let half = optimize_column(&ColumnData::Float64(vec![Some(0.5), Some(1.25)])).unwrap();
        assert_eq!(half.native_type(), NativeType::Float16);

        let single = optimize_column(&ColumnData::Float64(vec![Some(0.1f32 as f64)])).unwrap();
        assert_eq!(single.native_type(), NativeType::Float32);

        let precise = optimize_column(&ColumnData::Float64(vec![Some(0.1)]));
        assert_eq!(precise, Err(UnchangedReason::NoLosslessFit));
    }

    #[test]
    fn negative_zero_is_not_treated_as_integral() {
        let narrowed = optimize_column(&ColumnData::Float64(vec![Some(-0.0), Some(1.0)])).unwrap();
        assert_eq!(narrowed.native_type(), NativeType::Float16);
        assert!(matches!(narrowed.value(0), Some(Value::Float(f)) if f.is_sign_negative()));
    }

    #[test]
    fn already_narrow_columns_are_not_applicable() {
        let result = optimize_column(&ColumnData::UInt8(vec![Some(1)]));
        assert_eq!(result, Err(UnchangedReason::NotApplicable));
    }
}
