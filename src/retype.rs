//! Explicit, user-requested column conversions.
//!
//! Unlike the optimizer these conversions surface every failure. The rules
//! are a closed table keyed on the target [`NativeType`]:
//!
//! - integer widths accept integers, booleans, integral floats and numeric
//!   text; any other value (or an out-of-range one) is an error
//! - float widths accept anything numeric or numeric text and may round
//! - `bool` accepts booleans, numbers (non-zero is true) and boolean tokens
//! - `object` and `category` accept everything through the canonical display
//! - `datetime64[ns]` accepts text and datetimes; unparsable text becomes
//!   missing instead of failing the column
//! - `time` accepts text and times, strictly

use half::f16;
use log::debug;
use thiserror::Error;

use crate::{
    data::{Value, parse_boolean, parse_naive_time, parse_timestamp},
    dataset::{CategoricalData, ColumnData, NativeType},
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("Column '{0}' not found")]
    UnknownColumn(String),
    #[error("Cannot convert column '{column}' from {from} to {to}")]
    Unsupported {
        column: String,
        from: NativeType,
        to: NativeType,
    },
    #[error("Column '{column}' row {row}: cannot convert '{value}' to {target}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
        target: NativeType,
    },
    #[error("Column '{column}' has too many distinct values for category storage")]
    TooManyCategories { column: String },
    #[error("Row {row} is out of range for column '{column}' ({rows} row(s))")]
    RowOutOfRange {
        column: String,
        row: usize,
        rows: usize,
    },
}

/// Converted storage plus the number of present values that became missing.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub data: ColumnData,
    pub coerced: usize,
}

pub fn convert_column(
    column: &str,
    data: &ColumnData,
    target: NativeType,
) -> Result<Conversion, ConversionError> {
    let source = data.native_type();
    if source == target {
        return Ok(Conversion {
            data: data.clone(),
            coerced: 0,
        });
    }
    let temporal_source = matches!(source, NativeType::DateTime | NativeType::Time);
    let supported = match target {
        t if t.is_numeric() || t == NativeType::Boolean => !temporal_source,
        NativeType::Text | NativeType::Categorical => true,
        NativeType::DateTime => source.is_textual(),
        NativeType::Time => source.is_textual(),
        _ => false,
    };
    if !supported {
        return Err(ConversionError::Unsupported {
            column: column.to_string(),
            from: source,
            to: target,
        });
    }

    let cells: Vec<Option<Value>> = data
        .values()
        .map(|value| value.filter(|v| !v.is_missing()))
        .collect();
    let invalid = |row: usize, value: &Value| ConversionError::InvalidValue {
        column: column.to_string(),
        row,
        value: value.as_display(),
        target,
    };

    let converted = match target {
        NativeType::Int8 => ColumnData::Int8(integers(&cells, &invalid)?),
        NativeType::Int16 => ColumnData::Int16(integers(&cells, &invalid)?),
        NativeType::Int32 => ColumnData::Int32(integers(&cells, &invalid)?),
        NativeType::Int64 => ColumnData::Int64(integers(&cells, &invalid)?),
        NativeType::UInt8 => ColumnData::UInt8(integers(&cells, &invalid)?),
        NativeType::UInt16 => ColumnData::UInt16(integers(&cells, &invalid)?),
        NativeType::UInt32 => ColumnData::UInt32(integers(&cells, &invalid)?),
        NativeType::Float64 => ColumnData::Float64(floats(&cells, &invalid)?),
        NativeType::Float32 => ColumnData::Float32(
            floats(&cells, &invalid)?
                .into_iter()
                .map(|v| v.map(|f| f as f32))
                .collect(),
        ),
        NativeType::Float16 => ColumnData::Float16(
            floats(&cells, &invalid)?
                .into_iter()
                .map(|v| v.map(f16::from_f64))
                .collect(),
        ),
        NativeType::Boolean => ColumnData::Boolean(
            cells
                .iter()
                .enumerate()
                .map(|(row, cell)| cell.as_ref().map(|v| to_bool(v).ok_or_else(|| invalid(row, v))).transpose())
                .collect::<Result<_, _>>()?,
        ),
        NativeType::Text => ColumnData::Text(displays(&cells)),
        NativeType::Categorical => ColumnData::Categorical(
            CategoricalData::encode(displays(&cells)).ok_or_else(|| {
                ConversionError::TooManyCategories {
                    column: column.to_string(),
                }
            })?,
        ),
        NativeType::DateTime => {
            let parsed: Vec<_> = cells
                .iter()
                .map(|cell| match cell {
                    Some(Value::DateTime(dt)) => Some(*dt),
                    Some(other) => parse_timestamp(&other.as_display()).ok(),
                    None => None,
                })
                .collect();
            let coerced = cells
                .iter()
                .zip(&parsed)
                .filter(|(before, after)| before.is_some() && after.is_none())
                .count();
            if coerced > 0 {
                debug!("Column '{column}': {coerced} value(s) could not be read as datetimes and are now missing");
            }
            return Ok(Conversion {
                data: ColumnData::DateTime(parsed),
                coerced,
            });
        }
        NativeType::Time => ColumnData::Time(
            cells
                .iter()
                .enumerate()
                .map(|(row, cell)| match cell {
                    Some(Value::Time(t)) => Ok(Some(*t)),
                    Some(other) => parse_naive_time(other.as_display().trim())
                        .map(Some)
                        .map_err(|_| invalid(row, other)),
                    None => Ok(None),
                })
                .collect::<Result<_, _>>()?,
        ),
    };

    Ok(Conversion {
        data: converted,
        coerced: 0,
    })
}

fn displays(cells: &[Option<Value>]) -> Vec<Option<String>> {
    cells
        .iter()
        .map(|cell| cell.as_ref().map(Value::as_display))
        .collect()
}

fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        Value::Boolean(b) => Some(i64::from(*b)),
        Value::Float(f) => {
            (f.is_finite() && f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .then_some(*f as i64)
        }
        Value::String(s) => s.trim().parse().ok(),
        Value::DateTime(_) | Value::Time(_) => None,
    }
}

fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        other => other.as_f64(),
    }
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Boolean(b) => Some(*b),
        Value::Integer(i) => Some(*i != 0),
        Value::Float(f) => Some(*f != 0.0),
        Value::String(s) => parse_boolean(s).ok(),
        Value::DateTime(_) | Value::Time(_) => None,
    }
}

fn integers<T, F>(cells: &[Option<Value>], invalid: &F) -> Result<Vec<Option<T>>, ConversionError>
where
    T: TryFrom<i64>,
    F: Fn(usize, &Value) -> ConversionError,
{
    cells
        .iter()
        .enumerate()
        .map(|(row, cell)| match cell {
            Some(value) => to_i64(value)
                .and_then(|i| T::try_from(i).ok())
                .map(Some)
                .ok_or_else(|| invalid(row, value)),
            None => Ok(None),
        })
        .collect()
}

fn floats<F>(cells: &[Option<Value>], invalid: &F) -> Result<Vec<Option<f64>>, ConversionError>
where
    F: Fn(usize, &Value) -> ConversionError,
{
    cells
        .iter()
        .enumerate()
        .map(|(row, cell)| match cell {
            Some(value) => to_f64(value).map(Some).ok_or_else(|| invalid(row, value)),
            None => Ok(None),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(values: &[&str]) -> ColumnData {
        ColumnData::Text(
            values
                .iter()
                .map(|v| (!v.is_empty()).then(|| v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn text_to_integer_reports_the_offending_row() {
        let err = convert_column("age", &text(&["1", "x", "3"]), NativeType::Int8).unwrap_err();
        assert_eq!(
            err,
            ConversionError::InvalidValue {
                column: "age".into(),
                row: 1,
                value: "x".into(),
                target: NativeType::Int8,
            }
        );
    }

    #[test]
    fn out_of_range_integers_are_rejected() {
        let data = ColumnData::Int64(vec![Some(300)]);
        assert!(convert_column("n", &data, NativeType::Int8).is_err());
        let ok = convert_column("n", &data, NativeType::Int16).unwrap();
        assert_eq!(ok.data, ColumnData::Int16(vec![Some(300)]));
    }

    #[test]
    fn datetime_conversion_coerces_unparsable_values() {
        let converted =
            convert_column("signup_date", &text(&["2024-01-05", "soon", ""]), NativeType::DateTime)
                .unwrap();
        assert_eq!(converted.coerced, 1);
        assert_eq!(converted.data.display(0).as_deref(), Some("2024-01-05 00:00:00"));
        assert_eq!(converted.data.display(1), None);
        assert_eq!(converted.data.display(2), None);
    }

    #[test]
    fn numeric_to_datetime_is_unsupported() {
        let err = convert_column("n", &ColumnData::Int64(vec![Some(1)]), NativeType::DateTime)
            .unwrap_err();
        assert!(matches!(err, ConversionError::Unsupported { .. }));
    }

    #[test]
    fn anything_converts_to_text_and_category() {
        let data = ColumnData::Float64(vec![Some(1.5), None, Some(2.0)]);
        let text = convert_column("x", &data, NativeType::Text).unwrap();
        assert_eq!(
            text.data,
            ColumnData::Text(vec![Some("1.5".into()), None, Some("2".into())])
        );
        let category = convert_column("x", &data, NativeType::Categorical).unwrap();
        assert_eq!(category.data.native_type(), NativeType::Categorical);
        assert_eq!(category.data.display(2).as_deref(), Some("2"));
    }
}
