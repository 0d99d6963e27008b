//! In-memory dataset model.
//!
//! A [`Dataset`] is an ordered list of uniquely named [`Column`]s of equal
//! length. Each column owns a [`ColumnData`], a closed tagged union over the
//! supported native storage types. Native types are grouped into the semantic
//! [`ColumnTypeCategory`] buckets reported to users.
//!
//! Missing cells are always `None`; there is no sentinel encoding.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    mem::size_of,
    str::FromStr,
};

use anyhow::anyhow;
use chrono::{NaiveDateTime, NaiveTime};
use half::f16;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::data::Value;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatasetError {
    #[error("Column '{0}' not found")]
    UnknownColumn(String),
    #[error("Column '{0}' appears more than once")]
    DuplicateColumn(String),
    #[error("Column '{column}' has {actual} row(s) but the dataset has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NativeType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    Float16,
    Float32,
    Float64,
    Boolean,
    Text,
    Categorical,
    DateTime,
    Time,
}

impl NativeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NativeType::Int8 => "int8",
            NativeType::Int16 => "int16",
            NativeType::Int32 => "int32",
            NativeType::Int64 => "int64",
            NativeType::UInt8 => "uint8",
            NativeType::UInt16 => "uint16",
            NativeType::UInt32 => "uint32",
            NativeType::Float16 => "float16",
            NativeType::Float32 => "float32",
            NativeType::Float64 => "float64",
            NativeType::Boolean => "bool",
            NativeType::Text => "object",
            NativeType::Categorical => "category",
            NativeType::DateTime => "datetime64[ns]",
            NativeType::Time => "time",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &[
            "int8",
            "int16",
            "int32",
            "int64",
            "uint8",
            "uint16",
            "uint32",
            "float16",
            "float32",
            "float64",
            "bool",
            "object",
            "category",
            "datetime64[ns]",
            "time",
        ]
    }

    pub fn category(&self) -> ColumnTypeCategory {
        match self {
            NativeType::Int64 => ColumnTypeCategory::Integer64,
            NativeType::Int32 | NativeType::UInt32 => ColumnTypeCategory::Integer32,
            NativeType::Int16 | NativeType::UInt16 => ColumnTypeCategory::Integer16,
            NativeType::Int8 | NativeType::UInt8 => ColumnTypeCategory::Integer8,
            NativeType::Float64 => ColumnTypeCategory::Float64,
            NativeType::Float32 => ColumnTypeCategory::Float32,
            NativeType::Float16 => ColumnTypeCategory::Float16,
            NativeType::Text => ColumnTypeCategory::String,
            NativeType::DateTime => ColumnTypeCategory::Date,
            NativeType::Boolean => ColumnTypeCategory::Boolean,
            NativeType::Categorical => ColumnTypeCategory::Categorical,
            NativeType::Time => ColumnTypeCategory::Other,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            NativeType::Int8
                | NativeType::Int16
                | NativeType::Int32
                | NativeType::Int64
                | NativeType::UInt8
                | NativeType::UInt16
                | NativeType::UInt32
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            NativeType::Float16 | NativeType::Float32 | NativeType::Float64
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, NativeType::Text | NativeType::Categorical)
    }

    /// Inclusive value range of an integer type.
    pub fn integer_bounds(&self) -> Option<(i64, i64)> {
        match self {
            NativeType::Int8 => Some((i8::MIN as i64, i8::MAX as i64)),
            NativeType::Int16 => Some((i16::MIN as i64, i16::MAX as i64)),
            NativeType::Int32 => Some((i32::MIN as i64, i32::MAX as i64)),
            NativeType::Int64 => Some((i64::MIN, i64::MAX)),
            NativeType::UInt8 => Some((0, u8::MAX as i64)),
            NativeType::UInt16 => Some((0, u16::MAX as i64)),
            NativeType::UInt32 => Some((0, u32::MAX as i64)),
            _ => None,
        }
    }

    /// Bytes per cell for fixed-width storage; `None` for text and categorical.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            NativeType::Int8 | NativeType::UInt8 | NativeType::Boolean => Some(1),
            NativeType::Int16 | NativeType::UInt16 | NativeType::Float16 => Some(2),
            NativeType::Int32 | NativeType::UInt32 | NativeType::Float32 => Some(4),
            NativeType::Int64 | NativeType::Float64 | NativeType::DateTime => Some(8),
            NativeType::Time => Some(size_of::<NaiveTime>()),
            NativeType::Text | NativeType::Categorical => None,
        }
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NativeType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "int8" => Ok(NativeType::Int8),
            "int16" => Ok(NativeType::Int16),
            "int32" => Ok(NativeType::Int32),
            "int64" | "int" | "integer" => Ok(NativeType::Int64),
            "uint8" => Ok(NativeType::UInt8),
            "uint16" => Ok(NativeType::UInt16),
            "uint32" => Ok(NativeType::UInt32),
            "float16" => Ok(NativeType::Float16),
            "float32" => Ok(NativeType::Float32),
            "float64" | "float" | "double" => Ok(NativeType::Float64),
            "bool" | "boolean" => Ok(NativeType::Boolean),
            "object" | "string" | "text" | "str" => Ok(NativeType::Text),
            "category" | "categorical" => Ok(NativeType::Categorical),
            "datetime64[ns]" | "datetime" | "date" | "timestamp" => Ok(NativeType::DateTime),
            "time" => Ok(NativeType::Time),
            _ => Err(anyhow!(
                "Unknown column type '{value}'. Supported types: {}",
                NativeType::variants().join(", ")
            )),
        }
    }
}

/// Storage-independent semantic type reported in type histograms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ColumnTypeCategory {
    Integer64,
    Integer32,
    Integer16,
    Integer8,
    Float64,
    Float32,
    Float16,
    String,
    Date,
    Boolean,
    Categorical,
    Other,
}

impl ColumnTypeCategory {
    pub fn label(&self) -> &'static str {
        match self {
            ColumnTypeCategory::Integer64 => "Integer64",
            ColumnTypeCategory::Integer32 => "Integer32",
            ColumnTypeCategory::Integer16 => "Integer16",
            ColumnTypeCategory::Integer8 => "Integer8",
            ColumnTypeCategory::Float64 => "Float64",
            ColumnTypeCategory::Float32 => "Float32",
            ColumnTypeCategory::Float16 => "Float16",
            ColumnTypeCategory::String => "String",
            ColumnTypeCategory::Date => "Date",
            ColumnTypeCategory::Boolean => "Boolean",
            ColumnTypeCategory::Categorical => "Categorical",
            ColumnTypeCategory::Other => "Other",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ColumnTypeCategory::Integer64 => "64-bit Integer: Large whole numbers",
            ColumnTypeCategory::Integer32 => "32-bit Integer: Smaller whole numbers",
            ColumnTypeCategory::Integer16 => "16-bit Integer: Small-range integers",
            ColumnTypeCategory::Integer8 => "8-bit Integer: Very small integers",
            ColumnTypeCategory::Float64 => "64-bit Float: Precise decimal values",
            ColumnTypeCategory::Float32 => "32-bit Float: Less precise decimals",
            ColumnTypeCategory::Float16 => "16-bit Float: Low-precision decimals",
            ColumnTypeCategory::String => "Text or mixed-type values",
            ColumnTypeCategory::Date => "Datetime values with nanosecond precision",
            ColumnTypeCategory::Boolean => "True or False values",
            ColumnTypeCategory::Categorical => "Discrete categories or labels",
            ColumnTypeCategory::Other => "Unrecognized or custom data type",
        }
    }
}

impl fmt::Display for ColumnTypeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Dictionary-encoded text column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CategoricalData {
    dictionary: Vec<String>,
    codes: Vec<Option<u32>>,
}

impl CategoricalData {
    /// Encodes values in first-seen order. Returns `None` when the dictionary
    /// would not fit in 32-bit codes.
    pub fn encode<I, S>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = Option<S>>,
        S: AsRef<str>,
    {
        let mut lookup: HashMap<String, u32> = HashMap::new();
        let mut dictionary = Vec::new();
        let mut codes = Vec::new();
        for value in values {
            let code = match value {
                Some(text) => {
                    let text = text.as_ref();
                    match lookup.get(text) {
                        Some(code) => Some(*code),
                        None => {
                            let code = u32::try_from(dictionary.len()).ok()?;
                            lookup.insert(text.to_string(), code);
                            dictionary.push(text.to_string());
                            Some(code)
                        }
                    }
                }
                None => None,
            };
            codes.push(code);
        }
        Some(Self { dictionary, codes })
    }

    pub fn get(&self, row: usize) -> Option<&str> {
        let code = (*self.codes.get(row)?)?;
        self.dictionary.get(code as usize).map(String::as_str)
    }

    pub fn dictionary(&self) -> &[String] {
        &self.dictionary
    }

    pub fn codes(&self) -> &[Option<u32>] {
        &self.codes
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Overwrites one row, growing the dictionary on first use of a label.
    pub fn set(&mut self, row: usize, value: Option<&str>) -> bool {
        if row >= self.codes.len() {
            return false;
        }
        let code = match value {
            Some(text) => match self.dictionary.iter().position(|entry| entry == text) {
                Some(idx) => idx as u32,
                None => {
                    let Ok(code) = u32::try_from(self.dictionary.len()) else {
                        return false;
                    };
                    self.dictionary.push(text.to_string());
                    code
                }
            },
            None => {
                self.codes[row] = None;
                return true;
            }
        };
        self.codes[row] = Some(code);
        true
    }

    /// Smallest code width able to address the dictionary.
    pub fn code_width(&self) -> usize {
        match self.dictionary.len() {
            n if n <= u8::MAX as usize + 1 => 1,
            n if n <= u16::MAX as usize + 1 => 2,
            _ => 4,
        }
    }

    fn memory_usage(&self) -> usize {
        let dictionary_bytes: usize = self
            .dictionary
            .iter()
            .map(|entry| size_of::<String>() + entry.len())
            .sum();
        self.codes.len() * self.code_width() + validity_bytes(self.codes.len()) + dictionary_bytes
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int8(Vec<Option<i8>>),
    Int16(Vec<Option<i16>>),
    Int32(Vec<Option<i32>>),
    Int64(Vec<Option<i64>>),
    UInt8(Vec<Option<u8>>),
    UInt16(Vec<Option<u16>>),
    UInt32(Vec<Option<u32>>),
    Float16(Vec<Option<f16>>),
    Float32(Vec<Option<f32>>),
    Float64(Vec<Option<f64>>),
    Boolean(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
    Categorical(CategoricalData),
    DateTime(Vec<Option<NaiveDateTime>>),
    Time(Vec<Option<NaiveTime>>),
}

impl ColumnData {
    pub fn native_type(&self) -> NativeType {
        match self {
            ColumnData::Int8(_) => NativeType::Int8,
            ColumnData::Int16(_) => NativeType::Int16,
            ColumnData::Int32(_) => NativeType::Int32,
            ColumnData::Int64(_) => NativeType::Int64,
            ColumnData::UInt8(_) => NativeType::UInt8,
            ColumnData::UInt16(_) => NativeType::UInt16,
            ColumnData::UInt32(_) => NativeType::UInt32,
            ColumnData::Float16(_) => NativeType::Float16,
            ColumnData::Float32(_) => NativeType::Float32,
            ColumnData::Float64(_) => NativeType::Float64,
            ColumnData::Boolean(_) => NativeType::Boolean,
            ColumnData::Text(_) => NativeType::Text,
            ColumnData::Categorical(_) => NativeType::Categorical,
            ColumnData::DateTime(_) => NativeType::DateTime,
            ColumnData::Time(_) => NativeType::Time,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int8(v) => v.len(),
            ColumnData::Int16(v) => v.len(),
            ColumnData::Int32(v) => v.len(),
            ColumnData::Int64(v) => v.len(),
            ColumnData::UInt8(v) => v.len(),
            ColumnData::UInt16(v) => v.len(),
            ColumnData::UInt32(v) => v.len(),
            ColumnData::Float16(v) => v.len(),
            ColumnData::Float32(v) => v.len(),
            ColumnData::Float64(v) => v.len(),
            ColumnData::Boolean(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::Categorical(c) => c.len(),
            ColumnData::DateTime(v) => v.len(),
            ColumnData::Time(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell at `row` widened to a [`Value`]. Out-of-range rows read as missing.
    pub fn value(&self, row: usize) -> Option<Value> {
        match self {
            ColumnData::Int8(v) => cell(v, row).map(|x| Value::Integer(x as i64)),
            ColumnData::Int16(v) => cell(v, row).map(|x| Value::Integer(x as i64)),
            ColumnData::Int32(v) => cell(v, row).map(|x| Value::Integer(x as i64)),
            ColumnData::Int64(v) => cell(v, row).map(Value::Integer),
            ColumnData::UInt8(v) => cell(v, row).map(|x| Value::Integer(x as i64)),
            ColumnData::UInt16(v) => cell(v, row).map(|x| Value::Integer(x as i64)),
            ColumnData::UInt32(v) => cell(v, row).map(|x| Value::Integer(x as i64)),
            ColumnData::Float16(v) => cell(v, row).map(|x| Value::Float(x.to_f64())),
            ColumnData::Float32(v) => cell(v, row).map(|x| Value::Float(x as f64)),
            ColumnData::Float64(v) => cell(v, row).map(Value::Float),
            ColumnData::Boolean(v) => cell(v, row).map(Value::Boolean),
            ColumnData::Text(v) => v
                .get(row)
                .and_then(|x| x.as_ref())
                .map(|s| Value::String(s.clone())),
            ColumnData::Categorical(c) => c.get(row).map(|s| Value::String(s.to_string())),
            ColumnData::DateTime(v) => cell(v, row).map(Value::DateTime),
            ColumnData::Time(v) => cell(v, row).map(Value::Time),
        }
    }

    /// Copies `source[source_row]` into `self[row]`. Both sides must share a
    /// native type; returns false otherwise or when either row is out of range.
    pub fn splice(&mut self, row: usize, source: &ColumnData, source_row: usize) -> bool {
        match (self, source) {
            (ColumnData::Int8(d), ColumnData::Int8(s)) => put(d, row, s, source_row),
            (ColumnData::Int16(d), ColumnData::Int16(s)) => put(d, row, s, source_row),
            (ColumnData::Int32(d), ColumnData::Int32(s)) => put(d, row, s, source_row),
            (ColumnData::Int64(d), ColumnData::Int64(s)) => put(d, row, s, source_row),
            (ColumnData::UInt8(d), ColumnData::UInt8(s)) => put(d, row, s, source_row),
            (ColumnData::UInt16(d), ColumnData::UInt16(s)) => put(d, row, s, source_row),
            (ColumnData::UInt32(d), ColumnData::UInt32(s)) => put(d, row, s, source_row),
            (ColumnData::Float16(d), ColumnData::Float16(s)) => put(d, row, s, source_row),
            (ColumnData::Float32(d), ColumnData::Float32(s)) => put(d, row, s, source_row),
            (ColumnData::Float64(d), ColumnData::Float64(s)) => put(d, row, s, source_row),
            (ColumnData::Boolean(d), ColumnData::Boolean(s)) => put(d, row, s, source_row),
            (ColumnData::Text(d), ColumnData::Text(s)) => put(d, row, s, source_row),
            (ColumnData::DateTime(d), ColumnData::DateTime(s)) => put(d, row, s, source_row),
            (ColumnData::Time(d), ColumnData::Time(s)) => put(d, row, s, source_row),
            (ColumnData::Categorical(d), ColumnData::Categorical(s)) => {
                source_row < s.len() && d.set(row, s.get(source_row))
            }
            _ => false,
        }
    }

    pub fn values(&self) -> impl Iterator<Item = Option<Value>> + '_ {
        (0..self.len()).map(move |row| self.value(row))
    }

    /// Canonical string form of a cell; `None` for anything that counts as missing.
    pub fn display(&self, row: usize) -> Option<String> {
        self.value(row)
            .filter(|value| !value.is_missing())
            .map(|value| value.as_display())
    }

    pub fn null_count(&self) -> usize {
        (0..self.len())
            .filter(|row| self.display(*row).is_none())
            .count()
    }

    pub fn distinct_count(&self) -> usize {
        (0..self.len())
            .filter_map(|row| self.display(row))
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn memory_usage(&self) -> usize {
        let rows = self.len();
        match self {
            ColumnData::Text(values) => values
                .iter()
                .map(|value| size_of::<Option<String>>() + value.as_ref().map_or(0, String::len))
                .sum(),
            ColumnData::Categorical(data) => data.memory_usage(),
            other => {
                let width = other.native_type().fixed_width().unwrap_or(0);
                rows * width + validity_bytes(rows)
            }
        }
    }
}

fn cell<T: Copy>(values: &[Option<T>], row: usize) -> Option<T> {
    values.get(row).copied().flatten()
}

fn put<T: Clone>(dest: &mut [Option<T>], row: usize, source: &[Option<T>], source_row: usize) -> bool {
    match (dest.get_mut(row), source.get(source_row)) {
        (Some(slot), Some(value)) => {
            *slot = value.clone();
            true
        }
        _ => false,
    }
}

fn validity_bytes(rows: usize) -> usize {
    rows.div_ceil(8)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn native_type(&self) -> NativeType {
        self.data.native_type()
    }
}

/// SHA-256 over column names, native types and canonical cell displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    columns: Vec<Column>,
}

impl Dataset {
    pub fn new(columns: Vec<Column>) -> Result<Self, DatasetError> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(DatasetError::DuplicateColumn(column.name.clone()));
            }
        }
        if let Some(first) = columns.first() {
            let expected = first.data.len();
            if let Some(bad) = columns.iter().find(|c| c.data.len() != expected) {
                return Err(DatasetError::LengthMismatch {
                    column: bad.name.clone(),
                    expected,
                    actual: bad.data.len(),
                });
            }
        }
        Ok(Self { columns })
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.data.len())
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn native_types(&self) -> Vec<(String, NativeType)> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.native_type()))
            .collect()
    }

    pub fn memory_usage(&self) -> usize {
        self.columns.iter().map(|c| c.data.memory_usage()).sum()
    }

    /// Swaps in new storage for an existing column. The row count must not change.
    pub fn replace_data(&mut self, name: &str, data: ColumnData) -> Result<ColumnData, DatasetError> {
        let expected = self.row_count();
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| DatasetError::UnknownColumn(name.to_string()))?;
        if data.len() != expected {
            return Err(DatasetError::LengthMismatch {
                column: name.to_string(),
                expected,
                actual: data.len(),
            });
        }
        Ok(std::mem::replace(&mut column.data, data))
    }

    pub fn push_column(&mut self, column: Column) -> Result<(), DatasetError> {
        if self.contains(&column.name) {
            return Err(DatasetError::DuplicateColumn(column.name));
        }
        if !self.columns.is_empty() && column.data.len() != self.row_count() {
            return Err(DatasetError::LengthMismatch {
                column: column.name,
                expected: self.row_count(),
                actual: column.data.len(),
            });
        }
        self.columns.push(column);
        Ok(())
    }

    /// Removes every named column that exists; returns the names actually removed.
    pub fn remove_columns<S: AsRef<str>>(&mut self, names: &[S]) -> Vec<String> {
        let targets: HashSet<&str> = names.iter().map(|n| n.as_ref()).collect();
        let mut removed = Vec::new();
        self.columns.retain(|column| {
            if targets.contains(column.name.as_str()) {
                removed.push(column.name.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// New dataset holding only the named columns that exist here, in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Dataset {
        let columns = names
            .iter()
            .filter_map(|name| self.column(name.as_ref()).cloned())
            .collect();
        Dataset { columns }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        for column in &self.columns {
            hasher.update(column.name.as_bytes());
            hasher.update([0u8]);
            hasher.update(column.native_type().as_str().as_bytes());
            hasher.update([0u8]);
            for row in 0..column.data.len() {
                match column.data.display(row) {
                    Some(text) => {
                        hasher.update([1u8]);
                        hasher.update((text.len() as u64).to_le_bytes());
                        hasher.update(text.as_bytes());
                    }
                    None => hasher.update([2u8]),
                }
            }
            hasher.update([0xffu8]);
        }
        Fingerprint(hasher.finalize().into())
    }
}
