//! Dashboard figures for a dataset: headline metrics, the data dictionary and
//! numeric summaries.

use itertools::{Itertools, MinMaxResult};
use serde::Serialize;

use crate::{
    dataset::{ColumnTypeCategory, Dataset},
    optimize::category_histogram,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetMetrics {
    pub null_values: usize,
    pub rows: usize,
    pub columns: usize,
    /// Number of distinct native storage types in use.
    pub distinct_types: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataDictionaryEntry {
    pub column: String,
    pub type_label: String,
    pub unique_values: usize,
    pub missing_values: usize,
    /// First-row display value.
    pub example: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    pub column: String,
    pub count: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation; needs at least two values.
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeShare {
    pub category: ColumnTypeCategory,
    pub columns: usize,
    pub description: &'static str,
}

pub fn dataset_metrics(dataset: &Dataset) -> DatasetMetrics {
    DatasetMetrics {
        null_values: dataset.columns().iter().map(|c| c.data.null_count()).sum(),
        rows: dataset.row_count(),
        columns: dataset.column_count(),
        distinct_types: dataset
            .columns()
            .iter()
            .map(|c| c.native_type())
            .unique()
            .count(),
    }
}

pub fn data_dictionary(dataset: &Dataset) -> Vec<DataDictionaryEntry> {
    dataset
        .columns()
        .iter()
        .map(|column| DataDictionaryEntry {
            column: column.name.clone(),
            type_label: column.native_type().category().label().to_string(),
            unique_values: column.data.distinct_count(),
            missing_values: column.data.null_count(),
            example: column.data.display(0),
        })
        .collect()
}

pub fn type_breakdown(dataset: &Dataset) -> Vec<TypeShare> {
    category_histogram(dataset)
        .into_iter()
        .map(|(category, columns)| TypeShare {
            category,
            columns,
            description: category.description(),
        })
        .collect()
}

pub fn numeric_summaries(dataset: &Dataset) -> Vec<NumericSummary> {
    dataset
        .columns()
        .iter()
        .filter(|column| column.native_type().is_numeric())
        .map(|column| {
            let values: Vec<f64> = column
                .data
                .values()
                .flatten()
                .filter_map(|value| value.as_f64())
                .filter(|value| !value.is_nan())
                .collect();
            summarize(&column.name, &values)
        })
        .collect()
}

fn summarize(column: &str, values: &[f64]) -> NumericSummary {
    let count = values.len();
    let mean = (count > 0).then(|| values.iter().sum::<f64>() / count as f64);
    let std = match (mean, count) {
        (Some(mean), n) if n > 1 => {
            let squares: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            Some((squares / (n - 1) as f64).sqrt())
        }
        _ => None,
    };
    let (min, max) = match values.iter().copied().minmax() {
        MinMaxResult::NoElements => (None, None),
        MinMaxResult::OneElement(v) => (Some(v), Some(v)),
        MinMaxResult::MinMax(lo, hi) => (Some(lo), Some(hi)),
    };
    NumericSummary {
        column: column.to_string(),
        count,
        mean,
        std,
        min,
        max,
    }
}
