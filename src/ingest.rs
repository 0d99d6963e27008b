//! Loading uploads into a [`Dataset`].
//!
//! Delimited text goes through the csv crate; spreadsheets are read from their
//! first worksheet with calamine. Both paths collect raw strings and share the
//! same per-column inference, so a value means the same thing whatever file
//! it came from.

use std::{io::Read, path::Path};

use anyhow::{Context, Result, anyhow, bail};
use calamine::{Data, DataType, Reader, open_workbook_auto};
use chrono::NaiveDateTime;
use encoding_rs::{Encoding, UTF_8};
use log::{debug, info};

use crate::{
    data::{Value, parse_timestamp},
    dataset::{Column, ColumnData, Dataset, NativeType},
    io_utils, retype,
};

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "xlsb", "ods"];

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    /// Overrides the extension-derived delimiter for text formats.
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            encoding: UTF_8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Delimited(u8),
    Spreadsheet,
}

pub fn detect_format(path: &Path, delimiter: Option<u8>) -> SourceFormat {
    let is_spreadsheet = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SPREADSHEET_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        });
    if is_spreadsheet {
        SourceFormat::Spreadsheet
    } else {
        SourceFormat::Delimited(io_utils::resolve_input_delimiter(path, delimiter))
    }
}

pub fn load_dataset(path: &Path, options: &IngestOptions) -> Result<Dataset> {
    let dataset = match detect_format(path, options.delimiter) {
        SourceFormat::Delimited(delimiter) => {
            let reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
            read_records(reader, options.encoding)
        }
        SourceFormat::Spreadsheet => read_spreadsheet(path),
    }
    .with_context(|| format!("Loading {path:?}"))?;
    info!(
        "Ingested {:?}: {} row(s) x {} column(s)",
        path,
        dataset.row_count(),
        dataset.column_count()
    );
    Ok(dataset)
}

pub fn read_delimited<R: Read>(
    reader: R,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<Dataset> {
    read_records(io_utils::open_csv_reader(reader, delimiter), encoding)
}

fn read_records<R: Read>(mut reader: csv::Reader<R>, encoding: &'static Encoding) -> Result<Dataset> {
    let headers = io_utils::reader_headers(&mut reader, encoding)?;
    let mut rows = Vec::new();
    let mut record = csv::ByteRecord::new();
    while reader.read_byte_record(&mut record)? {
        let row = io_utils::decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {}", rows.len() + 1))?;
        rows.push(row);
    }
    build_dataset(headers, rows)
}

pub fn read_spreadsheet(path: &Path) -> Result<Dataset> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|err| anyhow!("Failed to open workbook {path:?}: {err}"))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("Workbook {path:?} has no worksheets"))?
        .map_err(|err| anyhow!("Failed to read first worksheet of {path:?}: {err}"))?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        bail!("First worksheet of {path:?} is empty");
    };
    let headers: Vec<String> = header_row.iter().map(cell_text).collect();

    // Per column: (cells typed as dates, other non-empty cells).
    let mut date_cells = vec![(0usize, 0usize); headers.len()];
    let body: Vec<Vec<String>> = rows
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(idx, cell)| {
                    if let Some(counts) = date_cells.get_mut(idx) {
                        if spreadsheet_datetime(cell).is_some() {
                            counts.0 += 1;
                        } else if !cell.is_empty() {
                            counts.1 += 1;
                        }
                    }
                    cell_text(cell)
                })
                .collect()
        })
        .collect();

    let mut dataset = build_dataset(headers, body)?;
    for (idx, (dates, others)) in date_cells.into_iter().enumerate() {
        if dates == 0 || others > 0 {
            continue;
        }
        let column = &dataset.columns()[idx];
        let name = column.name.clone();
        let converted = retype::convert_column(&name, &column.data, NativeType::DateTime)?;
        dataset.replace_data(&name, converted.data)?;
        debug!("Column '{name}' read as spreadsheet dates");
    }
    Ok(dataset)
}

/// Date-formatted cells. Durations stay numeric.
fn spreadsheet_datetime(cell: &Data) -> Option<NaiveDateTime> {
    match cell {
        Data::DateTime(value) if value.is_datetime() => value.as_datetime(),
        Data::DateTimeIso(text) => parse_timestamp(text).ok(),
        _ => None,
    }
}

fn cell_text(cell: &Data) -> String {
    match spreadsheet_datetime(cell) {
        Some(datetime) => Value::DateTime(datetime).as_display(),
        None => match cell {
            Data::DateTime(value) => value.as_f64().to_string(),
            other => other.as_string().unwrap_or_else(|| other.to_string()),
        },
    }
}

/// Columns from a header row and string rows. Short rows are padded with
/// missing cells.
pub fn build_dataset(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Dataset> {
    let headers: Vec<String> = headers
        .into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let name = name.trim().to_string();
            if name.is_empty() {
                format!("Unnamed: {idx}")
            } else {
                name
            }
        })
        .collect();
    if let Some(row) = rows.iter().position(|row| row.len() > headers.len()) {
        bail!(
            "Row {} has {} field(s) but the header has {}",
            row + 1,
            rows[row].len(),
            headers.len()
        );
    }

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(rows.len()); headers.len()];
    for row in rows {
        let mut fields = row.into_iter();
        for column in cells.iter_mut() {
            let field = fields.next().filter(|value| !value.is_empty());
            column.push(field);
        }
    }

    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(name, values)| {
            let data = infer_column(values);
            debug!("Column '{}' read as {}", name, data.native_type());
            Column::new(name, data)
        })
        .collect();
    Dataset::new(columns).context("Building dataset")
}

#[derive(Debug, Clone)]
struct TypeCandidate {
    possible_boolean: bool,
    possible_integer: bool,
    possible_float: bool,
}

impl TypeCandidate {
    fn new() -> Self {
        Self {
            possible_boolean: true,
            possible_integer: true,
            possible_float: true,
        }
    }

    fn observe(&mut self, value: &str) {
        let value = value.trim();
        if self.possible_boolean
            && !(value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false"))
        {
            self.possible_boolean = false;
        }
        if self.possible_integer && value.parse::<i64>().is_err() {
            self.possible_integer = false;
        }
        if self.possible_float && value.parse::<f64>().is_err() {
            self.possible_float = false;
        }
    }
}

/// Widest storage every present value fits: bool, then int64, then float64,
/// then text. All-missing columns stay text.
pub fn infer_column(values: Vec<Option<String>>) -> ColumnData {
    let mut candidate = TypeCandidate::new();
    let mut seen = false;
    for value in values.iter().flatten() {
        seen = true;
        candidate.observe(value);
    }
    if !seen {
        return ColumnData::Text(values);
    }
    if candidate.possible_boolean {
        ColumnData::Boolean(
            values
                .iter()
                .map(|v| v.as_ref().map(|s| s.trim().eq_ignore_ascii_case("true")))
                .collect(),
        )
    } else if candidate.possible_integer {
        ColumnData::Int64(
            values
                .iter()
                .map(|v| v.as_ref().and_then(|s| s.trim().parse().ok()))
                .collect(),
        )
    } else if candidate.possible_float {
        ColumnData::Float64(
            values
                .iter()
                .map(|v| v.as_ref().and_then(|s| s.trim().parse().ok()))
                .collect(),
        )
    } else {
        ColumnData::Text(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::NativeType;

    fn strings(values: &[&str]) -> Vec<Option<String>> {
        values
            .iter()
            .map(|v| (!v.is_empty()).then(|| v.to_string()))
            .collect()
    }

    #[test]
    fn inference_prefers_the_narrowest_family() {
        assert_eq!(infer_column(strings(&["TRUE", "false", ""])).native_type(), NativeType::Boolean);
        assert_eq!(infer_column(strings(&["1", "", "-3"])).native_type(), NativeType::Int64);
        assert_eq!(infer_column(strings(&["1", "2.5"])).native_type(), NativeType::Float64);
        assert_eq!(infer_column(strings(&["1", "a"])).native_type(), NativeType::Text);
        assert_eq!(infer_column(strings(&["2024-01-05"])).native_type(), NativeType::Text);
        assert_eq!(infer_column(strings(&["", ""])).native_type(), NativeType::Text);
    }

    #[test]
    fn short_rows_are_padded_with_missing_cells() {
        let dataset = build_dataset(
            vec!["id".into(), "".into()],
            vec![vec!["1".into(), "x".into()], vec!["2".into()]],
        )
        .unwrap();
        assert_eq!(dataset.column_names(), vec!["id".to_string(), "Unnamed: 1".to_string()]);
        assert_eq!(dataset.column("Unnamed: 1").unwrap().data.display(1), None);
    }

    #[test]
    fn spreadsheets_are_detected_by_extension() {
        assert_eq!(detect_format(Path::new("book.XLSX"), None), SourceFormat::Spreadsheet);
        assert_eq!(detect_format(Path::new("data.txt"), None), SourceFormat::Delimited(b'\t'));
        assert_eq!(detect_format(Path::new("data.csv"), Some(b';')), SourceFormat::Delimited(b';'));
    }

    #[test]
    fn delimited_text_is_read_from_any_reader() {
        let input = "customer_id\tbalance\tnotes\n1\t1000\t\n2\t2500.5\tvip\n";
        let dataset = read_delimited(input.as_bytes(), b'\t', UTF_8).unwrap();
        assert_eq!(dataset.row_count(), 2);
        assert_eq!(dataset.column("customer_id").unwrap().native_type(), NativeType::Int64);
        assert_eq!(dataset.column("balance").unwrap().native_type(), NativeType::Float64);
        assert_eq!(dataset.column("notes").unwrap().data.display(0), None);
    }
}
