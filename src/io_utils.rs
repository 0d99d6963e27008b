//! Delimited-text plumbing shared by ingestion and export.
//!
//! - **Delimiter resolution**: `.csv` → comma, `.tsv` / `.txt` → tab, with a
//!   manual override.
//! - **Encoding**: input decoding via `encoding_rs`, defaulting to UTF-8.
//!   Export is always UTF-8.
//! - **Quoting**: output quotes only fields that need it.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

use crate::dataset::Dataset;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

/// Maps a WHATWG label such as `latin1` or `windows-1252`; `None` means UTF-8.
pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    let Some(label) = label.map(str::trim) else {
        return Ok(UTF_8);
    };
    Encoding::for_label(label.as_bytes()).ok_or_else(|| anyhow!("Unknown encoding '{label}'"))
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") || ext.eq_ignore_ascii_case("txt") => {
            DEFAULT_TSV_DELIMITER
        }
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(path: &Path, delimiter: u8) -> Result<csv::Reader<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    Ok(open_csv_reader(BufReader::new(file), delimiter))
}

/// Strict decode: malformed input is an error rather than replacement characters.
pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
        .ok_or_else(|| anyhow!("Bytes are not valid {}", encoding.name()))
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            decode_bytes(field, encoding).with_context(|| format!("Field {}", idx + 1))
        })
        .collect()
}

pub fn reader_headers<R: Read>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>> {
    let headers = reader.byte_headers().context("Reading header row")?;
    decode_record(headers, encoding).context("Decoding header row")
}

/// File sink for `Some(path)`, stdout otherwise.
pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        None => Box::new(std::io::stdout()),
    })
}

pub fn open_csv_writer<W: Write>(writer: W, delimiter: u8) -> csv::Writer<W> {
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    builder.from_writer(writer)
}

/// Header row then one record per row; missing cells are written empty.
pub fn write_delimited<W: Write>(dataset: &Dataset, writer: W, delimiter: u8) -> Result<()> {
    let mut csv_writer = open_csv_writer(writer, delimiter);
    if dataset.is_empty() {
        return Ok(());
    }
    csv_writer
        .write_record(dataset.columns().iter().map(|column| column.name.as_str()))
        .context("Writing header row")?;
    for row in 0..dataset.row_count() {
        let record = dataset
            .columns()
            .iter()
            .map(|column| column.data.display(row).unwrap_or_default());
        csv_writer
            .write_record(record)
            .with_context(|| format!("Writing row {}", row + 1))?;
    }
    csv_writer.flush().context("Flushing output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Column, ColumnData};

    #[test]
    fn txt_and_tsv_default_to_tabs() {
        assert_eq!(resolve_input_delimiter(Path::new("a.txt"), None), b'\t');
        assert_eq!(resolve_input_delimiter(Path::new("a.TSV"), None), b'\t');
        assert_eq!(resolve_input_delimiter(Path::new("a.csv"), None), b',');
        assert_eq!(resolve_input_delimiter(Path::new("a.txt"), Some(b';')), b';');
    }

    #[test]
    fn export_quotes_only_when_needed() {
        let dataset = Dataset::new(vec![
            Column::new("id", ColumnData::Int64(vec![Some(1), Some(2)])),
            Column::new(
                "notes",
                ColumnData::Text(vec![Some("plain".into()), Some("a, b".into())]),
            ),
            Column::new("score", ColumnData::Float64(vec![None, Some(0.5)])),
        ])
        .unwrap();
        let mut buffer = Vec::new();
        write_delimited(&dataset, &mut buffer, b',').unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "id,notes,score\n1,plain,\n2,\"a, b\",0.5\n"
        );
    }

    #[test]
    fn unknown_encodings_are_rejected() {
        assert_eq!(resolve_encoding(Some(" latin1 ")).unwrap().name(), "windows-1252");
        assert!(resolve_encoding(Some("klingon")).is_err());
    }

    #[test]
    fn decoding_is_strict() {
        assert_eq!(decode_bytes(b"Z\xfcrich", encoding_rs::WINDOWS_1252).unwrap(), "Zürich");
        let err = decode_bytes(b"Z\xfcrich", UTF_8).unwrap_err();
        assert_eq!(err.to_string(), "Bytes are not valid UTF-8");
    }
}
