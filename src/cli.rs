use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::dataset::NativeType;

pub const DEFAULT_DATABASE: &str = "csv_steward.db";

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Optimize, review and persist tabular uploads",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load a file, optimize its storage and print metrics, dictionary and critical columns
    Inspect(InspectArgs),
    /// Compare an edited file against its original and highlight changed cells
    Diff(DiffArgs),
    /// Optimize a file and store it under the table name derived from its file name
    Save(SaveArgs),
    /// Run a SQL statement against the store
    Query(QueryArgs),
    /// List tables in the store
    Tables(StoreArgs),
    /// Convert one column to another storage type and export the result
    Retype(RetypeArgs),
    /// Delete columns, persist the result and export it
    Drop(DropArgs),
    /// Change a single cell, persist the result and export it
    Edit(EditArgs),
    /// Re-export a file as normalized UTF-8 CSV
    Export(ExportArgs),
    /// Write the active keyword lexicon as YAML
    Keywords(KeywordsArgs),
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Input file (.csv, .tsv, .txt, .xlsx, .xls, .ods)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Delimiter character for text inputs (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of text inputs (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// YAML file with a `keywords:` list replacing the built-in lexicon
    #[arg(long)]
    pub keywords: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct StoreArgs {
    /// SQLite database file
    #[arg(long, default_value = DEFAULT_DATABASE)]
    pub db: PathBuf,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    #[command(flatten)]
    pub source: InputArgs,
    /// Number of rows to preview
    #[arg(long, default_value_t = 10)]
    pub preview: usize,
    /// Skip storage optimization
    #[arg(long = "no-optimize")]
    pub no_optimize: bool,
    /// Emit a JSON report instead of tables
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct DiffArgs {
    #[command(flatten)]
    pub source: InputArgs,
    /// Edited copy of the same table
    #[arg(short = 'e', long = "edited")]
    pub edited: PathBuf,
    /// Maximum rows to render
    #[arg(long)]
    pub limit: Option<usize>,
    /// Mark edits with `*` and `!` instead of ANSI colors
    #[arg(long = "no-color")]
    pub no_color: bool,
    /// Emit the diff outcome as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct SaveArgs {
    #[command(flatten)]
    pub source: InputArgs,
    #[command(flatten)]
    pub store: StoreArgs,
    /// Store the data exactly as ingested
    #[arg(long = "no-optimize")]
    pub no_optimize: bool,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// SQL statement to execute
    pub sql: String,
    #[command(flatten)]
    pub store: StoreArgs,
    /// Emit the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct RetypeArgs {
    #[command(flatten)]
    pub source: InputArgs,
    /// Column to convert
    #[arg(short = 'c', long = "column")]
    pub column: String,
    /// Target type (int8..int64, uint8..uint32, float16..float64, bool, object, category, datetime64[ns], time)
    #[arg(short = 't', long = "to", value_parser = parse_native_type)]
    pub to: NativeType,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DropArgs {
    #[command(flatten)]
    pub source: InputArgs,
    /// Columns to delete
    #[arg(short = 'C', long = "columns", value_delimiter = ',', required = true)]
    pub columns: Vec<String>,
    #[command(flatten)]
    pub store: StoreArgs,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    #[command(flatten)]
    pub source: InputArgs,
    /// Zero-based row index
    #[arg(long)]
    pub row: usize,
    /// Column to change
    #[arg(short = 'c', long = "column")]
    pub column: String,
    /// New cell value; an empty string clears the cell
    #[arg(long, allow_hyphen_values = true)]
    pub value: String,
    #[command(flatten)]
    pub store: StoreArgs,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub source: InputArgs,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct KeywordsArgs {
    /// Start from this YAML lexicon instead of the built-in one
    #[arg(long)]
    pub keywords: Option<PathBuf>,
    /// Destination YAML file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

fn parse_native_type(value: &str) -> Result<NativeType, String> {
    value.parse().map_err(|err: anyhow::Error| err.to_string())
}
