pub mod classify;
pub mod cli;
pub mod data;
pub mod dataset;
pub mod diff;
pub mod ingest;
pub mod io_utils;
pub mod optimize;
pub mod persistence;
pub mod retype;
pub mod session;
pub mod snapshot;
pub mod summary;
pub mod table;
mod yaml_provider;

use std::{env, path::Path, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};
use serde::Serialize;

use crate::{
    classify::Lexicon,
    cli::{Cli, Commands, InputArgs},
    diff::{CellDiffStyle, DiffOutcome},
    ingest::IngestOptions,
    optimize::OptimizationReport,
    persistence::{PersistenceGateway, QueryOutcome, SqliteGateway},
    session::{EditOutcome, Session},
    summary::{DataDictionaryEntry, DatasetMetrics, NumericSummary, TypeShare},
    table::print_table,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_steward", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Inspect(args) => handle_inspect(&args),
        Commands::Diff(args) => handle_diff(&args),
        Commands::Save(args) => handle_save(&args),
        Commands::Query(args) => handle_query(&args),
        Commands::Tables(args) => handle_tables(&args),
        Commands::Retype(args) => handle_retype(&args),
        Commands::Drop(args) => handle_drop(&args),
        Commands::Edit(args) => handle_edit(&args),
        Commands::Export(args) => handle_export(&args),
        Commands::Keywords(args) => handle_keywords(&args),
    }
}

#[derive(Serialize)]
struct InspectReport<'a> {
    upload: &'a str,
    table: &'a str,
    optimization: Option<&'a OptimizationReport>,
    metrics: DatasetMetrics,
    types: Vec<TypeShare>,
    dictionary: Vec<DataDictionaryEntry>,
    numeric: Vec<NumericSummary>,
    critical_columns: Vec<&'a str>,
}

fn handle_inspect(args: &cli::InspectArgs) -> Result<()> {
    let mut session = load_session(&args.source)?;
    if !args.no_optimize {
        session.optimize();
    }
    let dataset = session.dataset();
    let report = InspectReport {
        upload: session.upload_name(),
        table: session.table_name().as_str(),
        optimization: session.last_report(),
        metrics: summary::dataset_metrics(dataset),
        types: summary::type_breakdown(dataset),
        dictionary: summary::data_dictionary(dataset),
        numeric: summary::numeric_summaries(dataset),
        critical_columns: session.critical_columns().iter().collect(),
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("File: {} (table `{}`)", report.upload, report.table);
    if let Some(optimization) = report.optimization {
        println!(
            "Memory usage: {:.2} MB -> {:.2} MB",
            optimization.memory_before_mb(),
            optimization.memory_after_mb()
        );
        for (column, converted) in optimization.converted() {
            println!("  {column}: {} -> {}", converted.from, converted.to);
        }
    }
    println!(
        "NULL values: {}  Rows: {}  Columns: {}  Data types: {}",
        report.metrics.null_values,
        report.metrics.rows,
        report.metrics.columns,
        report.metrics.distinct_types
    );
    println!();
    print_table(
        &strings(&["Type", "Columns", "Description"]),
        &report
            .types
            .iter()
            .map(|share| {
                vec![
                    share.category.to_string(),
                    share.columns.to_string(),
                    share.description.to_string(),
                ]
            })
            .collect::<Vec<_>>(),
    );
    println!();
    print_table(
        &strings(&["Column", "Data Type", "Unique Values", "Missing Values", "Example Value"]),
        &report
            .dictionary
            .iter()
            .map(|entry| {
                vec![
                    entry.column.clone(),
                    entry.type_label.clone(),
                    entry.unique_values.to_string(),
                    entry.missing_values.to_string(),
                    entry.example.clone().unwrap_or_default(),
                ]
            })
            .collect::<Vec<_>>(),
    );
    if !report.numeric.is_empty() {
        println!();
        print_table(
            &strings(&["Column", "mean", "std", "min", "max"]),
            &report
                .numeric
                .iter()
                .map(|summary| {
                    vec![
                        summary.column.clone(),
                        format_stat(summary.mean),
                        format_stat(summary.std),
                        format_stat(summary.min),
                        format_stat(summary.max),
                    ]
                })
                .collect::<Vec<_>>(),
        );
    }
    println!();
    if report.critical_columns.is_empty() {
        println!("Critical columns: none");
    } else {
        println!("Critical columns: {}", report.critical_columns.join(", "));
    }
    if args.preview > 0 {
        println!();
        print!(
            "{}",
            table::render_dataset(dataset, session.critical_columns(), Some(args.preview))
        );
    }
    Ok(())
}

fn handle_diff(args: &cli::DiffArgs) -> Result<()> {
    let mut session = load_session(&args.source)?;
    let edited = load_dataset(&args.source, &args.edited)?;
    if !session.stage_edit(edited) {
        debug!("Edited file matches the baseline");
    }
    let outcome = session.diff();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    let critical = session.critical_columns();
    match &outcome {
        DiffOutcome::Grid(grid) => {
            print!(
                "{}",
                table::render_diff(session.dataset(), grid, critical, args.limit, !args.no_color)
            );
            println!(
                "{} edited cell(s), {} in critical columns",
                grid.count(CellDiffStyle::Edited) + grid.count(CellDiffStyle::EditedCritical),
                grid.count(CellDiffStyle::EditedCritical)
            );
        }
        DiffOutcome::StructuralChange {
            baseline_rows,
            current_rows,
        } => {
            warn!(
                "Row count changed from {baseline_rows} to {current_rows}; cell highlighting is unavailable"
            );
            print!(
                "{}",
                table::render_dataset(session.dataset(), critical, args.limit)
            );
        }
        DiffOutcome::NoBaseline => {
            print!(
                "{}",
                table::render_dataset(session.dataset(), critical, args.limit)
            );
        }
    }
    Ok(())
}

fn handle_save(args: &cli::SaveArgs) -> Result<()> {
    let mut session = load_session(&args.source)?;
    if !args.no_optimize {
        session.optimize();
    }
    let mut gateway = open_store(&args.store.db)?;
    let message = session
        .save(&mut gateway)
        .with_context(|| format!("Saving {:?}", args.source.input))?;
    println!("{message}");
    Ok(())
}

fn handle_query(args: &cli::QueryArgs) -> Result<()> {
    let mut gateway = open_store(&args.store.db)?;
    let outcome = gateway.query(&args.sql)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }
    match outcome {
        QueryOutcome::Rows(result) => {
            let rows = result
                .rows
                .into_iter()
                .map(|row| row.into_iter().map(Option::unwrap_or_default).collect())
                .collect::<Vec<Vec<String>>>();
            print_table(&result.columns, &rows);
        }
        QueryOutcome::NoRows { affected } => {
            debug!("Statement affected {affected} row(s)");
            println!("No data returned for the query.");
        }
    }
    Ok(())
}

fn handle_tables(args: &cli::StoreArgs) -> Result<()> {
    let mut gateway = open_store(&args.db)?;
    for name in gateway.list_tables()? {
        println!("{name}");
    }
    Ok(())
}

fn handle_retype(args: &cli::RetypeArgs) -> Result<()> {
    let mut session = load_session(&args.source)?;
    let retyped = session.retype(&args.column, args.to)?;
    debug!("Retyped: {:?}", retyped);
    export(&session, args.output.as_deref())
}

fn handle_drop(args: &cli::DropArgs) -> Result<()> {
    let mut session = load_session(&args.source)?;
    let mut gateway = open_store(&args.store.db)?;
    let outcome = session.delete_columns(&args.columns, &mut gateway);
    match outcome.save {
        Some(Ok(message)) => info!("{message}"),
        Some(Err(err)) => return Err(err).context("Saving after column deletion"),
        None => warn!(
            "None of the requested columns exist: {}",
            args.columns.join(", ")
        ),
    }
    export(&session, args.output.as_deref())
}

fn handle_edit(args: &cli::EditArgs) -> Result<()> {
    let mut session = load_session(&args.source)?;
    let mut gateway = open_store(&args.store.db)?;
    match session.set_cell(args.row, &args.column, &args.value, &mut gateway)? {
        EditOutcome::NoChange => info!("Cell already holds that value; nothing saved"),
        EditOutcome::Saved(message) => info!("{message}"),
        EditOutcome::SaveFailed(err) => return Err(err).context("Saving edited data"),
    }
    export(&session, args.output.as_deref())
}

fn handle_export(args: &cli::ExportArgs) -> Result<()> {
    let session = load_session(&args.source)?;
    export(&session, args.output.as_deref())
}

fn handle_keywords(args: &cli::KeywordsArgs) -> Result<()> {
    let lexicon = load_lexicon(args.keywords.as_deref())?;
    lexicon.save(&args.output)?;
    info!(
        "Wrote {} keyword(s) to {:?}",
        lexicon.keywords().len(),
        args.output
    );
    Ok(())
}

fn load_session(source: &InputArgs) -> Result<Session> {
    let dataset = load_dataset(source, &source.input)?;
    let lexicon = load_lexicon(source.keywords.as_deref())?;
    let upload_name = source
        .input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("Input path {:?} has no file name", source.input))?;
    Ok(Session::start(upload_name, dataset, lexicon)?)
}

fn load_dataset(source: &InputArgs, path: &Path) -> Result<dataset::Dataset> {
    let options = IngestOptions {
        delimiter: source.delimiter,
        encoding: io_utils::resolve_encoding(source.input_encoding.as_deref())?,
    };
    ingest::load_dataset(path, &options)
}

fn load_lexicon(path: Option<&Path>) -> Result<Lexicon> {
    match path {
        Some(path) => {
            let lexicon = Lexicon::load(path)?;
            debug!("Loaded {} keyword(s) from {:?}", lexicon.keywords().len(), path);
            Ok(lexicon)
        }
        None => Ok(Lexicon::default()),
    }
}

fn open_store(path: &Path) -> Result<SqliteGateway> {
    Ok(SqliteGateway::open(path)?)
}

fn export(session: &Session, output: Option<&Path>) -> Result<()> {
    let writer = io_utils::open_output(output)?;
    session.export_csv(writer)
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn format_stat(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.4}")).unwrap_or_default()
}
