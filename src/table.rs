use std::borrow::Cow;
use std::fmt::Write as _;

use crate::{
    classify::CriticalColumnSet,
    dataset::Dataset,
    diff::{CellDiffStyle, DiffGrid},
};

const EDITED: &str = "\u{1b}[33m";
const EDITED_CRITICAL: &str = "\u{1b}[1;31m";
const RESET: &str = "\u{1b}[0m";
const CRITICAL_LABEL: &str = "⚠ ";

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(display_width(cell));
        }
    }
    for width in &mut widths {
        *width = (*width).max(1);
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));

    let separator_widths = widths.iter().map(|w| (*w).max(3)).collect::<Vec<usize>>();
    let separator_cells = separator_widths
        .iter()
        .map(|w| "-".repeat(*w))
        .collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator_cells, &separator_widths));

    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

/// First `limit` rows of `dataset`; critical columns carry a warning label.
pub fn render_dataset(dataset: &Dataset, critical: &CriticalColumnSet, limit: Option<usize>) -> String {
    let rows = visible_rows(dataset, limit)
        .map(|row| {
            dataset
                .columns()
                .iter()
                .map(|column| column.data.display(row).unwrap_or_default())
                .collect()
        })
        .collect::<Vec<Vec<String>>>();
    render_table(&labelled_headers(dataset, critical), &rows)
}

/// Like [`render_dataset`] with edited cells highlighted. With `color` off,
/// edits are marked with a trailing `*` (or `!` in critical columns).
pub fn render_diff(
    dataset: &Dataset,
    grid: &DiffGrid,
    critical: &CriticalColumnSet,
    limit: Option<usize>,
    color: bool,
) -> String {
    let rows = visible_rows(dataset, limit)
        .map(|row| {
            let styles = grid.row(row).unwrap_or_default();
            dataset
                .columns()
                .iter()
                .enumerate()
                .map(|(idx, column)| {
                    let value = column.data.display(row).unwrap_or_default();
                    let style = styles.get(idx).copied().unwrap_or(CellDiffStyle::Unchanged);
                    decorate(value, style, color)
                })
                .collect()
        })
        .collect::<Vec<Vec<String>>>();
    render_table(&labelled_headers(dataset, critical), &rows)
}

fn decorate(value: String, style: CellDiffStyle, color: bool) -> String {
    match (style, color) {
        (CellDiffStyle::Unchanged, _) => value,
        (CellDiffStyle::Edited, true) => format!("{EDITED}{value}{RESET}"),
        (CellDiffStyle::EditedCritical, true) => format!("{EDITED_CRITICAL}{value}{RESET}"),
        (CellDiffStyle::Edited, false) => format!("{value}*"),
        (CellDiffStyle::EditedCritical, false) => format!("{value}!"),
    }
}

fn labelled_headers(dataset: &Dataset, critical: &CriticalColumnSet) -> Vec<String> {
    dataset
        .columns()
        .iter()
        .map(|column| {
            if critical.contains(&column.name) {
                format!("{CRITICAL_LABEL}{}", column.name)
            } else {
                column.name.clone()
            }
        })
        .collect()
}

fn visible_rows(dataset: &Dataset, limit: Option<usize>) -> std::ops::Range<usize> {
    let rows = dataset.row_count();
    0..limit.map_or(rows, |limit| limit.min(rows))
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let mut line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let sanitized = sanitize_cell(value);
            let padding = width.saturating_sub(display_width(&sanitized));
            let mut cell = sanitized.into_owned();
            cell.push_str(&" ".repeat(padding));
            cell
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.truncate(line.trim_end_matches(' ').len());
    line
}

fn display_width(value: &str) -> usize {
    let mut width = 0usize;
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            // ANSI escape, e.g. \x1b[31m
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
