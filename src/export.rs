use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{info, instrument};

use crate::domain::DVError;
use crate::visibility::FieldRow;

pub type CellFormatter<'a> = &'a dyn Fn(Option<&str>, Option<&FieldRow>) -> Option<String>;

/// Quote a cell for CSV output. Every value is wrapped in double quotes and
/// inner quotes are doubled, missing values become `""`.
pub fn wrap_csv_value(
    value: Option<&str>,
    formatter: Option<CellFormatter>,
    row: Option<&FieldRow>,
) -> String {
    let formatted = match formatter {
        Some(format) => format(value, row),
        None => value.map(str::to_string),
    };
    let escaped = formatted.unwrap_or_default().replace('"', "\"\"");
    format!("\"{escaped}\"")
}

pub fn csv_line<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> String {
    values
        .into_iter()
        .map(|v| wrap_csv_value(v, None, None))
        .collect::<Vec<String>>()
        .join(",")
}

/// Write a header line and one line per row. Returns the number of rows written.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn export_rows<'a>(
    path: &Path,
    headers: &[&str],
    rows: impl IntoIterator<Item = &'a FieldRow>,
) -> Result<usize, DVError> {
    let file = File::create(path)
        .map_err(|e| DVError::ExportFailed(format!("{}: {e}", path.display())))?;
    let mut out = BufWriter::new(file);

    writeln!(out, "{}", csv_line(headers.iter().map(|h| Some(*h))))?;
    let mut written = 0;
    for row in rows {
        let line = row
            .values
            .iter()
            .map(|v| wrap_csv_value(v.as_deref(), None, Some(row)))
            .collect::<Vec<String>>()
            .join(",");
        writeln!(out, "{line}")?;
        written += 1;
    }
    out.flush()?;

    info!("Exported {written} rows");
    Ok(written)
}
