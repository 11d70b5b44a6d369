use polars::prelude::*;
use rayon::prelude::*;
use std::cmp::{Ordering, Reverse};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use tracing_error::SpanTrace;

use crate::columns::SortDirection;
use crate::domain::{DVConfig, DVError};
use crate::visibility::FieldRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileType {
    CSV,
    PARQUET,
    ARROW,
    JSON,
}

#[derive(Debug)]
pub struct FileInfo {
    path: PathBuf,
    file_size: u64,
    file_type: FileType,
}

/// The row collection of one dictionary file.
#[derive(Debug, Default)]
pub struct DictionaryTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<FieldRow>,
    path: Option<PathBuf>,
    key_column: String,
    timestamp_column: String,
}

impl DictionaryTable {
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path, config: &DVConfig) -> Result<Self, DVError> {
        let file_info = Self::get_file_info(path).inspect_err(|e| {
            error!("Cannot open {}: {e}\n{}", path.display(), SpanTrace::capture());
        })?;
        let start_time = Instant::now();
        let df = match file_info.file_type {
            FileType::CSV => Self::load_csv(&file_info.path)?.collect()?,
            FileType::PARQUET => Self::load_parquet(&file_info.path)?.collect()?,
            FileType::ARROW => Self::load_arrow(&file_info.path)?.collect()?,
            FileType::JSON => Self::load_json(&file_info.path)?,
        };

        let name = file_info
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("???")
            .to_string();
        let mut table =
            Self::from_frame(&name, &df, &config.key_column, &config.timestamp_column)?;
        table.path = Some(file_info.path);

        info!(
            "Loaded {} rows ({} bytes, {:?}) in {}ms",
            table.rows.len(),
            file_info.file_size,
            file_info.file_type,
            start_time.elapsed().as_millis()
        );
        Ok(table)
    }

    /// Build the rows from a data frame. Each column is converted to strings
    /// on its own rayon worker.
    pub fn from_frame(
        name: &str,
        df: &DataFrame,
        key_column: &str,
        timestamp_column: &str,
    ) -> Result<Self, DVError> {
        let columns: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|c| c.to_string())
            .collect();
        let data: Result<Vec<Vec<Option<String>>>, PolarsError> = columns
            .par_iter()
            .map(|c| Self::load_column(df, c))
            .collect();
        let data = data?;

        let key_idx = columns.iter().position(|c| c == key_column);
        let ts_idx = columns.iter().position(|c| c == timestamp_column);
        if key_idx.is_none() {
            warn!("Key column {key_column:?} not found, every row is shown on its own");
        }
        if ts_idx.is_none() {
            warn!("Timestamp column {timestamp_column:?} not found, every row is shown on its own");
        }

        let rows = (0..df.height())
            .map(|ridx| {
                let values: Vec<Option<String>> =
                    data.iter().map(|column| column[ridx].clone()).collect();
                let key = key_idx
                    .and_then(|i| values[i].clone())
                    .filter(|k| !k.trim().is_empty());
                let last_updated = ts_idx
                    .and_then(|i| values[i].as_deref())
                    .and_then(parse_timestamp);
                FieldRow::new(key, last_updated, values)
            })
            .collect();

        Ok(DictionaryTable {
            name: name.to_string(),
            columns,
            rows,
            path: None,
            key_column: key_column.to_string(),
            timestamp_column: timestamp_column.to_string(),
        })
    }

    pub fn from_rows(name: &str, columns: Vec<String>, rows: Vec<FieldRow>) -> Self {
        DictionaryTable {
            name: name.to_string(),
            columns,
            rows,
            ..Default::default()
        }
    }

    /// Read the file again. Tables built in memory have nothing to reload.
    pub fn reload(&self) -> Result<Option<Self>, DVError> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        let config = DVConfig::default()
            .with_key_column(self.key_column.clone())
            .with_timestamp_column(self.timestamp_column.clone());
        Self::load(path, &config).map(Some)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.values.get(column))
            .and_then(|v| v.as_deref())
            .unwrap_or("")
    }

    /// Case insensitive substring match over every cell of a row.
    pub fn row_matches(&self, row: usize, term: &str) -> bool {
        let term = term.to_lowercase();
        self.rows[row]
            .values
            .iter()
            .flatten()
            .any(|v| v.to_lowercase().contains(&term))
    }

    pub fn filter(&self, indices: &[usize], term: &str) -> Vec<usize> {
        indices
            .par_iter()
            .copied()
            .filter(|&ridx| self.row_matches(ridx, term))
            .collect()
    }

    /// Stable sort of row indices by one column. Values that parse as numbers
    /// come first in numeric order, the rest follow as strings.
    pub fn sorted(&self, indices: &[usize], column: usize, direction: SortDirection) -> Vec<usize> {
        let mut keyed: Vec<(usize, &str, Option<f64>)> = indices
            .iter()
            .map(|&ridx| {
                let value = self.cell(ridx, column);
                (ridx, value, value.trim().parse::<f64>().ok())
            })
            .collect();

        keyed.sort_by(|(_, a, a_num), (_, b, b_num)| {
            let ordering = match (a_num, b_num) {
                (Some(a), Some(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
                (Some(_), None) => return Ordering::Less,
                (None, Some(_)) => return Ordering::Greater,
                (None, None) => a.cmp(b),
            };
            match direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        });
        keyed.into_iter().map(|(ridx, _, _)| ridx).collect()
    }

    /// Canonical rows in order of first appearance of their key, each followed
    /// by its history rows, newest first.
    pub fn grouped(&self, indices: &[usize]) -> Vec<usize> {
        let mut first_seen: HashMap<&str, usize> = HashMap::new();
        let mut keyed: Vec<(usize, bool, Reverse<Option<i64>>, usize)> = indices
            .iter()
            .enumerate()
            .map(|(pos, &ridx)| {
                let row = &self.rows[ridx];
                let group = match row.group_key() {
                    Some(key) => *first_seen.entry(key).or_insert(pos),
                    None => pos,
                };
                // Newest first, rows without timestamp last
                (group, !row.canonical, Reverse(row.last_updated), ridx)
            })
            .collect();
        keyed.sort();
        keyed.into_iter().map(|(_, _, _, ridx)| ridx).collect()
    }

    fn get_file_info(path: &Path) -> Result<FileInfo, DVError> {
        let metadata = fs::metadata(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => DVError::FileNotFound,
            ErrorKind::PermissionDenied => DVError::PermissionDenied,
            _ => DVError::IoError(e),
        })?;
        if !metadata.is_file() {
            return Err(DVError::LoadingFailed("Not a file!".into()));
        }

        Ok(FileInfo {
            path: path.to_path_buf(),
            file_size: metadata.len(),
            file_type: Self::detect_file_type(path)?,
        })
    }

    fn detect_file_type(path: &Path) -> Result<FileType, DVError> {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_uppercase())
            .as_deref()
        {
            Some("CSV") => Ok(FileType::CSV),
            Some("PARQUET") | Some("PQ") => Ok(FileType::PARQUET),
            Some("ARROW") | Some("IPC") | Some("FEATHER") => Ok(FileType::ARROW),
            Some("JSON") => Ok(FileType::JSON),
            _ => Err(DVError::UnknownFileType),
        }
    }

    fn load_column(df: &DataFrame, col_name: &str) -> Result<Vec<Option<String>>, PolarsError> {
        let col = df.column(col_name)?.cast(&DataType::String)?;
        let series = col.str()?;
        let data = series
            .into_iter()
            .map(|value| value.map(|s| s.replace("\r\n", " ↵ ").replace('\n', " ↵ ")))
            .collect();
        debug!("Column {col_name:?}: {} values", series.len());
        Ok(data)
    }

    fn load_csv(path: &Path) -> Result<LazyFrame, PolarsError> {
        LazyCsvReader::new(PlPath::Local(path.into()))
            .with_has_header(true)
            .finish()
    }

    fn load_parquet(path: &Path) -> Result<LazyFrame, PolarsError> {
        LazyFrame::scan_parquet(PlPath::Local(path.into()), ScanArgsParquet::default())
    }

    fn load_arrow(path: &Path) -> Result<LazyFrame, PolarsError> {
        LazyFrame::scan_ipc(
            PlPath::Local(path.into()),
            polars::io::ipc::IpcScanOptions,
            UnifiedScanArgs::default(),
        )
    }

    fn load_json(path: &Path) -> Result<DataFrame, DVError> {
        let file = File::open(path)?;
        Ok(JsonReader::new(file).finish()?)
    }
}

/// Timestamps are integers. Decimal values keep their integer part, anything
/// else counts as missing.
pub fn parse_timestamp(value: &str) -> Option<i64> {
    let value = value.trim();
    value.parse::<i64>().ok().or_else(|| {
        value
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f.trunc() as i64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visibility::VisibilityEngine;

    const FIXTURE: &str = "tests/fixtures/dictionary_01.csv";

    fn config() -> DVConfig {
        DVConfig::default()
    }

    fn frame() -> DataFrame {
        df!(
            "fieldName" => &["NAME", "NAME", "AGE", "CITY"],
            "internalFieldName" => &[Some("NAME"), Some("NAME"), Some("AGE"), None],
            "lastUpdated" => &["20200101", "20230101", "x", "20210101"]
        )
        .unwrap()
    }

    #[test]
    fn builds_rows_from_frame() {
        let table = DictionaryTable::from_frame("t", &frame(), "internalFieldName", "lastUpdated")
            .unwrap();
        assert_eq!(table.columns, vec!["fieldName", "internalFieldName", "lastUpdated"]);
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.rows[1].key.as_deref(), Some("NAME"));
        assert_eq!(table.rows[1].last_updated, Some(20230101));
        assert_eq!(table.rows[2].last_updated, None);
        assert_eq!(table.rows[3].key, None);
        assert_eq!(table.cell(3, 1), "");
        assert_eq!(table.cell(0, 0), "NAME");
    }

    #[test]
    fn missing_key_column_leaves_rows_unkeyed() {
        let table = DictionaryTable::from_frame("t", &frame(), "nope", "lastUpdated").unwrap();
        assert!(table.rows.iter().all(|r| r.key.is_none()));
    }

    #[test]
    fn loads_csv_fixture() {
        let table = DictionaryTable::load(Path::new(FIXTURE), &config()).unwrap();
        assert_eq!(table.name, "dictionary_01.csv");
        assert_eq!(table.rows.len(), 8);
        assert_eq!(table.columns[10], "lastUpdated");
        let keys: Vec<Option<&str>> = table.rows.iter().map(|r| r.key.as_deref()).collect();
        assert_eq!(keys.iter().filter(|k| **k == Some("GEO")).count(), 3);
        assert!(table.rows.iter().all(|r| r.canonical));
        assert_eq!(table.path(), Some(Path::new(FIXTURE)));
    }

    #[test]
    fn reload_reads_the_same_file() {
        let table = DictionaryTable::load(Path::new(FIXTURE), &config()).unwrap();
        let reloaded = table.reload().unwrap().unwrap();
        assert_eq!(table.rows, reloaded.rows);

        let memory = DictionaryTable::from_rows("m", vec![], vec![]);
        assert!(memory.reload().unwrap().is_none());
    }

    #[test]
    fn load_errors() {
        assert!(matches!(
            DictionaryTable::load(Path::new("tests/fixtures/missing.csv"), &config()),
            Err(DVError::FileNotFound)
        ));
        assert!(matches!(
            DictionaryTable::load(Path::new("tests/fixtures"), &config()),
            Err(DVError::LoadingFailed(_))
        ));
        assert!(matches!(
            DictionaryTable::load(Path::new("Cargo.toml"), &config()),
            Err(DVError::UnknownFileType)
        ));
    }

    #[test]
    fn timestamps() {
        assert_eq!(parse_timestamp("20240102"), Some(20240102));
        assert_eq!(parse_timestamp(" 42 "), Some(42));
        assert_eq!(parse_timestamp("12.9"), Some(12));
        assert_eq!(parse_timestamp("2024-01-02"), None);
        assert_eq!(parse_timestamp("NaN"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn filter_is_case_insensitive() {
        let table = DictionaryTable::from_frame("t", &frame(), "internalFieldName", "lastUpdated")
            .unwrap();
        assert_eq!(table.filter(&[0, 1, 2, 3], "city"), vec![3]);
        assert_eq!(table.filter(&[0, 1, 2, 3], "name"), vec![0, 1]);
        assert_eq!(table.filter(&[2, 3], "name"), Vec::<usize>::new());
    }

    #[test]
    fn sort_numbers_before_strings() {
        let table = DictionaryTable::from_frame("t", &frame(), "internalFieldName", "lastUpdated")
            .unwrap();
        let all = [0, 1, 2, 3];
        assert_eq!(table.sorted(&all, 2, SortDirection::Ascending), vec![0, 3, 1, 2]);
        assert_eq!(table.sorted(&all, 2, SortDirection::Descending), vec![1, 3, 0, 2]);
        assert_eq!(table.sorted(&all, 0, SortDirection::Ascending), vec![2, 3, 0, 1]);
    }

    #[test]
    fn grouped_order_keeps_history_after_canonical() {
        let mut rows = vec![
            FieldRow::new(Some("A".into()), Some(1), vec![]),
            FieldRow::new(Some("B".into()), Some(1), vec![]),
            FieldRow::new(Some("A".into()), Some(3), vec![]),
            FieldRow::new(Some("A".into()), Some(2), vec![]),
        ];
        rows[0].canonical = false;
        rows[3].canonical = false;
        let table = DictionaryTable::from_rows("t", vec![], rows);
        assert_eq!(table.grouped(&[0, 1, 2, 3]), vec![2, 3, 0, 1]);
    }

    #[test]
    fn grouped_order_with_extreme_timestamps() {
        let oldest = parse_timestamp("-9223372036854775808");
        assert_eq!(oldest, Some(i64::MIN));
        assert_eq!(parse_timestamp("-1e30"), Some(i64::MIN));

        let mut rows = vec![
            FieldRow::new(Some("A".into()), oldest, vec![]),
            FieldRow::new(Some("A".into()), Some(i64::MAX), vec![]),
            FieldRow::new(Some("A".into()), Some(5), vec![]),
        ];
        VisibilityEngine::new(8).compute_visibility(&mut rows);
        assert!(rows[1].canonical);
        let table = DictionaryTable::from_rows("t", vec![], rows);
        assert_eq!(table.grouped(&[0, 1, 2]), vec![1, 2, 0]);
    }
}
