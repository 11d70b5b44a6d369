use derive_setters::Setters;
use polars::error::PolarsError;
use ratatui::crossterm::event::KeyEvent;
use std::fmt;
use std::io::Error;
use std::path::PathBuf;

#[derive(Debug)]
pub enum DVError {
    IoError(Error),
    PolarsError(PolarsError),
    LoadingFailed(String),
    ExportFailed(String),
    FileNotFound,
    PermissionDenied,
    UnknownFileType,
}

impl fmt::Display for DVError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DVError::IoError(e) => write!(f, "I/O error: {e}"),
            DVError::PolarsError(e) => write!(f, "Failed to read data: {e}"),
            DVError::LoadingFailed(reason) => write!(f, "Loading failed: {reason}"),
            DVError::ExportFailed(reason) => write!(f, "Export failed: {reason}"),
            DVError::FileNotFound => write!(f, "File not found"),
            DVError::PermissionDenied => write!(f, "Permission denied"),
            DVError::UnknownFileType => write!(f, "Unknown file type"),
        }
    }
}

impl std::error::Error for DVError {}

impl From<Error> for DVError {
    fn from(err: Error) -> Self {
        DVError::IoError(err)
    }
}

impl From<PolarsError> for DVError {
    fn from(err: PolarsError) -> Self {
        DVError::PolarsError(err)
    }
}

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct DVConfig {
    pub event_poll_time: u64,
    pub max_column_width: usize,
    #[setters(into)]
    pub key_column: String,
    #[setters(into)]
    pub timestamp_column: String,
    pub retain_passes: u64,
    #[setters(into)]
    pub export_path: PathBuf,
}

impl Default for DVConfig {
    fn default() -> Self {
        DVConfig {
            event_poll_time: 100,
            max_column_width: 40,
            key_column: "internalFieldName".to_string(),
            timestamp_column: "lastUpdated".to_string(),
            retain_passes: 8,
            export_path: PathBuf::from("data_dictionary.csv"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CMDMode {
    Filter,
    Export,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    MovePageUp,
    MovePageDown,
    MoveBeginning,
    MoveEnd,
    ToggleHistory,
    Filter,
    SortAscending,
    SortDescending,
    WidenColumn,
    NarrowColumn,
    CopyCell,
    CopyRow,
    Export,
    Reload,
    Help,
    Exit,
    Resize(usize, usize),
    RawKey(KeyEvent),
}

pub const HELP_TEXT: &str = "\
Navigation
  ←↓↑→ / hjkl      move cursor
  PgUp / PgDn      page up / down
  g / G            first / last row

Field history
  Enter / Space    show or hide older versions of the field
                   ▸ collapsed  ▾ expanded  ↳ older version

Table
  /                filter rows
  Esc              clear filter / close popup
  s / S            sort column ascending / descending
  > / <            widen / narrow column
  c / y            copy cell / copy row as CSV
  x                export visible rows to CSV
  r                reload file
  q                quit";
