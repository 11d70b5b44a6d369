use clap::Parser;
use ratatui::DefaultTerminal;
use ratatui::crossterm::terminal;
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod columns;
mod controller;
mod domain;
mod export;
mod inputter;
mod model;
mod table;
mod ui;
mod visibility;

use controller::Controller;
use domain::{DVConfig, DVError};
use model::{Model, Status};
use ui::DictionaryUI;

/// Browse a data dictionary, one row per field, older versions collapsed.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Dictionary file (csv, parquet, arrow/ipc/feather or json)
    path: String,

    /// Column holding the logical field key
    #[arg(short, long, default_value = "internalFieldName")]
    key_column: String,

    /// Column holding the last update timestamp
    #[arg(short, long, default_value = "lastUpdated")]
    timestamp_column: String,

    /// Default target of the CSV export
    #[arg(short, long, default_value = "data_dictionary.csv")]
    export_path: String,

    /// Grouping passes a vanished field keeps its expand state
    #[arg(long, default_value_t = 8)]
    retain_passes: u64,

    /// Maximum width of columns without a fixed width
    #[arg(long, default_value_t = 40)]
    max_column_width: usize,

    /// Log file, the terminal belongs to the UI
    #[arg(long, default_value = "ddv.log")]
    log_file: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_logging(&args.log_file) {
        eprintln!("Error: cannot open log file {}: {e}", args.log_file);
        return ExitCode::FAILURE;
    }

    match run(&args) {
        Err(e) => {
            error!("Exiting with error: {e:?}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn init_logging(path: &str) -> Result<(), DVError> {
    let file = File::create(expand_path(path)?)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ddv=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .with(ErrorLayer::default())
        .init();
    Ok(())
}

fn expand_path(path: &str) -> Result<PathBuf, DVError> {
    shellexpand::full(path)
        .map(|p| PathBuf::from(p.as_ref()))
        .map_err(|e| DVError::LoadingFailed(e.to_string()))
}

fn run(args: &Args) -> Result<(), DVError> {
    info!("Starting ddv on {}", args.path);
    let cfg = DVConfig::default()
        .with_key_column(args.key_column.as_str())
        .with_timestamp_column(args.timestamp_column.as_str())
        .with_export_path(args.export_path.as_str())
        .with_retain_passes(args.retain_passes)
        .with_max_column_width(args.max_column_width);
    let path = expand_path(&args.path)?;

    // Load before taking over the terminal so errors reach stderr
    let (width, height) = terminal::size()?;
    let mut model = Model::init(&cfg, width as usize, height as usize)?;
    model.load_data_file(&path)?;

    let mut terminal = ratatui::init();
    let result = event_loop(&mut terminal, &mut model, &cfg);
    ratatui::restore();
    result
}

fn event_loop(
    terminal: &mut DefaultTerminal,
    model: &mut Model,
    cfg: &DVConfig,
) -> Result<(), DVError> {
    let mut ui = DictionaryUI::new();
    let controller = Controller::new(cfg);

    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(model, f))?;

        // Handle events and map to a Message
        let message = controller.handle_event(model)?;
        model.update(message)?;
    }

    Ok(())
}
