use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use tracing::info;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod columns;
mod controller;
mod domain;
mod filter;
mod group;
mod inputter;
mod loader;
mod model;
mod pipeline;
mod record;
mod search;
mod ui;
mod view_state;

use controller::Controller;
use domain::{RVConfig, RVError};
use model::{Model, Status};
use ui::TableUI;

/// A tui based record viewer with fuzzy search, column filters and grouping.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Data file to view (csv, parquet, arrow/ipc/feather or json)
    path: String,

    /// Highest fuzzy search score still counted as a match (0.0 exact, 1.0 anything)
    #[arg(long, default_value_t = 0.3)]
    threshold: f64,

    /// Characters a search match may sit from the start of the name before it stops counting
    #[arg(long, default_value_t = 100)]
    distance: usize,

    /// Widest a column is rendered
    #[arg(long, default_value_t = 40)]
    max_column_width: usize,

    /// Milliseconds to wait for terminal events per loop
    #[arg(long, default_value_t = 100)]
    event_poll_time: u64,

    /// Where log output goes, the terminal belongs to the UI
    #[arg(long, default_value = "rv.log")]
    log_file: String,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Err(e) => {
            eprintln!("Error: {:?}", e);
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn expand_path(path: &str) -> Result<PathBuf, RVError> {
    shellexpand::full(path)
        .map(|p| PathBuf::from(p.as_ref()))
        .map_err(|e| RVError::LoadingFailed(e.to_string()))
}

fn init_logging(args: &Args) -> Result<(), RVError> {
    let log_file = File::create(expand_path(&args.log_file)?)?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(Mutex::new(log_file)).with_ansi(false))
        .with(ErrorLayer::default())
        .init();
    Ok(())
}

fn run(args: Args) -> Result<(), RVError> {
    init_logging(&args)?;

    let cfg = RVConfig::default()
        .with_event_poll_time(args.event_poll_time)
        .with_max_column_width(args.max_column_width)
        .with_search_threshold(args.threshold)
        .with_search_distance(args.distance);
    info!("Starting rv with {cfg:?}");

    let (file_info, records) = loader::load(expand_path(&args.path)?)?;

    let mut terminal = ratatui::init();
    let result = event_loop(&cfg, &mut terminal, file_info, records);
    ratatui::restore();
    result
}

fn event_loop(
    cfg: &RVConfig,
    terminal: &mut ratatui::DefaultTerminal,
    file_info: loader::FileInfo,
    records: Vec<record::Record>,
) -> Result<(), RVError> {
    let size = terminal.size()?;
    let mut model = Model::init(
        cfg,
        Some(file_info),
        records,
        size.width as usize,
        size.height as usize,
    );
    let mut ui = TableUI::new();
    let controller = Controller::new(cfg);

    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(&model, f))?;

        // Handle events and map to a Message
        if let Some(message) = controller.handle_event(&model)? {
            model.update(Some(message));
        };
    }

    info!("Quitting rv");
    Ok(())
}
