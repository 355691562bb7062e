use std::io::Error;

use derive_setters::Setters;
use polars::error::PolarsError;
use ratatui::crossterm::event::KeyEvent;

#[derive(Debug)]
pub enum RVError {
    IoError(Error),
    PolarsError(PolarsError),
    LoadingFailed(String),
    FileNotFound,
    PermissionDenied,
    UnknownFileType,
    MissingColumn(String),
    InvalidValue { column: String, row: usize, value: String },
    InvalidFilter(String),
}

impl From<Error> for RVError {
    fn from(err: Error) -> Self {
        RVError::IoError(err)
    }
}

impl From<PolarsError> for RVError {
    fn from(err: PolarsError) -> Self {
        RVError::PolarsError(err)
    }
}

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct RVConfig {
    pub event_poll_time: u64,
    pub max_column_width: usize,
    pub search_threshold: f64,
    pub search_distance: usize,
}

impl Default for RVConfig {
    fn default() -> Self {
        Self {
            event_poll_time: 100,
            max_column_width: 40,
            search_threshold: 0.3,
            search_distance: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CMDMode {
    Search,
    Filter,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    MovePageUp,
    MovePageDown,
    MoveBeginning,
    MoveEnd,
    Resize(usize, usize),
    CopyRow,
    Help,
    Search,
    ShowColumns,
    ShowFilters,
    ShowGrouping,
    Toggle,
    ShowAll,
    ClearFilters,
    Enter,
    Exit,
    RawKey(KeyEvent),
}

pub const HELP_TEXT: &str = "\
Table
  /            search by name (live, Enter keeps, Esc clears)
  v            column visibility panel
  f            filter panel
  g            grouping panel
  j k ↑ ↓      move selection
  PgUp PgDn    move a page
  Home End     first / last row
  c            copy selected record
  ?            this help
  q            quit

Panels
  j k ↑ ↓      select column
  Space        toggle column / edit filter
  a            show all columns (visibility)
  x            clear all filters (filters)
  Enter        apply
  Esc          cancel

Filter input
  text         substring match
  a, b, c      one of the listed values
  \"a, b\", c    quote values holding a comma, double a quote inside (\"\")
  10..250      numeric range, either bound may be left out
  2024-01-01..2024-02-01   date range, either bound may be left out
  <empty>      remove the filter";
