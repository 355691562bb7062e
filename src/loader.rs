use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use polars::prelude::*;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::domain::RVError;
use crate::record::{Record, parse_timestamp};

pub const REQUIRED_COLUMNS: [&str; 7] = [
    "id",
    "name",
    "category",
    "subcategory",
    "price",
    "createdAt",
    "updatedAt",
];

const NULL_TEXT: &str = "∅";

#[derive(Debug, PartialEq)]
enum FileType {
    CSV,
    PARQUET,
    ARROW,
    JSON,
}

#[derive(Debug)]
pub struct FileInfo {
    pub path: PathBuf,
    pub file_size: u64,
    file_type: FileType,
}

/// Reads the record store from a data file.
pub fn load(path: PathBuf) -> Result<(FileInfo, Vec<Record>), RVError> {
    let file_info = get_file_info(path)?;
    let frame = match file_info.file_type {
        FileType::CSV => load_csv(&file_info.path)?,
        FileType::PARQUET => load_parquet(&file_info.path)?,
        FileType::ARROW => load_arrow(&file_info.path)?,
        FileType::JSON => load_json(&file_info.path)?,
    };

    let start_time = Instant::now();
    let df = frame.collect()?;

    let names: Vec<String> = df.get_column_names().iter().map(|n| n.to_string()).collect();
    if let Some(missing) = REQUIRED_COLUMNS
        .iter()
        .find(|required| !names.iter().any(|n| n == *required))
    {
        return Err(RVError::MissingColumn(missing.to_string()));
    }

    // Each column is converted to strings on its own thread.
    let columns: Vec<Vec<Option<String>>> = REQUIRED_COLUMNS
        .par_iter()
        .map(|name| load_column(&df, name))
        .collect::<Result<_, PolarsError>>()?;

    let records = build_records(&columns)?;
    info!(
        "Loaded {} records from {:?} ({} bytes) in {}ms",
        records.len(),
        file_info.path,
        file_info.file_size,
        start_time.elapsed().as_millis()
    );
    Ok((file_info, records))
}

fn load_column(df: &DataFrame, col_name: &str) -> Result<Vec<Option<String>>, PolarsError> {
    let col = df.column(col_name)?.cast(&DataType::String)?;
    let series = col.str()?;
    let data: Vec<Option<String>> = series.into_iter().map(|v| v.map(str::to_string)).collect();
    debug!("Column \"{col_name}\": {} rows", data.len());
    Ok(data)
}

// `columns` is in REQUIRED_COLUMNS order.
fn build_records(columns: &[Vec<Option<String>>]) -> Result<Vec<Record>, RVError> {
    let nrows = columns.first().map(Vec::len).unwrap_or(0);
    let mut seen_ids = HashSet::with_capacity(nrows);
    let mut records = Vec::with_capacity(nrows);

    for row in 0..nrows {
        let text = |c: usize| -> String {
            columns[c][row]
                .as_deref()
                .map(|s| s.replace("\r\n", " ↵ ").replace('\n', " ↵ "))
                .unwrap_or_else(|| NULL_TEXT.to_string())
        };
        let invalid = |c: usize| RVError::InvalidValue {
            column: REQUIRED_COLUMNS[c].to_string(),
            row,
            value: columns[c][row].clone().unwrap_or_else(|| NULL_TEXT.to_string()),
        };

        let id = columns[0][row].clone().ok_or_else(|| invalid(0))?;
        if !seen_ids.insert(id.clone()) {
            return Err(RVError::LoadingFailed(format!("Duplicate id {id} in row {row}")));
        }
        let price = columns[4][row]
            .as_deref()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .ok_or_else(|| invalid(4))?;
        let created_at = columns[5][row]
            .as_deref()
            .and_then(parse_timestamp)
            .ok_or_else(|| invalid(5))?;
        let updated_at = columns[6][row]
            .as_deref()
            .and_then(parse_timestamp)
            .ok_or_else(|| invalid(6))?;

        records.push(Record {
            id,
            name: text(1),
            category: text(2),
            subcategory: text(3),
            price,
            created_at,
            updated_at,
        });
    }
    Ok(records)
}

fn detect_file_type(path: &Path) -> Result<FileType, RVError> {
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
        _ => Err(RVError::UnknownFileType),
    }
}

fn get_file_info(path: PathBuf) -> Result<FileInfo, RVError> {
    let metadata = fs::metadata(&path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => RVError::FileNotFound,
        ErrorKind::PermissionDenied => RVError::PermissionDenied,
        _ => RVError::IoError(e),
    })?;
    if !metadata.is_file() {
        return Err(RVError::LoadingFailed("Not a file!".into()));
    }

    let file_size = metadata.len();
    let file_type = detect_file_type(&path)?;

    Ok(FileInfo {
        path,
        file_size,
        file_type,
    })
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

fn load_json(path: &Path) -> Result<LazyFrame, RVError> {
    let file = fs::File::open(path)?;
    Ok(JsonReader::new(file).finish()?.lazy())
}
