use crate::PairedSample;
use anyhow::{anyhow, Context, Result};
use log::warn;
use std::fs::File;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Header metadata of a recording, as printed by `inspect_recording`.
#[derive(Debug)]
pub struct RecordingInfo {
    pub path: PathBuf,
    pub columns: Vec<String>,
    pub rows: usize,
}

/// Collect CSV recordings under `input_path`, sorted by path.
///
/// A path to a single file is returned as-is.
pub fn find_recordings(input_path: &Path) -> Result<Vec<PathBuf>> {
    if input_path.is_file() {
        return Ok(vec![input_path.to_path_buf()]);
    }
    if !input_path.is_dir() {
        return Err(anyhow!("Input path not found: {}", input_path.display()));
    }

    let mut recordings: Vec<PathBuf> = WalkDir::new(input_path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .map_or(false, |ext| ext.eq_ignore_ascii_case("csv"))
        })
        .map(|e| e.into_path())
        .collect();
    recordings.sort();
    Ok(recordings)
}

fn column_index(headers: &csv::StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
        .ok_or_else(|| anyhow!("Column '{}' missing from {}", name, path.display()))
}

fn parse_sample(field: Option<&str>) -> Option<i32> {
    let field = field?.trim();
    field
        .parse::<i32>()
        .ok()
        .or_else(|| field.parse::<f64>().ok().map(|v| v.round() as i32))
}

/// Read the ECG and PPG columns of a recording.
///
/// Rows where either value does not parse are skipped with a warning, so a
/// stray footer or blank line does not abort the whole file.
pub fn read_csv_file(path: &Path, ecg_column: &str, ppg_column: &str) -> Result<Vec<PairedSample>> {
    let file = File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(file);

    let headers = rdr
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .clone();
    let ecg_idx = column_index(&headers, ecg_column, path)?;
    let ppg_idx = column_index(&headers, ppg_column, path)?;

    let mut samples = Vec::new();
    let mut skipped = 0;
    for (row, result) in rdr.records().enumerate() {
        let record =
            result.with_context(|| format!("Malformed row {} in {}", row + 1, path.display()))?;

        match (parse_sample(record.get(ecg_idx)), parse_sample(record.get(ppg_idx))) {
            (Some(ecg), Some(ppg)) => samples.push(PairedSample { ecg, ppg }),
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!("Skipped {} unparseable rows in {}", skipped, path.display());
    }
    Ok(samples)
}

pub fn inspect_csv_file(path: &Path) -> Result<RecordingInfo> {
    let file = File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(file);
    let columns = rdr.headers()?.iter().map(str::to_string).collect();

    let mut rows = 0;
    for result in rdr.records() {
        result?;
        rows += 1;
    }

    Ok(RecordingInfo {
        path: path.to_path_buf(),
        columns,
        rows,
    })
}
