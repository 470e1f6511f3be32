use crate::qrs_detector::{DetectorSettings, DEFAULT_BASELINE_SHIFT_LIMIT};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use clap::Parser;
use std::path::PathBuf;

/// Compute beat-to-beat Pulse Arrival Time from paired ECG/PPG recordings
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// CSV recording or directory of CSV recordings
    #[arg(help = "CSV recording or directory of CSV recordings")]
    pub input_path: PathBuf,

    /// Sampling rate shared by both channels, in Hz
    #[arg(long, env = "PAT_SAMPLE_RATE", default_value = "200")]
    pub sample_rate: u32,

    /// Name of the ECG column
    #[arg(long, default_value = "ecg")]
    pub ecg_column: String,

    /// Name of the PPG column
    #[arg(long, default_value = "ppg")]
    pub ppg_column: String,

    /// Time of the first sample (format: YYYY-MM-DD HH:MM:SS, UTC)
    #[arg(long)]
    pub start_time: Option<String>,

    /// CSV output file prefix (e.g. /path/to/output/prefix)
    #[arg(long)]
    pub csv_output: Option<String>,

    /// Path of a JSON file receiving one summary per recording
    #[arg(long)]
    pub summary_json: Option<PathBuf>,

    /// Largest |max + min| raw slope around a QRS before it counts as a baseline shift
    #[arg(long, default_value_t = DEFAULT_BASELINE_SHIFT_LIMIT)]
    pub baseline_shift_limit: i64,
}

impl Args {
    pub fn detector_settings(&self) -> DetectorSettings {
        DetectorSettings {
            baseline_shift_limit: self.baseline_shift_limit,
        }
    }

    pub fn start_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.start_time
            .as_deref()
            .map(|s| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                    .map(|dt| dt.and_utc())
                    .with_context(|| format!("Invalid start time: {}", s))
            })
            .transpose()
    }
}
