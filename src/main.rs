use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, warn};
use pat_decoder::analysis::analyze_recording;
use pat_decoder::config::Args;
use pat_decoder::data_loading::{find_recordings, read_csv_file};
use pat_decoder::output::{write_beats_to_csv, write_summary_json};

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let start_time = args.start_time()?;
    let settings = args.detector_settings();

    let recordings = find_recordings(&args.input_path)?;
    if recordings.is_empty() {
        warn!("No CSV recordings found in {}", args.input_path.display());
    }

    let mut summaries = Vec::new();
    for path in &recordings {
        println!("Loading file: {}", path.display());
        let samples = read_csv_file(path, &args.ecg_column, &args.ppg_column)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("recording");
        debug!("{} samples read from {}", samples.len(), path.display());

        let analysis = analyze_recording(name, &samples, args.sample_rate, settings, start_time)
            .with_context(|| format!("Failed to analyze {}", path.display()))?;
        let summary = &analysis.summary;

        println!(
            "  {} beats, {} PAT values, mean PAT {}, mean HR {}",
            summary.beats,
            summary.pat_count,
            summary
                .mean_pat_ms
                .map(|v| format!("{:.1} ms", v))
                .unwrap_or_else(|| "n/a".to_string()),
            summary
                .mean_heart_rate_bpm
                .map(|v| format!("{:.1} bpm", v))
                .unwrap_or_else(|| "n/a".to_string()),
        );

        if let Some(prefix) = &args.csv_output {
            write_beats_to_csv(prefix, name, &analysis.beats)?;
        }
        summaries.push(analysis.summary);
    }

    if let Some(path) = &args.summary_json {
        write_summary_json(path, &summaries)?;
    }

    Ok(())
}
