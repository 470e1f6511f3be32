use crate::analysis::{BeatRecord, RecordingSummary};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write one row per beat to `{stem}_{recording}.{ext}` next to `base_path`.
pub fn write_beats_to_csv(base_path: &str, recording: &str, beats: &[BeatRecord]) -> Result<PathBuf> {
    let path = Path::new(base_path);
    let dir = path.parent().unwrap_or(Path::new("."));

    // Create directory if it doesn't exist
    std::fs::create_dir_all(dir)?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("beats");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("csv");

    let filename = format!("{}_{}.{}", stem, recording, ext);
    let full_path = dir.join(filename);

    println!("Writing beats to {}", full_path.display());
    let file = std::fs::File::create(&full_path)
        .with_context(|| format!("Failed to create {}", full_path.display()))?;
    let mut writer = csv::Writer::from_writer(file);

    writer.write_record([
        "timestamp",
        "r_peak_index",
        "rr_ms",
        "heart_rate_bpm",
        "qrs_delay",
        "peak_delay",
        "turn_delay",
        "through_delay",
        "onset_delay",
        "onset_amplitude",
        "pat_ms",
    ])?;

    for beat in beats {
        writer.write_record(&[
            opt(beat.timestamp.map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f"))),
            beat.r_peak_index.to_string(),
            opt(beat.rr_ms.map(|v| format!("{:.1}", v))),
            opt(beat.heart_rate_bpm.map(|v| format!("{:.2}", v))),
            beat.qrs_delay.to_string(),
            opt(beat.peak_delay),
            opt(beat.turn_delay),
            opt(beat.through_delay),
            opt(beat.onset_delay.map(|v| format!("{:.3}", v))),
            opt(beat.onset_amplitude.map(|v| format!("{:.3}", v))),
            opt(beat.pat_ms.map(|v| format!("{:.2}", v))),
        ])?;
    }

    writer.flush()?;
    Ok(full_path)
}

pub fn write_summary_json(path: &Path, summaries: &[RecordingSummary]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, summaries)
        .with_context(|| format!("Failed to write summary to {}", path.display()))?;
    println!("Wrote summary to {}", path.display());
    Ok(())
}
