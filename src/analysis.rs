use crate::error::PipelineError;
use crate::pat::{PatPipeline, ProcessingEvent};
use crate::qrs_detector::DetectorSettings;
use crate::PairedSample;
use chrono::{DateTime, Duration, Utc};
use log::{debug, trace};
use serde::Serialize;

/// Everything reported for one detected heartbeat.
///
/// The PPG columns describe the pulse in the interval that this beat closes.
/// Landmark and onset delays count samples back from this beat's R-peak and
/// `pat_ms` runs forward from the previous R-peak, so `pat_ms` plus the onset
/// delay in milliseconds equals `rr_ms`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeatRecord {
    pub timestamp: Option<DateTime<Utc>>,
    pub r_peak_index: u64,
    pub rr_ms: Option<f64>,
    pub heart_rate_bpm: Option<f64>,
    /// Samples between the R-peak and the sample that confirmed it
    pub qrs_delay: usize,
    pub peak_delay: Option<usize>,
    pub turn_delay: Option<usize>,
    pub through_delay: Option<usize>,
    pub onset_delay: Option<f64>,
    /// Filtered PPG amplitude at the onset
    pub onset_amplitude: Option<f64>,
    pub pat_ms: Option<f64>,
}

impl BeatRecord {
    fn new(r_peak_index: u64, qrs_delay: usize) -> Self {
        Self {
            timestamp: None,
            r_peak_index,
            rr_ms: None,
            heart_rate_bpm: None,
            qrs_delay,
            peak_delay: None,
            turn_delay: None,
            through_delay: None,
            onset_delay: None,
            onset_amplitude: None,
            pat_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingSummary {
    pub recording: String,
    pub sample_rate: u32,
    pub samples: usize,
    pub beats: usize,
    pub pat_count: usize,
    pub mean_pat_ms: Option<f64>,
    pub median_pat_ms: Option<f64>,
    pub std_pat_ms: Option<f64>,
    pub mean_heart_rate_bpm: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct RecordingAnalysis {
    pub beats: Vec<BeatRecord>,
    pub summary: RecordingSummary,
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|&v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Run a whole recording through a fresh pipeline.
///
/// `start_time` is the wall-clock time of the first sample; without it beats
/// carry no timestamp.
pub fn analyze_recording(
    recording: &str,
    samples: &[PairedSample],
    sample_rate: u32,
    settings: DetectorSettings,
    start_time: Option<DateTime<Utc>>,
) -> Result<RecordingAnalysis, PipelineError> {
    let mut pipeline = PatPipeline::configure_with(sample_rate, settings)?;
    let params = *pipeline.params();
    let mut beats: Vec<BeatRecord> = Vec::new();

    for sample in samples {
        for event in pipeline.step(sample.ecg, sample.ppg) {
            match event {
                ProcessingEvent::HeartbeatDetected(beat) => {
                    let mut record = BeatRecord::new(beat.r_peak_index, beat.delay);
                    record.timestamp = start_time.map(|start| {
                        let offset_us = beat.r_peak_index as f64 * 1e6 / sample_rate as f64;
                        start + Duration::microseconds(offset_us.round() as i64)
                    });
                    if let Some(rr) = beat.rr_samples.filter(|&rr| rr > 0) {
                        let rr_ms = params.samples_to_ms(rr as f64);
                        record.rr_ms = Some(rr_ms);
                        record.heart_rate_bpm = Some(60_000.0 / rr_ms);
                    }
                    trace!("Beat at sample {}", beat.r_peak_index);
                    beats.push(record);
                }
                ProcessingEvent::PulseLandmarksFound(landmarks) => {
                    if let Some(record) = beats.last_mut() {
                        record.peak_delay = Some(landmarks.peak_delay);
                        record.turn_delay = Some(landmarks.turn_delay);
                        record.through_delay = Some(landmarks.through_delay);
                    }
                }
                ProcessingEvent::PatComputed { pat_ms, onset } => {
                    if let Some(record) = beats.last_mut() {
                        record.onset_delay = Some(onset.delay);
                        record.onset_amplitude = Some(onset.amplitude);
                        record.pat_ms = Some(pat_ms);
                    }
                }
            }
        }
    }

    let pats: Vec<f64> = beats.iter().filter_map(|b| b.pat_ms).collect();
    let heart_rates: Vec<f64> = beats.iter().filter_map(|b| b.heart_rate_bpm).collect();
    debug!(
        "{}: {} beats, {} PAT values over {} samples",
        recording,
        beats.len(),
        pats.len(),
        samples.len()
    );

    let summary = RecordingSummary {
        recording: recording.to_string(),
        sample_rate,
        samples: samples.len(),
        beats: beats.len(),
        pat_count: pats.len(),
        mean_pat_ms: mean(&pats),
        median_pat_ms: median(&pats),
        std_pat_ms: std_dev(&pats),
        mean_heart_rate_bpm: mean(&heart_rates),
    };

    Ok(RecordingAnalysis { beats, summary })
}
