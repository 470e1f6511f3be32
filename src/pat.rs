//! Pulse Arrival Time pipeline for one paired ECG/PPG channel.
//!
//! Each call to [`PatPipeline::step`] consumes one ECG and one PPG sample and
//! returns the events produced on that sample. Events within a sample always
//! come in the order heartbeat, landmarks, PAT.

use crate::error::PipelineError;
use crate::filters::{PpgFilterBank, RingBuffer};
use crate::parameters::SampleRateParameters;
use crate::ppg_features::{find_landmarks, find_onset, FilteredSegment, PpgLandmarks, PulseOnset};
use crate::ppg_segment::PpgSegmentBuffer;
use crate::qrs_detector::{DetectorSettings, QrsDetector};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    /// Samples between the estimated R-peak and the sample that confirmed it
    pub delay: usize,
    /// Stream index of the estimated R-peak
    pub r_peak_index: u64,
    /// Samples since the previous detected R-peak
    pub rr_samples: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingEvent {
    HeartbeatDetected(Heartbeat),
    PulseLandmarksFound(PpgLandmarks),
    PatComputed { pat_ms: f64, onset: PulseOnset },
}

#[derive(Debug, Clone)]
pub struct PatPipeline {
    params: SampleRateParameters,
    detector: QrsDetector,
    ecg_history: RingBuffer,
    ppg_filter: PpgFilterBank,
    segments: PpgSegmentBuffer,
    samples_seen: u64,
    last_r_peak: Option<u64>,
}

impl PatPipeline {
    pub fn configure(sample_rate: u32) -> Result<Self, PipelineError> {
        Self::configure_with(sample_rate, DetectorSettings::default())
    }

    pub fn configure_with(
        sample_rate: u32,
        settings: DetectorSettings,
    ) -> Result<Self, PipelineError> {
        let params = SampleRateParameters::new(sample_rate)?;
        Ok(Self {
            detector: QrsDetector::with_settings(&params, settings),
            ecg_history: RingBuffer::new(params.derivative_history_length),
            ppg_filter: PpgFilterBank::new(&params),
            segments: PpgSegmentBuffer::new(params.ms1500),
            samples_seen: 0,
            last_r_peak: None,
            params,
        })
    }

    pub fn params(&self) -> &SampleRateParameters {
        &self.params
    }

    pub fn detector(&self) -> &QrsDetector {
        &self.detector
    }

    /// Feed one sample pair and return the PAT in milliseconds if one was
    /// computed on it.
    pub fn process(&mut self, ecg_sample: i32, ppg_sample: i32) -> Option<f64> {
        self.step(ecg_sample, ppg_sample)
            .into_iter()
            .find_map(|event| match event {
                ProcessingEvent::PatComputed { pat_ms, .. } => Some(pat_ms),
                _ => None,
            })
    }

    /// Feed one sample pair and return every event it produced.
    pub fn step(&mut self, ecg_sample: i32, ppg_sample: i32) -> Vec<ProcessingEvent> {
        let index = self.samples_seen;
        self.samples_seen += 1;
        self.ecg_history.push(i64::from(ecg_sample));

        let mut events = Vec::new();
        if let Some(estimate) = self.detector.process(ecg_sample) {
            let delay = self.refine_delay(estimate);
            let r_peak_index = index.saturating_sub(delay as u64);
            let previous = self.last_r_peak.replace(r_peak_index);
            let rr_samples = previous.map(|p| r_peak_index.saturating_sub(p));

            events.push(ProcessingEvent::HeartbeatDetected(Heartbeat {
                delay,
                r_peak_index,
                rr_samples,
            }));
            self.close_segment(delay, previous, &mut events);
        }

        self.segments.append(self.ppg_filter.filter(ppg_sample));
        events
    }

    /// Move the detector's R-peak estimate to the largest raw ECG sample
    /// within `ms30` of it. Estimates older than the ECG history are kept.
    fn refine_delay(&self, estimate: usize) -> usize {
        let available = self.ecg_history.len().min(self.samples_seen as usize);
        if estimate >= available {
            return estimate;
        }

        let reach = self.params.ms30;
        let mut best = (estimate, self.ecg_history.ago(estimate + 1));
        for offset in 1..=reach {
            let older = Some(estimate + offset).filter(|&d| d < available);
            for delay in [older, estimate.checked_sub(offset)].into_iter().flatten() {
                let value = self.ecg_history.ago(delay + 1);
                if value > best.1 {
                    best = (delay, value);
                }
            }
        }
        best.0
    }

    /// `delay` counts raw samples back to the R-peak; `opening_beat` is the
    /// R-peak that opened the segment being closed, if any.
    fn close_segment(
        &mut self,
        delay: usize,
        opening_beat: Option<u64>,
        events: &mut Vec<ProcessingEvent>,
    ) {
        // Filtered values trail the raw stream, so fewer of them belong to
        // the next segment.
        let filter_delay = self.params.ppg_filter_delay;
        let finished = self.segments.split(delay.saturating_sub(filter_delay));
        let Some(opening_beat) = opening_beat else {
            return;
        };

        let start = finished.start_index;
        let filtered =
            FilteredSegment::new(finished.segment.into_samples(), self.params.derivative_length);
        let Some(landmarks) = find_landmarks(&filtered) else {
            debug!("No pulse landmarks after beat at {}", opening_beat);
            return;
        };
        events.push(ProcessingEvent::PulseLandmarksFound(landmarks));

        let Some(onset) = find_onset(&filtered, &landmarks) else {
            debug!("No pulse onset after beat at {}", opening_beat);
            return;
        };

        // Raw stream position of the onset, relative to the opening R-peak
        let arrival = start as f64 + onset.position - filter_delay as f64 - opening_beat as f64;
        if arrival < 0.0 {
            debug!(
                "Pulse onset {:.1} samples before its R-peak, skipping",
                -arrival
            );
            return;
        }
        events.push(ProcessingEvent::PatComputed {
            pat_ms: self.params.samples_to_ms(arrival),
            onset,
        });
    }
}
