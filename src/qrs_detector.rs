//! Adaptive-threshold R-peak detector.
//!
//! Works on the integrated QRS energy produced by [`EcgFilterBank`]. A peak
//! is only reported once nothing larger has appeared for the pre-blank
//! window, so every detection is backdated: the returned delay is the number
//! of samples between the current sample and the estimated R-peak.

use crate::filters::{Derivative, EcgFilterBank, RingBuffer};
use crate::parameters::SampleRateParameters;
use log::{debug, trace};

/// Slots in the QRS, noise and R-R history buffers
const HISTORY: usize = 8;
/// Fraction of the QRS-to-noise gap added to the noise level
const DETECTION_THRESHOLD_RATIO: f64 = 0.475;
/// A local maximum must exceed this before its age is tracked
const PEAK_TRACKING_FLOOR: i32 = 2;
/// Default limit on `|max + min|` of the raw slope around a candidate
pub const DEFAULT_BASELINE_SHIFT_LIMIT: i64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorSettings {
    /// Candidates whose largest rising and falling slopes fail to cancel
    /// to within this magnitude are treated as baseline shifts.
    pub baseline_shift_limit: i64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            baseline_shift_limit: DEFAULT_BASELINE_SHIFT_LIMIT,
        }
    }
}

/// Upper median of eight values (index 4 of the ascending sort).
fn median(values: &[i32; HISTORY]) -> i32 {
    let mut sorted = *values;
    sorted.sort_unstable();
    sorted[HISTORY / 2]
}

fn threshold(qrs_median: i32, noise_median: i32) -> i32 {
    let gap = f64::from(qrs_median - noise_median) * DETECTION_THRESHOLD_RATIO;
    noise_median + gap as i32
}

/// Shift `values` back one slot and store `newest` at the front.
fn push_newest(values: &mut [i32; HISTORY], newest: i32) {
    values.copy_within(0..HISTORY - 1, 1);
    values[0] = newest;
}

/// Finds local maxima in the integrated signal.
#[derive(Debug, Clone)]
struct PeakTracker {
    current_max: i32,
    samples_since_max: usize,
    last_datum: i32,
    max_age: usize,
}

impl PeakTracker {
    fn new(max_age: usize) -> Self {
        Self {
            current_max: 0,
            samples_since_max: 0,
            last_datum: 0,
            max_age,
        }
    }

    /// Returns the tracked maximum once the signal falls below half of it or
    /// it has gone unbeaten for `max_age` samples.
    fn update(&mut self, datum: i32) -> Option<i32> {
        if self.samples_since_max > 0 {
            self.samples_since_max += 1;
        }

        let mut peak = None;
        if datum > self.last_datum && datum > self.current_max {
            self.current_max = datum;
            if self.current_max > PEAK_TRACKING_FLOOR {
                self.samples_since_max = 1;
            }
        } else if datum < self.current_max >> 1 || self.samples_since_max > self.max_age {
            peak = Some(self.current_max);
            self.current_max = 0;
            self.samples_since_max = 0;
        }

        self.last_datum = datum;
        peak.filter(|&p| p > 0)
    }
}

/// Holds a raw peak for the pre-blank window in case a larger one follows.
#[derive(Debug, Clone)]
struct PreBlank {
    held_peak: i32,
    hold_countdown: usize,
    hold_length: usize,
}

impl PreBlank {
    fn new(hold_length: usize) -> Self {
        Self {
            held_peak: 0,
            hold_countdown: 0,
            hold_length,
        }
    }

    fn count_down(&mut self) -> Option<i32> {
        self.hold_countdown -= 1;
        (self.hold_countdown == 0).then_some(self.held_peak)
    }

    fn update(&mut self, raw_peak: Option<i32>) -> Option<i32> {
        match raw_peak {
            Some(peak) if self.hold_countdown == 0 || peak > self.held_peak => {
                self.held_peak = peak;
                self.hold_countdown = self.hold_length;
                None
            }
            _ if self.hold_countdown > 0 => self.count_down(),
            _ => None,
        }
    }
}

/// Outcome of the slope check on a candidate peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeakShape {
    Qrs,
    TWave,
    BaselineShift,
}

/// T-wave and baseline-shift discrimination on the raw-signal derivative.
///
/// The history it inspects is exactly as long as the detection latency, so
/// its oldest sample lines up with the candidate beat and both windows are
/// measured forward from there.
#[derive(Debug, Clone)]
struct SlopeCheck {
    reference: i64,
    long_window: usize,
    short_window: usize,
    baseline_shift_limit: i64,
}

impl SlopeCheck {
    fn classify(&mut self, history: &RingBuffer) -> PeakShape {
        let long_max = history
            .chronological()
            .take(self.long_window)
            .map(i64::abs)
            .max()
            .unwrap_or(0);

        let (mut max, mut min) = (0i64, 0i64);
        for slope in history.chronological().take(self.short_window) {
            max = max.max(slope);
            min = min.min(slope);
        }
        let short_max = max.max(-min);

        let t_wave = if long_max != self.reference {
            self.reference = long_max;
            false
        } else {
            short_max < self.reference / 2
        };

        if t_wave {
            PeakShape::TWave
        } else if (max + min).abs() > self.baseline_shift_limit {
            PeakShape::BaselineShift
        } else {
            PeakShape::Qrs
        }
    }
}

/// Streaming QRS detector for one ECG channel.
#[derive(Debug, Clone)]
pub struct QrsDetector {
    params: SampleRateParameters,
    filter: EcgFilterBank,
    peaks: PeakTracker,
    pre_blank: PreBlank,

    qrs_peaks: [i32; HISTORY],
    noise_peaks: [i32; HISTORY],
    rr_intervals: [i32; HISTORY],
    qrs_median: i32,
    noise_median: i32,
    rr_median: i32,
    detection_threshold: i32,

    search_back_peak: i32,
    search_back_location: usize,
    search_back_count_limit: usize,

    peaks_seen: usize,
    second_counter: usize,
    second_max: i32,
    reset_peaks: [i32; HISTORY],
    reset_count: usize,

    raw_derivative: Derivative,
    derivative_history: RingBuffer,
    slope_check: SlopeCheck,

    samples_since_last_detection: usize,
}

impl QrsDetector {
    pub fn new(params: &SampleRateParameters) -> Self {
        Self::with_settings(params, DetectorSettings::default())
    }

    pub fn with_settings(params: &SampleRateParameters, settings: DetectorSettings) -> Self {
        let one_second = params.ms1000 as i32;
        Self {
            params: *params,
            filter: EcgFilterBank::new(params),
            peaks: PeakTracker::new(params.ms95),
            pre_blank: PreBlank::new(params.pre_blank),
            qrs_peaks: [0; HISTORY],
            noise_peaks: [0; HISTORY],
            rr_intervals: [one_second; HISTORY],
            qrs_median: 0,
            noise_median: 0,
            rr_median: one_second,
            detection_threshold: 0,
            search_back_peak: 0,
            search_back_location: 0,
            search_back_count_limit: params.ms1500,
            peaks_seen: 0,
            second_counter: 0,
            second_max: 0,
            reset_peaks: [0; HISTORY],
            reset_count: 0,
            raw_derivative: Derivative::new(params.derivative_length),
            derivative_history: RingBuffer::new(params.derivative_history_length),
            slope_check: SlopeCheck {
                reference: 0,
                long_window: params.ms360,
                short_window: params.ms220,
                baseline_shift_limit: settings.baseline_shift_limit,
            },
            samples_since_last_detection: 0,
        }
    }

    pub fn is_learning(&self) -> bool {
        self.peaks_seen < HISTORY
    }

    pub fn detection_threshold(&self) -> i32 {
        self.detection_threshold
    }

    pub fn rr_median(&self) -> i32 {
        self.rr_median
    }

    /// Process one raw ECG sample. Returns the number of samples since the
    /// estimated R-peak when a beat is confirmed on this sample.
    pub fn process(&mut self, sample: i32) -> Option<usize> {
        let filtered = self.filter.filter(sample);
        let raw_peak = self.peaks.update(filtered);
        let candidate = self.pre_blank.update(raw_peak);

        let slope = self.raw_derivative.filter(i64::from(sample));
        self.derivative_history.push(slope);

        self.samples_since_last_detection += 1;

        if self.is_learning() {
            self.learn(candidate);
            return None;
        }

        let mut delay = None;
        if let Some(peak) = candidate {
            delay = self.evaluate(peak);
        }
        if let Some(found) = self.search_back() {
            delay = Some(found);
        }
        self.track_background_reset(candidate);

        delay
    }

    /// Fill the QRS buffer with the largest candidate of each of the first
    /// eight seconds.
    fn learn(&mut self, candidate: Option<i32>) {
        if candidate.is_some() {
            self.samples_since_last_detection = self.params.window_width;
        }

        self.second_counter += 1;
        if self.second_counter == self.params.ms1000 {
            self.second_counter = 0;
            self.qrs_peaks[self.peaks_seen] = self.second_max;
            self.second_max = 0;
            self.peaks_seen += 1;

            if !self.is_learning() {
                let peaks = self.qrs_peaks;
                self.reinitialise(&peaks);
                debug!(
                    "Learning complete: qrs median {}, threshold {}",
                    self.qrs_median, self.detection_threshold
                );
            }
        }

        if let Some(peak) = candidate {
            self.second_max = self.second_max.max(peak);
        }
    }

    fn reinitialise(&mut self, peaks: &[i32; HISTORY]) {
        self.qrs_median = median(peaks);
        self.noise_median = 0;
        self.rr_median = self.params.ms1000 as i32;
        self.search_back_count_limit = self.params.ms1500 + self.params.ms150;
        self.detection_threshold = threshold(self.qrs_median, self.noise_median);
    }

    fn evaluate(&mut self, peak: i32) -> Option<usize> {
        match self.slope_check.classify(&self.derivative_history) {
            PeakShape::Qrs => {}
            shape => {
                trace!("Rejected candidate {} as {:?}", peak, shape);
                return None;
            }
        }

        let window_width = self.params.window_width;
        if peak > self.detection_threshold {
            let interval = self.samples_since_last_detection.saturating_sub(window_width);
            self.accept(peak, interval);
            self.samples_since_last_detection = window_width;
            trace!(
                "Beat {} accepted, rr {} samples, threshold {}",
                peak,
                interval,
                self.detection_threshold
            );
            return Some(window_width + self.params.filter_delay);
        }

        push_newest(&mut self.noise_peaks, peak);
        self.noise_median = median(&self.noise_peaks);
        self.detection_threshold = threshold(self.qrs_median, self.noise_median);

        // Peaks soon after a beat may be T-waves, which would mask a small QRS
        let since_beat = self.samples_since_last_detection.saturating_sub(window_width);
        if peak > self.search_back_peak && since_beat >= self.params.ms360 {
            self.search_back_peak = peak;
            self.search_back_location = since_beat;
        }
        None
    }

    fn search_back(&mut self) -> Option<usize> {
        if self.samples_since_last_detection <= self.search_back_count_limit
            || self.search_back_peak <= self.detection_threshold >> 1
        {
            return None;
        }

        let (peak, location) = (self.search_back_peak, self.search_back_location);
        self.accept(peak, location);
        self.samples_since_last_detection -= location;
        let delay = self.samples_since_last_detection + self.params.filter_delay;
        debug!(
            "Search-back recovered beat {} ({} samples ago)",
            peak, delay
        );
        Some(delay)
    }

    fn accept(&mut self, peak: i32, interval: usize) {
        push_newest(&mut self.qrs_peaks, peak);
        self.qrs_median = median(&self.qrs_peaks);
        self.detection_threshold = threshold(self.qrs_median, self.noise_median);

        push_newest(&mut self.rr_intervals, interval as i32);
        self.rr_median = median(&self.rr_intervals);
        let rr_median = self.rr_median.max(0) as usize;
        self.search_back_count_limit = rr_median + (rr_median >> 1) + self.params.window_width;

        self.search_back_peak = 0;
        self.second_counter = 0;
        self.second_max = 0;
        self.reset_count = 0;
    }

    /// Collect per-second maxima in the background; after eight seconds
    /// without a beat they replace the QRS history.
    fn track_background_reset(&mut self, candidate: Option<i32>) {
        self.second_counter += 1;
        if self.second_counter == self.params.ms1000 {
            self.second_counter = 0;
            self.reset_peaks[self.reset_count] = self.second_max;
            self.second_max = 0;
            self.reset_count += 1;

            if self.reset_count == HISTORY {
                self.qrs_peaks = self.reset_peaks;
                self.noise_peaks = [0; HISTORY];
                let peaks = self.reset_peaks;
                self.reinitialise(&peaks);
                self.search_back_peak = 0;
                self.reset_count = 0;
                debug!(
                    "No beat for 8 s, threshold reset to {}",
                    self.detection_threshold
                );
            }
        }

        if let Some(peak) = candidate {
            self.second_max = self.second_max.max(peak);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 200;

    /// Impulse train with one beat per second, the first at sample 100.
    fn impulse_train(len: usize, amplitude: impl Fn(usize) -> i32) -> Vec<i32> {
        (0..len)
            .map(|n| {
                if n >= 100 && (n - 100) % 200 == 0 {
                    amplitude((n - 100) / 200)
                } else {
                    0
                }
            })
            .collect()
    }

    /// Run a detector and return `(sample index, delay)` for every beat.
    fn detect(signal: &[i32], settings: DetectorSettings) -> Vec<(usize, usize)> {
        let params = SampleRateParameters::new(RATE).unwrap();
        let mut detector = QrsDetector::with_settings(&params, settings);
        signal
            .iter()
            .enumerate()
            .filter_map(|(n, &s)| detector.process(s).map(|delay| (n, delay)))
            .collect()
    }

    #[test]
    fn test_median_is_upper_middle() {
        assert_eq!(median(&[8, 1, 7, 2, 6, 3, 5, 4]), 5);
        assert_eq!(median(&[0, 0, 0, 0, 9, 9, 9, 9]), 9);
    }

    #[test]
    fn test_threshold_truncates() {
        assert_eq!(threshold(91, 0), 43);
        assert_eq!(threshold(100, 20), 58);
    }

    #[test]
    fn test_pre_blank_keeps_the_larger_peak() {
        let mut hold = PreBlank::new(3);
        assert_eq!(hold.update(Some(10)), None);
        assert_eq!(hold.update(Some(20)), None);
        assert_eq!(hold.update(None), None);
        assert_eq!(hold.update(Some(5)), None);
        assert_eq!(hold.update(None), Some(20));
        assert_eq!(hold.update(None), None);
    }

    #[test]
    fn test_peak_tracker_emits_on_half_drop() {
        let mut tracker = PeakTracker::new(19);
        let emitted: Vec<Option<i32>> = [0, 10, 40, 80, 60, 39, 0]
            .iter()
            .map(|&d| tracker.update(d))
            .collect();
        assert_eq!(emitted, vec![None, None, None, None, None, Some(80), None]);
    }

    #[test]
    fn test_peak_tracker_emits_after_max_age() {
        let mut tracker = PeakTracker::new(3);
        let emitted: Vec<Option<i32>> = [50, 50, 50, 50, 50]
            .iter()
            .map(|&d| tracker.update(d))
            .collect();
        assert_eq!(emitted[..3], [None, None, None]);
        assert_eq!(emitted[3], Some(50));
    }

    #[test]
    fn test_no_detection_during_learning() {
        let signal = impulse_train(1600, |_| 2000);
        assert!(detect(&signal, DetectorSettings::default()).is_empty());
    }

    #[test]
    fn test_regular_beats_detected_once_each() {
        let params = SampleRateParameters::new(RATE).unwrap();
        let signal = impulse_train(4000, |_| 2000);
        let beats = detect(&signal, DetectorSettings::default());

        // Beats 8..=19 complete after the learning phase
        assert_eq!(beats.len(), 12);
        for &(n, delay) in &beats {
            assert_eq!(delay, params.window_width + params.filter_delay);
            let r_peak = n - delay;
            let offset = (r_peak as i64 - 100).rem_euclid(200);
            assert!(offset <= 3, "beat at {} is {} samples off", r_peak, offset);
        }
        for pair in beats.windows(2) {
            assert_eq!(pair[1].0 - pair[0].0, 200);
        }
    }

    #[test]
    fn test_constant_delay_across_heart_rates() {
        let params = SampleRateParameters::new(RATE).unwrap();
        // 180 bpm and 20 bpm
        for (rr, expected) in [(60, 174), (600, 17)] {
            let signal: Vec<i32> = (0..12000)
                .map(|n| if n >= 100 && (n - 100) % rr == 0 { 2000 } else { 0 })
                .collect();
            let beats = detect(&signal, DetectorSettings::default());

            assert_eq!(beats.len(), expected, "rr {}", rr);
            for &(n, delay) in &beats {
                assert_eq!(delay, params.window_width + params.filter_delay);
                assert!((n - delay - 100) % rr <= 3);
            }
            for pair in beats.windows(2) {
                assert_eq!(pair[1].0 - pair[0].0, rr);
            }
        }
    }

    #[test]
    fn test_search_back_recovers_missed_beat() {
        let params = SampleRateParameters::new(RATE).unwrap();
        // Beat 12 (R-peak at sample 2500) falls below the threshold
        let signal = impulse_train(4000, |k| if k == 12 { 700 } else { 2000 });
        let beats = detect(&signal, DetectorSettings::default());

        assert_eq!(beats.len(), 12);
        let normal_delay = params.window_width + params.filter_delay;
        let recovered: Vec<_> = beats.iter().filter(|&&(_, d)| d > normal_delay).collect();
        assert_eq!(recovered.len(), 1);

        let &(n, delay) = recovered[0];
        let r_peak = n - delay;
        assert!((2500..=2503).contains(&r_peak), "recovered at {}", r_peak);
        // The next regular beat is still found on schedule
        assert!(beats.iter().any(|&(n, _)| n == 2775));
    }

    #[test]
    fn test_threshold_resets_after_eight_silent_seconds() {
        // From beat 12 on the amplitude drops too far for search-back
        let signal = impulse_train(8000, |k| if k < 12 { 2000 } else { 300 });
        let beats = detect(&signal, DetectorSettings::default());

        let before: Vec<_> = beats.iter().filter(|&&(n, _)| n < 2500).collect();
        let after: Vec<_> = beats.iter().filter(|&&(n, _)| n > 2500).collect();
        assert_eq!(before.len(), 4);
        assert!(
            after.len() >= 15,
            "weak beats should be tracked after the reset, got {}",
            after.len()
        );
        for pair in after.windows(2) {
            assert_eq!(pair[1].0 - pair[0].0, 200);
        }
    }

    #[test]
    fn test_baseline_step_is_rejected() {
        let mut signal = impulse_train(4000, |_| 2000);
        for s in signal.iter_mut().skip(2450) {
            *s += 3000;
        }

        let beats = detect(&signal, DetectorSettings::default());
        assert_eq!(beats.len(), 12);

        // Without the limit the step itself is reported as a beat
        let permissive = DetectorSettings {
            baseline_shift_limit: i64::MAX,
        };
        assert!(detect(&signal, permissive).len() > 12);
    }

    #[test]
    fn test_slope_check_flags_trailing_hump() {
        let mut check = SlopeCheck {
            reference: 0,
            long_window: 8,
            short_window: 4,
            baseline_shift_limit: 100,
        };
        let mut history = RingBuffer::new(10);
        // Steep slope late in the long window, nothing in the short one
        for v in [0, 0, 0, 0, 0, 500, -500, 0, 0, 0] {
            history.push(v);
        }
        assert_eq!(check.classify(&history), PeakShape::Qrs);
        assert_eq!(check.classify(&history), PeakShape::TWave);
    }

    #[test]
    fn test_slope_check_flags_one_sided_slope() {
        let mut check = SlopeCheck {
            reference: 0,
            long_window: 8,
            short_window: 4,
            baseline_shift_limit: 100,
        };
        let mut history = RingBuffer::new(10);
        for v in [0, 400, 400, 0, 0, 0, 0, 0, 0, 0] {
            history.push(v);
        }
        assert_eq!(check.classify(&history), PeakShape::BaselineShift);
    }
}
