use crate::error::PipelineError;

/// Millisecond windows expressed as sample counts for one sample rate.
///
/// Built once per channel at configuration time and never mutated. Every
/// window is at least one sample long, so very low sample rates still yield
/// usable (if coarse) buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRateParameters {
    pub sample_rate: u32,

    pub ms10: usize,
    pub ms25: usize,
    pub ms30: usize,
    pub ms80: usize,
    pub ms95: usize,
    pub ms100: usize,
    pub ms125: usize,
    pub ms150: usize,
    pub ms160: usize,
    pub ms175: usize,
    pub ms195: usize,
    pub ms200: usize,
    pub ms220: usize,
    pub ms250: usize,
    pub ms300: usize,
    pub ms360: usize,
    pub ms450: usize,
    pub ms500: usize,
    pub ms1000: usize,
    pub ms1500: usize,

    /// Lag of the first-difference stages
    pub derivative_length: usize,
    /// Low-pass stage buffer, shared by the ECG and PPG cascades
    pub low_pass_buffer_length: usize,
    /// High-pass stage buffer of the ECG (QRS band) cascade
    pub high_pass_buffer_length: usize,
    /// High-pass stage buffer of the PPG (baseline removal) cascade
    pub ppg_high_pass_buffer_length: usize,
    /// Moving-window integrator width
    pub window_width: usize,
    /// Hold window during which a larger raw peak supersedes the held one
    pub pre_blank: usize,
    /// Combined derivative, low-pass, high-pass and pre-blank latency of the
    /// ECG path, excluding the integrator window
    pub filter_delay: usize,
    /// Length of the raw-derivative history used for slope checks. It spans
    /// the full detection latency so its oldest sample sits at the beat.
    pub derivative_history_length: usize,
    /// Number of samples a filtered PPG value lags the raw sample it reflects.
    /// Never longer than the normal detection latency, so the filtered
    /// stream already holds the R-peak sample when a beat is confirmed.
    pub ppg_filter_delay: usize,
}

/// Convert a window in milliseconds to samples, rounding half up and never
/// returning an empty window.
fn ms_to_samples(millis: u64, sample_rate: u32) -> usize {
    let samples = (millis * u64::from(sample_rate) + 500) / 1000;
    samples.max(1) as usize
}

impl SampleRateParameters {
    pub fn new(sample_rate: u32) -> Result<Self, PipelineError> {
        if sample_rate == 0 {
            return Err(PipelineError::InvalidSampleRate(sample_rate));
        }
        let ms = |millis: u64| ms_to_samples(millis, sample_rate);

        let derivative_length = ms(10);
        let low_pass_buffer_length = 2 * ms(25);
        let high_pass_buffer_length = ms(125);
        let ppg_high_pass_buffer_length = ms(500);
        let window_width = ms(80);
        let pre_blank = ms(200);

        let filter_delay = derivative_length / 2
            + (low_pass_buffer_length / 2 - 1)
            + (high_pass_buffer_length - 1) / 2
            + pre_blank;
        let derivative_history_length = (window_width + filter_delay + ms(100)).max(ms(360));
        let ppg_filter_delay = (low_pass_buffer_length / 2 - 1) + ppg_high_pass_buffer_length / 2;

        Ok(Self {
            sample_rate,
            ms10: ms(10),
            ms25: ms(25),
            ms30: ms(30),
            ms80: ms(80),
            ms95: ms(95),
            ms100: ms(100),
            ms125: ms(125),
            ms150: ms(150),
            ms160: ms(160),
            ms175: ms(175),
            ms195: ms(195),
            ms200: ms(200),
            ms220: ms(220),
            ms250: ms(250),
            ms300: ms(300),
            ms360: ms(360),
            ms450: ms(450),
            ms500: ms(500),
            ms1000: ms(1000),
            ms1500: ms(1500),
            derivative_length,
            low_pass_buffer_length,
            high_pass_buffer_length,
            ppg_high_pass_buffer_length,
            window_width,
            pre_blank,
            filter_delay,
            derivative_history_length,
            ppg_filter_delay,
        })
    }

    pub fn samples_to_ms(&self, samples: f64) -> f64 {
        samples * 1000.0 / f64::from(self.sample_rate)
    }
}
