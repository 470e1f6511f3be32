use thiserror::Error;

/// Errors raised while configuring the processing core.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Every window length derives from the sample rate, so a zero rate
    /// cannot produce a working detector.
    #[error("sample rate must be a positive number of Hz, got {0}")]
    InvalidSampleRate(u32),
}
