pub mod analysis;
pub mod config;
pub mod data_loading;
pub mod error;
pub mod filters;
pub mod output;
pub mod parameters;
pub mod pat;
pub mod ppg_features;
pub mod ppg_segment;
pub mod qrs_detector;

pub use error::PipelineError;
pub use pat::{Heartbeat, PatPipeline, ProcessingEvent};

/// One time-aligned pair of raw ECG and PPG readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairedSample {
    pub ecg: i32,
    pub ppg: i32,
}
