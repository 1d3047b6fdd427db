//! Error types for the filter graph

use thiserror::Error;

/// DSP processing errors
#[derive(Error, Debug)]
pub enum DspError {
    /// An FFT plan rejected the buffers it was handed
    #[error("fft processing failed in {stage}: {reason}")]
    Fft {
        /// The filter stage that failed
        stage: &'static str,
        /// The planner's error message
        reason: String,
    },
}

/// Result type for DSP operations
pub type DspResult<T> = Result<T, DspError>;
