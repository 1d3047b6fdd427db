//! Pipeline error kinds

use thiserror::Error;

/// Fatal errors surfaced by the processing pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Pass 1 could not establish measurements (no decoded frames or no
    /// integrated loudness). Nothing is written.
    #[error("analysis failed: {0}")]
    AnalysisFailed(String),

    /// Pass 3 measured the artifact as effectively silent; later passes
    /// are skipped.
    #[error("audio is silent ({lufs} LUFS measured)")]
    SilentAudio {
        /// The measured integrated loudness
        lufs: f64,
    },

    /// Pass 2 or Pass 4 could not complete the filter graph, the
    /// encoder or the in-place rename. Any temporary file is left on
    /// disk for diagnosis.
    #[error("processing failed: {0}")]
    ProcessingFailed(String),

    /// I/O errors propagate unmodified
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
