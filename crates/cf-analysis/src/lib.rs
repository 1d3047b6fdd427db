//! CastForge measurement and adaptation engine
//!
//! Pass-1 analysis for the spoken-word post-processor:
//! - Interval analysis: fixed 250 ms windows with amplitude, spectral and
//!   windowed-loudness statistics
//! - Region election: scored silence (room tone) and speech candidates,
//!   with golden sub-window refinement of long regions
//! - Measurement synthesis: noise profile, suggested gate threshold and
//!   noise-reduction headroom for the downstream filter adapter
//!
//! The heavy lifting is done by three meters running over the decoded
//! input: an amplitude-statistics accumulator, a windowed-FFT spectral
//! extractor and an EBU R128 loudness meter (the `ebur128` crate). The
//! engine consumes their per-block metadata and never re-implements
//! loudness gating itself.

mod astats;
mod driver;
mod interval;
mod loudness;
mod measurements;
mod metadata;
mod prescan;
mod profile;
mod refine;
mod silence;
mod spectral;
mod speech;

pub use astats::{AmplitudeStats, AmplitudeSummary};
pub use driver::{analyze_regions, measure, measure_output, measure_region, AnalysisOptions};
pub use interval::{IntervalAccumulator, IntervalSample, RegionStats};
pub use loudness::{LoudnessAnalyzer, LoudnessSummary};
pub use measurements::{AudioMeasurements, OutputMeasurements, RegionSample};
pub use metadata::{keys, FrameMetadata};
pub use prescan::{room_tone_score, PreScan};
pub use profile::{
    gate_threshold_db, gate_threshold_linear, noise_profile, noise_reduction_headroom,
    NoiseProfile,
};
pub use refine::{refine_region, RefineParams};
pub use silence::{elect_silence, SilenceCandidate, SilenceElection};
pub use spectral::{SpectralAnalyzer, SpectralSnapshot};
pub use speech::{elect_speech, SpeechCandidate, SpeechElection};

use thiserror::Error;

/// Errors surfaced by the analysis engine
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The input produced no decoded frames at all
    #[error("no decoded frames in input")]
    EmptyInput,

    /// The loudness meter never produced an integrated measurement
    #[error("analysis produced no loudness measurement: {0}")]
    NoLoudness(String),

    /// The loudness meter could not be constructed or fed
    #[error("metering failed: {0}")]
    Meter(String),
}

/// Result alias for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Length of one analysis interval in seconds
pub const INTERVAL_SECONDS: f64 = 0.25;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
