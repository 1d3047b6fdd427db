//! Measurement bundles
//!
//! `AudioMeasurements` is the whole-file summary Pass 1 produces and the
//! adapter consumes. `OutputMeasurements` is its post-filtering
//! counterpart: the same accumulator family minus region detection,
//! plus per-elected-region re-measurements of the processed artifact.

use cf_core::TimeSpan;
use serde::{Deserialize, Serialize};

use crate::astats::AmplitudeSummary;
use crate::interval::IntervalSample;
use crate::loudness::LoudnessSummary;
use crate::profile::NoiseProfile;
use crate::silence::SilenceCandidate;
use crate::spectral::SpectralSnapshot;
use crate::speech::SpeechCandidate;

/// Whole-file measurements from the Pass-1 analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioMeasurements {
    /// Input duration in seconds
    pub duration: f64,
    /// Input sample rate
    pub sample_rate: u32,
    /// Integrated loudness, true peak, LRA, gating threshold
    pub loudness: LoudnessSummary,
    /// target_i − integrated (LU of gain the normaliser would apply)
    pub target_offset: f64,
    /// Effective noise floor (dBFS); overridden by the elected profile
    pub noise_floor: f64,
    /// Pre-scan room-tone floor estimate (dBFS)
    pub prescan_noise_floor: f64,
    /// Adaptive silence-detect threshold (dBFS)
    pub silence_detect_level: f64,
    /// Thirteen-dimensional spectral average over the whole file
    pub spectral_average: SpectralSnapshot,
    /// Whole-file amplitude statistics
    pub amplitude: AmplitudeSummary,
    /// Ordered 250 ms interval sequence
    pub intervals: Vec<IntervalSample>,
    /// Scored silence candidates in discovery order
    pub silence_candidates: Vec<SilenceCandidate>,
    /// Scored speech candidates in discovery order
    pub speech_candidates: Vec<SpeechCandidate>,
    /// Elected noise profile, when a silence region was found
    pub noise_profile: Option<NoiseProfile>,
    /// Elected speech candidate, when one was found
    pub elected_speech: Option<SpeechCandidate>,
    /// Suggested gate threshold (linear amplitude)
    pub suggested_gate_threshold: f64,
    /// Noise-reduction headroom (dB)
    pub noise_reduction_headroom: f64,
    /// Non-fatal measurement warnings collected along the way
    pub warnings: Vec<String>,
}

/// Re-measurement of one elected region on the processed artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionSample {
    /// The region that was trimmed and re-measured
    pub span: TimeSpan,
    /// Amplitude statistics over the region
    pub amplitude: AmplitudeSummary,
    /// Spectral average over the region
    pub spectral: SpectralSnapshot,
    /// Loudness over the region; absent when the meter produced no
    /// usable integrated value for the trimmed slice
    pub loudness: Option<LoudnessSummary>,
    /// Non-fatal warnings (e.g. loudness not captured)
    pub warnings: Vec<String>,
}

/// Whole-file measurements of the Pass-2 artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputMeasurements {
    /// Output duration in seconds
    pub duration: f64,
    /// Output sample rate
    pub sample_rate: u32,
    /// Integrated loudness, true peak, LRA, gating threshold
    pub loudness: LoudnessSummary,
    /// Thirteen-dimensional spectral average
    pub spectral_average: SpectralSnapshot,
    /// Whole-file amplitude statistics
    pub amplitude: AmplitudeSummary,
    /// Ordered 250 ms interval sequence
    pub intervals: Vec<IntervalSample>,
    /// Elected silence region, re-measured on the processed audio
    pub silence_sample: Option<RegionSample>,
    /// Elected speech region, re-measured on the processed audio
    pub speech_sample: Option<RegionSample>,
}
