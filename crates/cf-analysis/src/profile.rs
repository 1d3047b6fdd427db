//! Measurement synthesis
//!
//! Packages the elected silence region into a noise profile and derives
//! the two quantities the adapter leans on hardest: the suggested gate
//! threshold (linear amplitude) and the noise-reduction headroom.

use cf_core::units;
use serde::{Deserialize, Serialize};

use crate::silence::SilenceCandidate;

/// Ideal noise-profile duration bounds (seconds)
const IDEAL_MIN_SECS: f64 = 8.0;
const IDEAL_MAX_SECS: f64 = 18.0;

/// Gate threshold placement: fallback headroom over the floor (dB)
const GATE_FALLBACK_DB: f64 = 6.0;
/// Gap fractions by gap size
const GATE_FRACTION_SMALL: f64 = 0.3;
const GATE_FRACTION_MEDIUM: f64 = 0.4;
const GATE_FRACTION_LARGE: f64 = 0.5;
const GATE_GAP_SMALL_DB: f64 = 10.0;
const GATE_GAP_MEDIUM_DB: f64 = 20.0;
/// Clamps on the threshold (dB)
const GATE_MIN_ABOVE_FLOOR_DB: f64 = 3.0;
const GATE_CEILING_DB: f64 = -35.0;

/// Headroom clamp (dB)
const HEADROOM_MAX_DB: f64 = 60.0;
/// Loudness-bucketed headroom fallbacks (dB)
const HEADROOM_LOUD_DB: f64 = 40.0;
const HEADROOM_MEDIUM_DB: f64 = 25.0;
const HEADROOM_QUIET_DB: f64 = 15.0;
const LOUDNESS_LOUD_LUFS: f64 = -20.0;
const LOUDNESS_MEDIUM_LUFS: f64 = -30.0;

/// The elected silence region's metrics, re-packaged for the adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseProfile {
    /// Region start (seconds)
    pub start: f64,
    /// Region duration (seconds)
    pub duration: f64,
    /// Average RMS over the region (dBFS)
    pub measured_noise_floor: f64,
    /// Maximum peak over the region (dBFS)
    pub peak_level: f64,
    /// peak_level − measured_noise_floor (dB)
    pub crest_factor: f64,
    /// Average spectral entropy
    pub entropy: f64,
    /// Average spectral centroid (Hz)
    pub centroid: f64,
    /// Average spectral flatness
    pub flatness: f64,
    /// Average spectral kurtosis
    pub kurtosis: f64,
    /// Non-fatal note about the extraction (short/long region)
    pub extraction_warning: Option<String>,
}

/// Build a noise profile from the elected silence candidate
pub fn noise_profile(candidate: &SilenceCandidate) -> NoiseProfile {
    let duration = candidate.span.duration();
    let extraction_warning = if duration < IDEAL_MIN_SECS {
        Some(format!(
            "using short silence region ({duration:.1} s) for the noise profile"
        ))
    } else if duration > IDEAL_MAX_SECS {
        Some(format!(
            "using long silence region ({duration:.1} s) for the noise profile"
        ))
    } else {
        None
    };

    NoiseProfile {
        start: candidate.span.start,
        duration,
        measured_noise_floor: candidate.stats.rms_level,
        peak_level: candidate.stats.peak_level,
        crest_factor: candidate.stats.peak_level - candidate.stats.rms_level,
        entropy: candidate.stats.entropy,
        centroid: candidate.stats.centroid,
        flatness: candidate.stats.flatness,
        kurtosis: candidate.stats.kurtosis,
        extraction_warning,
    }
}

/// Suggested gate threshold in dBFS
///
/// Sits at a data-driven fraction of the gap between the quietest
/// measured RMS and the noise floor, clamped to at least 3 dB above the
/// floor and never above −35 dBFS. `gate_threshold_linear` converts the
/// result for the gate itself.
pub fn gate_threshold_db(noise_floor: f64, rms_trough: f64) -> f64 {
    let threshold = if rms_trough <= noise_floor {
        noise_floor + GATE_FALLBACK_DB
    } else {
        let gap = rms_trough - noise_floor;
        let fraction = if gap < GATE_GAP_SMALL_DB {
            GATE_FRACTION_SMALL
        } else if gap < GATE_GAP_MEDIUM_DB {
            GATE_FRACTION_MEDIUM
        } else {
            GATE_FRACTION_LARGE
        };
        noise_floor + fraction * gap
    };

    threshold.max(noise_floor + GATE_MIN_ABOVE_FLOOR_DB).min(GATE_CEILING_DB)
}

/// Suggested gate threshold as a linear amplitude
pub fn gate_threshold_linear(noise_floor: f64, rms_trough: f64) -> f64 {
    units::db_to_linear(gate_threshold_db(noise_floor, rms_trough))
}

/// Noise-reduction headroom in dB
///
/// The usable distance between program material and the noise floor;
/// falls back to a loudness-bucketed constant when either input is
/// missing.
pub fn noise_reduction_headroom(rms_level: f64, noise_floor: f64, integrated_lufs: f64) -> f64 {
    if rms_level.is_finite()
        && noise_floor.is_finite()
        && rms_level > units::DB_FLOOR
        && noise_floor > units::DB_FLOOR
    {
        (rms_level - noise_floor).clamp(0.0, HEADROOM_MAX_DB)
    } else if integrated_lufs > LOUDNESS_LOUD_LUFS {
        HEADROOM_LOUD_DB
    } else if integrated_lufs > LOUDNESS_MEDIUM_LUFS {
        HEADROOM_MEDIUM_DB
    } else {
        HEADROOM_QUIET_DB
    }
}
