//! Per-block frame metadata
//!
//! The metering chain publishes every measurement as a namespaced
//! key/value entry whose value parses as a floating-point number; the
//! interval accumulator and the re-measurement paths consume these maps
//! instead of reaching into the meters. Linear-ratio quantities are
//! converted to dB before they are published.

use std::collections::BTreeMap;

/// Well-known metadata keys
pub mod keys {
    /// Momentary loudness, 400 ms window (LUFS)
    pub const LOUDNESS_MOMENTARY: &str = "meter.loudness.momentary";
    /// Short-term loudness, 3 s window (LUFS)
    pub const LOUDNESS_SHORT_TERM: &str = "meter.loudness.short_term";
    /// Running maximum true peak (dBTP)
    pub const LOUDNESS_TRUE_PEAK: &str = "meter.loudness.true_peak";
    /// Running maximum sample peak (dBFS)
    pub const LOUDNESS_SAMPLE_PEAK: &str = "meter.loudness.sample_peak";

    /// Spectral keys, one per descriptor
    pub const SPECTRAL_MEAN: &str = "meter.spectral.mean";
    pub const SPECTRAL_VARIANCE: &str = "meter.spectral.variance";
    pub const SPECTRAL_CENTROID: &str = "meter.spectral.centroid";
    pub const SPECTRAL_SPREAD: &str = "meter.spectral.spread";
    pub const SPECTRAL_SKEWNESS: &str = "meter.spectral.skewness";
    pub const SPECTRAL_KURTOSIS: &str = "meter.spectral.kurtosis";
    pub const SPECTRAL_ENTROPY: &str = "meter.spectral.entropy";
    pub const SPECTRAL_FLATNESS: &str = "meter.spectral.flatness";
    pub const SPECTRAL_CREST: &str = "meter.spectral.crest";
    pub const SPECTRAL_FLUX: &str = "meter.spectral.flux";
    pub const SPECTRAL_SLOPE: &str = "meter.spectral.slope";
    pub const SPECTRAL_DECREASE: &str = "meter.spectral.decrease";
    pub const SPECTRAL_ROLLOFF: &str = "meter.spectral.rolloff";
}

/// One block's worth of published measurements
#[derive(Debug, Clone, Default)]
pub struct FrameMetadata {
    entries: BTreeMap<&'static str, String>,
}

impl FrameMetadata {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a value under a well-known key
    pub fn set(&mut self, key: &'static str, value: f64) {
        self.entries.insert(key, format!("{value:.9}"));
    }

    /// Read a value back, if present and parseable
    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries.get(key).and_then(|v| v.parse::<f64>().ok())
    }

    /// Read a value, substituting a default when absent or malformed
    ///
    /// Missing fields are treated as "not observed": callers accumulate
    /// nothing rather than failing.
    pub fn get_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).unwrap_or(default)
    }

    /// Number of published entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been published
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
