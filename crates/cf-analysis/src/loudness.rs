//! EBU R128 loudness metering
//!
//! Thin wrapper over the `ebur128` crate. The meter reports peaks as
//! linear ratios; conversion to dB happens here, at the extraction
//! boundary, through `cf_core::units`.

use cf_core::units;
use ebur128::{Channel, EbuR128, Mode};
use serde::{Deserialize, Serialize};

use crate::{AnalysisError, AnalysisResult};

/// Finalised whole-file loudness measurements
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoudnessSummary {
    /// Integrated loudness (LUFS)
    pub integrated: f64,
    /// Maximum true peak (dBTP)
    pub true_peak: f64,
    /// Maximum sample peak (dBFS)
    pub sample_peak: f64,
    /// Loudness range (LU)
    pub range: f64,
    /// Relative gating threshold (LUFS)
    pub threshold: f64,
}

impl Default for LoudnessSummary {
    fn default() -> Self {
        Self {
            integrated: f64::NEG_INFINITY,
            true_peak: units::DB_FLOOR,
            sample_peak: units::DB_FLOOR,
            range: 0.0,
            threshold: f64::NEG_INFINITY,
        }
    }
}

/// Streaming loudness analyzer
pub struct LoudnessAnalyzer {
    meter: EbuR128,
    channels: u32,
}

impl LoudnessAnalyzer {
    /// Create a meter for the given channel count and sample rate
    ///
    /// With `dual_mono` set, a single-channel input is measured as dual
    /// mono per EBU Tech 3344.
    pub fn new(channels: u32, sample_rate: u32, dual_mono: bool) -> AnalysisResult<Self> {
        let mode =
            Mode::M | Mode::S | Mode::I | Mode::LRA | Mode::TRUE_PEAK | Mode::SAMPLE_PEAK;
        let mut meter = EbuR128::new(channels, sample_rate, mode)
            .map_err(|e| AnalysisError::Meter(e.to_string()))?;

        if dual_mono && channels == 1 {
            meter
                .set_channel(0, Channel::DualMono)
                .map_err(|e| AnalysisError::Meter(e.to_string()))?;
        }

        Ok(Self { meter, channels })
    }

    /// Feed one block of interleaved samples
    pub fn add_block(&mut self, interleaved: &[f64]) -> AnalysisResult<()> {
        self.meter
            .add_frames_f64(interleaved)
            .map_err(|e| AnalysisError::Meter(e.to_string()))
    }

    /// Momentary loudness (400 ms window), floored to a finite value
    pub fn momentary(&self) -> f64 {
        finite_lufs(self.meter.loudness_momentary().unwrap_or(f64::NEG_INFINITY))
    }

    /// Short-term loudness (3 s window), floored to a finite value
    pub fn short_term(&self) -> f64 {
        finite_lufs(self.meter.loudness_shortterm().unwrap_or(f64::NEG_INFINITY))
    }

    /// Integrated loudness over everything fed so far
    ///
    /// Unlike the windowed getters this is not floored; the caller
    /// decides whether −∞ means "silent" or "failed".
    pub fn integrated(&self) -> AnalysisResult<f64> {
        self.meter
            .loudness_global()
            .map_err(|e| AnalysisError::NoLoudness(e.to_string()))
    }

    /// Maximum true peak so far across channels (dBTP)
    pub fn true_peak_db(&self) -> f64 {
        let linear = (0..self.channels)
            .filter_map(|ch| self.meter.true_peak(ch).ok())
            .fold(0.0, f64::max);
        units::linear_to_db(linear)
    }

    /// Maximum sample peak so far across channels (dBFS)
    pub fn sample_peak_db(&self) -> f64 {
        let linear = (0..self.channels)
            .filter_map(|ch| self.meter.sample_peak(ch).ok())
            .fold(0.0, f64::max);
        units::linear_to_db(linear)
    }

    /// True peak of the most recently fed block (dBTP)
    pub fn block_true_peak_db(&self) -> f64 {
        let linear = (0..self.channels)
            .filter_map(|ch| self.meter.prev_true_peak(ch).ok())
            .fold(0.0, f64::max);
        units::linear_to_db(linear)
    }

    /// Sample peak of the most recently fed block (dBFS)
    pub fn block_sample_peak_db(&self) -> f64 {
        let linear = (0..self.channels)
            .filter_map(|ch| self.meter.prev_sample_peak(ch).ok())
            .fold(0.0, f64::max);
        units::linear_to_db(linear)
    }

    /// Finalise the whole-file summary
    pub fn finalize(&self) -> AnalysisResult<LoudnessSummary> {
        let integrated = self.integrated()?;
        Ok(LoudnessSummary {
            integrated,
            true_peak: self.true_peak_db(),
            sample_peak: self.sample_peak_db(),
            range: self.meter.loudness_range().unwrap_or(0.0),
            threshold: self
                .meter
                .relative_threshold()
                .unwrap_or(f64::NEG_INFINITY),
        })
    }
}

fn finite_lufs(lufs: f64) -> f64 {
    if lufs.is_finite() {
        lufs
    } else {
        units::DB_FLOOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, rate: u32, seconds: f64, amplitude: f64) -> Vec<f64> {
        let len = (rate as f64 * seconds) as usize;
        (0..len)
            .map(|i| {
                (2.0 * std::f64::consts::PI * freq * i as f64 / rate as f64).sin() * amplitude
            })
            .collect()
    }

    #[test]
    fn tone_measures_in_plausible_range() {
        let mut analyzer = LoudnessAnalyzer::new(1, 48000, false).unwrap();
        analyzer.add_block(&sine(1000.0, 48000, 5.0, 0.25)).unwrap();

        let summary = analyzer.finalize().unwrap();
        assert!(summary.integrated > -40.0 && summary.integrated < 0.0);
        // 0.25 amplitude -> sample peak near -12 dBFS
        assert!((summary.sample_peak + 12.04).abs() < 0.5);
        assert!(summary.true_peak >= summary.sample_peak - 0.2);
    }

    #[test]
    fn momentary_is_always_finite() {
        let analyzer = LoudnessAnalyzer::new(1, 48000, false).unwrap();
        assert!(analyzer.momentary().is_finite());
        assert!(analyzer.short_term().is_finite());
    }

    #[test]
    fn dual_mono_reads_louder_than_mono() {
        let tone = sine(1000.0, 48000, 5.0, 0.25);

        let mut mono = LoudnessAnalyzer::new(1, 48000, false).unwrap();
        mono.add_block(&tone).unwrap();
        let mut dual = LoudnessAnalyzer::new(1, 48000, true).unwrap();
        dual.add_block(&tone).unwrap();

        let mono_i = mono.finalize().unwrap().integrated;
        let dual_i = dual.finalize().unwrap().integrated;
        assert!(dual_i > mono_i + 2.0, "dual {dual_i} mono {mono_i}");
    }
}
