//! Whole-file amplitude statistics
//!
//! The "latest value" accumulator family: cumulative RMS/peak levels,
//! per-block RMS trough and peak, DC offset, crest factor, zero
//! crossings, sample-difference statistics, amplitude entropy, flat
//! factor and the derived noise floor. All dB conversions go through
//! `cf_core::units` at the extraction boundary.

use cf_core::units;
use serde::{Deserialize, Serialize};

const HISTOGRAM_BINS: usize = 256;

/// Finalised whole-file amplitude statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmplitudeSummary {
    /// Cumulative RMS level (dBFS)
    pub rms_level: f64,
    /// Maximum absolute sample (dBFS)
    pub peak_level: f64,
    /// Quietest per-block RMS (dBFS)
    pub rms_trough: f64,
    /// Loudest per-block RMS (dBFS)
    pub rms_peak: f64,
    /// rms_peak − rms_trough (dB)
    pub dynamic_range: f64,
    /// Mean sample value
    pub dc_offset: f64,
    /// Average run length of repeated samples at the extremes
    pub flat_factor: f64,
    /// Peak-to-RMS ratio converted to dB
    pub crest_factor: f64,
    /// Number of sign changes
    pub zero_crossings: u64,
    /// Sign changes per sample
    pub zero_crossings_rate: f64,
    /// Mean absolute sample-to-sample difference
    pub mean_difference: f64,
    /// Smallest absolute sample-to-sample difference
    pub min_difference: f64,
    /// Largest absolute sample-to-sample difference
    pub max_difference: f64,
    /// Normalised amplitude-histogram entropy in [0, 1]
    pub entropy: f64,
    /// Most negative sample (dBFS of magnitude)
    pub min_level: f64,
    /// Most positive sample (dBFS of magnitude)
    pub max_level: f64,
    /// Noise floor estimate from the quietest blocks (dBFS)
    pub noise_floor: f64,
    /// Number of blocks within 1 dB of the noise floor
    pub noise_floor_count: u64,
    /// Source bit depth when known
    pub bit_depth: Option<u32>,
    /// Total samples observed
    pub sample_count: u64,
}

impl Default for AmplitudeSummary {
    fn default() -> Self {
        Self {
            rms_level: units::DB_FLOOR,
            peak_level: units::DB_FLOOR,
            rms_trough: units::DB_FLOOR,
            rms_peak: units::DB_FLOOR,
            dynamic_range: 0.0,
            dc_offset: 0.0,
            flat_factor: 0.0,
            crest_factor: 0.0,
            zero_crossings: 0,
            zero_crossings_rate: 0.0,
            mean_difference: 0.0,
            min_difference: 0.0,
            max_difference: 0.0,
            entropy: 0.0,
            min_level: units::DB_FLOOR,
            max_level: units::DB_FLOOR,
            noise_floor: units::DB_FLOOR,
            noise_floor_count: 0,
            bit_depth: None,
            sample_count: 0,
        }
    }
}

/// Streaming accumulator behind [`AmplitudeSummary`]
#[derive(Debug, Clone)]
pub struct AmplitudeStats {
    sum_squares: f64,
    sum: f64,
    count: u64,
    peak: f64,
    min_sample: f64,
    max_sample: f64,
    block_rms: Vec<f64>,
    zero_crossings: u64,
    prev_sample: Option<f64>,
    diff_sum: f64,
    diff_min: f64,
    diff_max: f64,
    diff_count: u64,
    histogram: [u64; HISTOGRAM_BINS],
    flat_runs: u64,
    flat_samples: u64,
    run_length: u64,
    bit_depth: Option<u32>,
}

impl AmplitudeStats {
    /// Create an empty accumulator
    pub fn new(bit_depth: Option<u32>) -> Self {
        Self {
            sum_squares: 0.0,
            sum: 0.0,
            count: 0,
            peak: 0.0,
            min_sample: 0.0,
            max_sample: 0.0,
            block_rms: Vec::new(),
            zero_crossings: 0,
            prev_sample: None,
            diff_sum: 0.0,
            diff_min: f64::INFINITY,
            diff_max: 0.0,
            diff_count: 0,
            histogram: [0; HISTOGRAM_BINS],
            flat_runs: 0,
            flat_samples: 0,
            run_length: 0,
            bit_depth,
        }
    }

    /// Accumulate one block of mono samples
    pub fn add_block(&mut self, block: &[f64]) {
        if block.is_empty() {
            return;
        }

        let mut block_sumsq = 0.0;
        for &s in block {
            let abs = s.abs();
            block_sumsq += s * s;
            self.sum += s;
            if abs > self.peak {
                self.peak = abs;
            }
            if s < self.min_sample {
                self.min_sample = s;
            }
            if s > self.max_sample {
                self.max_sample = s;
            }

            let bin = ((abs.min(1.0)) * (HISTOGRAM_BINS - 1) as f64) as usize;
            self.histogram[bin] += 1;

            if let Some(prev) = self.prev_sample {
                let diff = (s - prev).abs();
                self.diff_sum += diff;
                self.diff_count += 1;
                if diff < self.diff_min {
                    self.diff_min = diff;
                }
                if diff > self.diff_max {
                    self.diff_max = diff;
                }
                if (prev >= 0.0) != (s >= 0.0) {
                    self.zero_crossings += 1;
                }
                if s == prev && abs >= 0.999 {
                    self.run_length += 1;
                } else if self.run_length > 0 {
                    self.flat_runs += 1;
                    self.flat_samples += self.run_length;
                    self.run_length = 0;
                }
            }
            self.prev_sample = Some(s);
        }

        self.sum_squares += block_sumsq;
        self.count += block.len() as u64;
        self.block_rms
            .push(units::power_to_db(block_sumsq / block.len() as f64));
    }

    /// Finalise into a summary
    pub fn finalize(&self) -> AmplitudeSummary {
        let mut summary = AmplitudeSummary {
            bit_depth: self.bit_depth,
            sample_count: self.count,
            ..AmplitudeSummary::default()
        };
        if self.count == 0 {
            return summary;
        }

        let n = self.count as f64;
        let mean_square = self.sum_squares / n;
        let rms_linear = mean_square.sqrt();

        summary.rms_level = units::power_to_db(mean_square);
        summary.peak_level = units::linear_to_db(self.peak);
        summary.dc_offset = self.sum / n;
        summary.crest_factor = units::crest_db(self.peak, rms_linear);
        summary.zero_crossings = self.zero_crossings;
        summary.zero_crossings_rate = self.zero_crossings as f64 / n;
        summary.min_level = units::linear_to_db(self.min_sample.abs());
        summary.max_level = units::linear_to_db(self.max_sample.abs());

        if self.diff_count > 0 {
            summary.mean_difference = self.diff_sum / self.diff_count as f64;
            summary.min_difference = if self.diff_min.is_finite() {
                self.diff_min
            } else {
                0.0
            };
            summary.max_difference = self.diff_max;
        }

        if self.flat_runs > 0 {
            summary.flat_factor = self.flat_samples as f64 / self.flat_runs as f64;
        }

        // Histogram entropy, normalised by the bin count
        let mut entropy = 0.0;
        for &count in &self.histogram {
            if count > 0 {
                let p = count as f64 / n;
                entropy -= p * p.ln();
            }
        }
        summary.entropy = entropy / (HISTOGRAM_BINS as f64).ln();

        if !self.block_rms.is_empty() {
            let trough = self
                .block_rms
                .iter()
                .cloned()
                .fold(f64::INFINITY, f64::min);
            let peak = self
                .block_rms
                .iter()
                .cloned()
                .fold(f64::NEG_INFINITY, f64::max);
            summary.rms_trough = trough;
            summary.rms_peak = peak;
            summary.dynamic_range = peak - trough;
            summary.noise_floor = trough;
            summary.noise_floor_count = self
                .block_rms
                .iter()
                .filter(|&&rms| rms <= trough + 1.0)
                .count() as u64;
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sine_statistics() {
        let mut stats = AmplitudeStats::new(Some(16));
        let sine: Vec<f64> = (0..48000)
            .map(|i| (2.0 * std::f64::consts::PI * 440.0 * i as f64 / 48000.0).sin() * 0.5)
            .collect();
        stats.add_block(&sine);
        let summary = stats.finalize();

        // 0.5 amplitude sine: peak -6.02 dB, RMS -9.03 dB, crest ~3 dB
        assert_relative_eq!(summary.peak_level, -6.02, epsilon = 0.05);
        assert_relative_eq!(summary.rms_level, -9.03, epsilon = 0.05);
        assert_relative_eq!(summary.crest_factor, 3.01, epsilon = 0.05);
        assert!(summary.dc_offset.abs() < 1e-3);
        assert!(summary.zero_crossings > 800);
        assert_eq!(summary.sample_count, 48000);
    }

    #[test]
    fn trough_tracks_quietest_block() {
        let mut stats = AmplitudeStats::new(None);
        stats.add_block(&vec![0.5; 2048]);
        stats.add_block(&vec![0.005; 2048]);
        let summary = stats.finalize();

        assert!(summary.rms_trough < summary.rms_peak);
        assert_relative_eq!(summary.rms_trough, units::linear_to_db(0.005), epsilon = 0.1);
        assert_relative_eq!(summary.dynamic_range, 40.0, epsilon = 0.5);
        assert!(summary.noise_floor_count >= 1);
    }

    #[test]
    fn empty_input_yields_floor() {
        let stats = AmplitudeStats::new(None);
        let summary = stats.finalize();
        assert_eq!(summary.sample_count, 0);
        assert_eq!(summary.rms_level, units::DB_FLOOR);
    }
}
