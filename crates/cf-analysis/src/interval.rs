//! 250 ms interval accumulation
//!
//! Interval boundaries are computed from *input* sample counts, never
//! from meter-side timestamps, so a resampling meter cannot skew the
//! timeline. Raw RMS and peak come straight from the pre-meter samples
//! and stay comparable across passes; the metering chain only
//! contributes the spectral and windowed-loudness quantities.

use cf_core::units;
use serde::{Deserialize, Serialize};

use crate::metadata::{keys, FrameMetadata};
use crate::spectral::SpectralSnapshot;
use crate::INTERVAL_SECONDS;

/// A snapshot of one fixed 250 ms window of the input signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IntervalSample {
    /// Window start in seconds, strictly increasing across the sequence
    pub timestamp: f64,
    /// RMS of the raw input samples in the window (dBFS)
    pub rms_level: f64,
    /// Largest absolute raw input sample in the window (dBFS)
    pub peak_level: f64,
    /// Spectral descriptors averaged over the frames in the window
    pub spectral: SpectralSnapshot,
    /// Average momentary loudness over the window (LUFS)
    pub momentary_lufs: f64,
    /// Average short-term loudness over the window (LUFS)
    pub short_term_lufs: f64,
    /// Maximum true peak observed in the window (dBTP)
    pub true_peak: f64,
    /// Maximum sample peak observed in the window (dBFS)
    pub sample_peak: f64,
}

impl IntervalSample {
    /// True when every attribute is finite
    pub fn is_finite(&self) -> bool {
        self.timestamp.is_finite()
            && self.rms_level.is_finite()
            && self.peak_level.is_finite()
            && self.momentary_lufs.is_finite()
            && self.short_term_lufs.is_finite()
            && self.true_peak.is_finite()
            && self.sample_peak.is_finite()
            && self.spectral.is_finite()
    }
}

/// Accumulates raw samples and metering metadata into interval samples
pub struct IntervalAccumulator {
    sample_rate: u32,
    window_len: u64,
    intervals: Vec<IntervalSample>,

    consumed: u64,
    window_start: u64,
    sum_squares: f64,
    count: u64,
    peak: f64,
    spectral_sum: SpectralSnapshot,
    spectral_frames: u64,
    momentary_sum: f64,
    short_term_sum: f64,
    loudness_frames: u64,
    true_peak_max: f64,
    sample_peak_max: f64,
}

impl IntervalAccumulator {
    /// Create an accumulator for a given input sample rate
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            window_len: (sample_rate as f64 * INTERVAL_SECONDS) as u64,
            intervals: Vec::new(),
            consumed: 0,
            window_start: 0,
            sum_squares: 0.0,
            count: 0,
            peak: 0.0,
            spectral_sum: SpectralSnapshot::default(),
            spectral_frames: 0,
            momentary_sum: 0.0,
            short_term_sum: 0.0,
            loudness_frames: 0,
            true_peak_max: units::DB_FLOOR,
            sample_peak_max: units::DB_FLOOR,
        }
    }

    /// Feed one block of raw mono input plus the metering metadata the
    /// chain published for it
    ///
    /// The metadata is attributed to the window containing the block's
    /// first sample; raw amplitude accumulation is split exactly at the
    /// window boundary.
    pub fn add_block(&mut self, raw: &[f64], meta: &FrameMetadata) {
        self.absorb_metadata(meta);

        let mut offset = 0usize;
        while offset < raw.len() {
            let remaining_in_window =
                (self.window_len - (self.consumed - self.window_start)) as usize;
            let take = remaining_in_window.min(raw.len() - offset);

            for &s in &raw[offset..offset + take] {
                self.sum_squares += s * s;
                let abs = s.abs();
                if abs > self.peak {
                    self.peak = abs;
                }
            }
            self.count += take as u64;
            self.consumed += take as u64;
            offset += take;

            if self.consumed - self.window_start >= self.window_len {
                self.close_window();
            }
        }
    }

    /// Close the final partial window (if it saw any input) and return
    /// the ordered interval sequence
    pub fn finish(mut self) -> Vec<IntervalSample> {
        if self.count > 0 {
            self.close_window();
        }
        self.intervals
    }

    fn absorb_metadata(&mut self, meta: &FrameMetadata) {
        if meta.is_empty() {
            return;
        }

        if let Some(centroid) = meta.get(keys::SPECTRAL_CENTROID) {
            self.spectral_sum.accumulate(&SpectralSnapshot {
                mean: meta.get_or(keys::SPECTRAL_MEAN, 0.0),
                variance: meta.get_or(keys::SPECTRAL_VARIANCE, 0.0),
                centroid,
                spread: meta.get_or(keys::SPECTRAL_SPREAD, 0.0),
                skewness: meta.get_or(keys::SPECTRAL_SKEWNESS, 0.0),
                kurtosis: meta.get_or(keys::SPECTRAL_KURTOSIS, 0.0),
                entropy: meta.get_or(keys::SPECTRAL_ENTROPY, 0.0),
                flatness: meta.get_or(keys::SPECTRAL_FLATNESS, 0.0),
                crest: meta.get_or(keys::SPECTRAL_CREST, 0.0),
                flux: meta.get_or(keys::SPECTRAL_FLUX, 0.0),
                slope: meta.get_or(keys::SPECTRAL_SLOPE, 0.0),
                decrease: meta.get_or(keys::SPECTRAL_DECREASE, 0.0),
                rolloff: meta.get_or(keys::SPECTRAL_ROLLOFF, 0.0),
            });
            self.spectral_frames += 1;
        }

        if let Some(momentary) = meta.get(keys::LOUDNESS_MOMENTARY) {
            self.momentary_sum += momentary;
            self.short_term_sum += meta.get_or(keys::LOUDNESS_SHORT_TERM, momentary);
            self.loudness_frames += 1;
        }
        if let Some(tp) = meta.get(keys::LOUDNESS_TRUE_PEAK) {
            if tp > self.true_peak_max {
                self.true_peak_max = tp;
            }
        }
        if let Some(sp) = meta.get(keys::LOUDNESS_SAMPLE_PEAK) {
            if sp > self.sample_peak_max {
                self.sample_peak_max = sp;
            }
        }
    }

    fn close_window(&mut self) {
        // Only emit when at least one input sample contributed
        if self.count > 0 {
            let mut spectral = self.spectral_sum;
            spectral.scale(self.spectral_frames as f64);

            let (momentary, short_term) = if self.loudness_frames > 0 {
                (
                    self.momentary_sum / self.loudness_frames as f64,
                    self.short_term_sum / self.loudness_frames as f64,
                )
            } else {
                (units::DB_FLOOR, units::DB_FLOOR)
            };

            self.intervals.push(IntervalSample {
                timestamp: self.window_start as f64 / self.sample_rate as f64,
                rms_level: units::power_to_db(self.sum_squares / self.count as f64),
                peak_level: units::linear_to_db(self.peak),
                spectral,
                momentary_lufs: momentary,
                short_term_lufs: short_term,
                true_peak: self.true_peak_max,
                sample_peak: self.sample_peak_max,
            });
        }

        self.window_start = self.consumed;
        self.sum_squares = 0.0;
        self.count = 0;
        self.peak = 0.0;
        self.spectral_sum = SpectralSnapshot::default();
        self.spectral_frames = 0;
        self.momentary_sum = 0.0;
        self.short_term_sum = 0.0;
        self.loudness_frames = 0;
        self.true_peak_max = units::DB_FLOOR;
        self.sample_peak_max = units::DB_FLOOR;
    }
}

/// Aggregated statistics over a contiguous run of intervals
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RegionStats {
    /// Mean interval RMS (dBFS)
    pub rms_level: f64,
    /// Variance of interval RMS levels (dB²)
    pub rms_variance: f64,
    /// Maximum interval peak (dBFS)
    pub peak_level: f64,
    /// peak_level − rms_level (dB)
    pub crest_factor: f64,
    /// Mean spectral centroid (Hz)
    pub centroid: f64,
    /// Mean spectral flatness
    pub flatness: f64,
    /// Mean spectral kurtosis
    pub kurtosis: f64,
    /// Mean spectral entropy
    pub entropy: f64,
    /// Mean spectral flux
    pub flux: f64,
    /// Mean spectral rolloff (Hz)
    pub rolloff: f64,
    /// Proportion of intervals with kurtosis above the voicing knee
    pub voicing_density: f64,
}

/// Kurtosis above this marks an interval as voiced
const VOICING_KURTOSIS: f64 = 4.5;

impl RegionStats {
    /// Aggregate a run of intervals
    pub fn from_intervals(intervals: &[IntervalSample]) -> Self {
        if intervals.is_empty() {
            return Self::default();
        }
        let n = intervals.len() as f64;

        let rms_mean = intervals.iter().map(|i| i.rms_level).sum::<f64>() / n;
        let rms_variance = intervals
            .iter()
            .map(|i| (i.rms_level - rms_mean).powi(2))
            .sum::<f64>()
            / n;
        let peak = intervals
            .iter()
            .map(|i| i.peak_level)
            .fold(f64::NEG_INFINITY, f64::max);
        let voiced = intervals
            .iter()
            .filter(|i| i.spectral.kurtosis > VOICING_KURTOSIS)
            .count() as f64;

        Self {
            rms_level: rms_mean,
            rms_variance,
            peak_level: peak,
            crest_factor: peak - rms_mean,
            centroid: intervals.iter().map(|i| i.spectral.centroid).sum::<f64>() / n,
            flatness: intervals.iter().map(|i| i.spectral.flatness).sum::<f64>() / n,
            kurtosis: intervals.iter().map(|i| i.spectral.kurtosis).sum::<f64>() / n,
            entropy: intervals.iter().map(|i| i.spectral.entropy).sum::<f64>() / n,
            flux: intervals.iter().map(|i| i.spectral.flux).sum::<f64>() / n,
            rolloff: intervals.iter().map(|i| i.spectral.rolloff).sum::<f64>() / n,
            voicing_density: voiced / n,
        }
    }
}
