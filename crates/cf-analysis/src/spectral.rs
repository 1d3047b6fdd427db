//! Windowed-FFT spectral statistics
//!
//! Produces the thirteen per-frame spectral descriptors the region
//! electors and the adapter read: shape moments, entropy, flatness,
//! crest, flux, slope, decrease and rolloff.

use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{AnalysisError, AnalysisResult};

/// One frame (or one average) of spectral descriptors
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectralSnapshot {
    /// Mean bin magnitude
    pub mean: f64,
    /// Variance of bin magnitudes
    pub variance: f64,
    /// Magnitude-weighted mean frequency (Hz)
    pub centroid: f64,
    /// Magnitude-weighted standard deviation around the centroid (Hz)
    pub spread: f64,
    /// Third standardised moment of the spectral distribution
    pub skewness: f64,
    /// Fourth standardised moment of the spectral distribution
    pub kurtosis: f64,
    /// Normalised spectral entropy in [0, 1]
    pub entropy: f64,
    /// Geometric-to-arithmetic magnitude mean ratio in [0, 1]
    pub flatness: f64,
    /// Peak-to-mean magnitude ratio
    pub crest: f64,
    /// Frame-to-frame change of the normalised spectrum
    pub flux: f64,
    /// Regression slope of magnitude over frequency
    pub slope: f64,
    /// Perceptual decrease (low-frequency weighted magnitude falloff)
    pub decrease: f64,
    /// Frequency below which 85 % of spectral energy lies (Hz)
    pub rolloff: f64,
}

impl SpectralSnapshot {
    /// Add another snapshot field-by-field (used for running averages)
    pub fn accumulate(&mut self, other: &SpectralSnapshot) {
        self.mean += other.mean;
        self.variance += other.variance;
        self.centroid += other.centroid;
        self.spread += other.spread;
        self.skewness += other.skewness;
        self.kurtosis += other.kurtosis;
        self.entropy += other.entropy;
        self.flatness += other.flatness;
        self.crest += other.crest;
        self.flux += other.flux;
        self.slope += other.slope;
        self.decrease += other.decrease;
        self.rolloff += other.rolloff;
    }

    /// Divide every field by a frame count
    pub fn scale(&mut self, divisor: f64) {
        if divisor <= 0.0 {
            return;
        }
        self.mean /= divisor;
        self.variance /= divisor;
        self.centroid /= divisor;
        self.spread /= divisor;
        self.skewness /= divisor;
        self.kurtosis /= divisor;
        self.entropy /= divisor;
        self.flatness /= divisor;
        self.crest /= divisor;
        self.flux /= divisor;
        self.slope /= divisor;
        self.decrease /= divisor;
        self.rolloff /= divisor;
    }

    /// True when every field is finite
    pub fn is_finite(&self) -> bool {
        [
            self.mean,
            self.variance,
            self.centroid,
            self.spread,
            self.skewness,
            self.kurtosis,
            self.entropy,
            self.flatness,
            self.crest,
            self.flux,
            self.slope,
            self.decrease,
            self.rolloff,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// Proportion of spectral energy below the rolloff frequency
const ROLLOFF_FRACTION: f64 = 0.85;

/// Streaming spectral analyzer over fixed-size windows
pub struct SpectralAnalyzer {
    sample_rate: u32,
    fft_size: usize,
    fft: Arc<dyn RealToComplex<f64>>,
    window: Vec<f64>,
    scratch: Vec<f64>,
    spectrum: Vec<Complex<f64>>,
    prev_normalized: Vec<f64>,
    have_prev: bool,
    sum: SpectralSnapshot,
    frames: u64,
}

impl SpectralAnalyzer {
    /// Create an analyzer for a given sample rate and FFT size
    pub fn new(sample_rate: u32, fft_size: usize) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let bins = fft_size / 2 + 1;

        // Hann window
        let window: Vec<f64> = (0..fft_size)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * i as f64 / fft_size as f64;
                0.5 * (1.0 - phase.cos())
            })
            .collect();

        Self {
            sample_rate,
            fft_size,
            fft,
            window,
            scratch: vec![0.0; fft_size],
            spectrum: vec![Complex::new(0.0, 0.0); bins],
            prev_normalized: vec![0.0; bins],
            have_prev: false,
            sum: SpectralSnapshot::default(),
            frames: 0,
        }
    }

    /// Analyze one block of mono samples and return its descriptors
    ///
    /// Blocks shorter than the FFT size are zero-padded; longer blocks
    /// use only the leading `fft_size` samples (the driver feeds blocks
    /// of exactly the FFT size except for the final one).
    pub fn analyze_block(&mut self, block: &[f64]) -> AnalysisResult<SpectralSnapshot> {
        let n = block.len().min(self.fft_size);
        for i in 0..n {
            self.scratch[i] = block[i] * self.window[i];
        }
        for s in &mut self.scratch[n..] {
            *s = 0.0;
        }

        self.fft
            .process(&mut self.scratch, &mut self.spectrum)
            .map_err(|e| AnalysisError::Meter(format!("spectral fft: {e}")))?;

        let magnitudes: Vec<f64> = self.spectrum.iter().map(|c| c.norm()).collect();
        let snapshot = self.describe(&magnitudes);

        self.sum.accumulate(&snapshot);
        self.frames += 1;
        Ok(snapshot)
    }

    /// Average of every snapshot produced so far
    pub fn average(&self) -> SpectralSnapshot {
        let mut avg = self.sum;
        avg.scale(self.frames as f64);
        avg
    }

    /// Number of analyzed frames
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn bin_freq(&self, bin: usize, bins: usize) -> f64 {
        bin as f64 * self.sample_rate as f64 / (2.0 * (bins - 1) as f64)
    }

    fn describe(&mut self, magnitudes: &[f64]) -> SpectralSnapshot {
        let bins = magnitudes.len();
        let total: f64 = magnitudes.iter().sum();
        let n = bins as f64;

        let mean = total / n;
        let variance = magnitudes.iter().map(|m| (m - mean).powi(2)).sum::<f64>() / n;

        // Magnitude-weighted frequency moments
        let (mut centroid, mut spread, mut skewness, mut kurtosis) = (0.0, 0.0, 0.0, 0.0);
        if total > 1e-12 {
            for (i, &m) in magnitudes.iter().enumerate() {
                centroid += self.bin_freq(i, bins) * m;
            }
            centroid /= total;

            let mut m2 = 0.0;
            let mut m3 = 0.0;
            let mut m4 = 0.0;
            for (i, &m) in magnitudes.iter().enumerate() {
                let d = self.bin_freq(i, bins) - centroid;
                m2 += d * d * m;
                m3 += d * d * d * m;
                m4 += d * d * d * d * m;
            }
            m2 /= total;
            m3 /= total;
            m4 /= total;

            spread = m2.sqrt();
            if spread > 1e-9 {
                skewness = m3 / spread.powi(3);
                kurtosis = m4 / spread.powi(4);
            }
        }

        // Entropy and flatness over the normalised spectrum
        let mut entropy = 0.0;
        let mut log_sum = 0.0;
        if total > 1e-12 {
            for &m in magnitudes {
                let p = m / total;
                if p > 1e-12 {
                    entropy -= p * p.ln();
                }
                log_sum += m.max(1e-12).ln();
            }
            entropy /= n.ln();
        }
        let geometric_mean = (log_sum / n).exp();
        let flatness = if mean > 1e-12 {
            (geometric_mean / mean).min(1.0)
        } else {
            0.0
        };

        let peak = magnitudes.iter().cloned().fold(0.0, f64::max);
        let crest = if mean > 1e-12 { peak / mean } else { 0.0 };

        // Flux against the previous frame's normalised spectrum
        let mut flux = 0.0;
        if total > 1e-12 {
            if self.have_prev {
                for (i, &m) in magnitudes.iter().enumerate() {
                    let p = m / total;
                    let d = p - self.prev_normalized[i];
                    flux += d * d;
                }
                flux = flux.sqrt();
            }
            for (i, &m) in magnitudes.iter().enumerate() {
                self.prev_normalized[i] = m / total;
            }
            self.have_prev = true;
        }

        // Regression slope of magnitude over frequency, scaled by the
        // total magnitude so loud and quiet frames compare
        let mut slope = 0.0;
        if total > 1e-12 {
            let mean_freq: f64 =
                (0..bins).map(|i| self.bin_freq(i, bins)).sum::<f64>() / n;
            let mut num = 0.0;
            let mut den = 0.0;
            for (i, &m) in magnitudes.iter().enumerate() {
                let df = self.bin_freq(i, bins) - mean_freq;
                num += df * (m - mean);
                den += df * df;
            }
            if den > 1e-9 {
                slope = num / (den * mean.max(1e-12));
            }
        }

        // Spectral decrease: low-frequency weighted falloff
        let mut decrease = 0.0;
        let tail: f64 = magnitudes[1..].iter().sum();
        if tail > 1e-12 {
            for (k, &m) in magnitudes.iter().enumerate().skip(1) {
                decrease += (m - magnitudes[0]) / k as f64;
            }
            decrease /= tail;
        }

        // Rolloff: frequency under which ROLLOFF_FRACTION of energy lies
        let energy_total: f64 = magnitudes.iter().map(|m| m * m).sum();
        let mut rolloff = 0.0;
        if energy_total > 1e-12 {
            let target = ROLLOFF_FRACTION * energy_total;
            let mut cumulative = 0.0;
            for (i, &m) in magnitudes.iter().enumerate() {
                cumulative += m * m;
                if cumulative >= target {
                    rolloff = self.bin_freq(i, bins);
                    break;
                }
            }
        }

        SpectralSnapshot {
            mean,
            variance,
            centroid,
            spread,
            skewness,
            kurtosis,
            entropy,
            flatness,
            crest,
            flux,
            slope,
            decrease,
            rolloff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, rate: u32, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / rate as f64).sin() * 0.5)
            .collect()
    }

    #[test]
    fn sine_centroid_lands_near_tone() {
        let mut analyzer = SpectralAnalyzer::new(48000, 2048);
        let snap = analyzer.analyze_block(&sine(1000.0, 48000, 2048)).unwrap();

        // Leakage pulls the weighted mean around; the tone still dominates
        assert!(snap.centroid > 500.0 && snap.centroid < 4000.0);
        assert!(snap.flatness < 0.5);
        assert!(snap.is_finite());
    }

    #[test]
    fn white_noise_is_flat_and_entropic() {
        let mut analyzer = SpectralAnalyzer::new(48000, 2048);
        // Deterministic pseudo-noise
        let noise: Vec<f64> = (0..2048)
            .map(|i| ((i as f64 * 12.9898).sin() * 43758.5453).fract().abs() - 0.5)
            .collect();
        let snap = analyzer.analyze_block(&noise).unwrap();

        assert!(snap.flatness > 0.3, "flatness {}", snap.flatness);
        assert!(snap.entropy > 0.8, "entropy {}", snap.entropy);
        assert!(snap.is_finite());
    }

    #[test]
    fn silence_stays_finite() {
        let mut analyzer = SpectralAnalyzer::new(48000, 2048);
        let snap = analyzer.analyze_block(&vec![0.0; 2048]).unwrap();
        assert!(snap.is_finite());
        assert_eq!(snap.centroid, 0.0);
    }

    #[test]
    fn flux_reacts_to_spectrum_change() {
        let mut analyzer = SpectralAnalyzer::new(48000, 2048);
        analyzer.analyze_block(&sine(500.0, 48000, 2048)).unwrap();
        let steady = analyzer.analyze_block(&sine(500.0, 48000, 2048)).unwrap();
        let changed = analyzer.analyze_block(&sine(4000.0, 48000, 2048)).unwrap();
        assert!(changed.flux > steady.flux);
    }

    #[test]
    fn average_scales_by_frame_count() {
        let mut analyzer = SpectralAnalyzer::new(48000, 2048);
        analyzer.analyze_block(&sine(1000.0, 48000, 2048)).unwrap();
        analyzer.analyze_block(&sine(1000.0, 48000, 2048)).unwrap();
        let avg = analyzer.average();
        assert_eq!(analyzer.frames(), 2);
        assert!(avg.is_finite());
    }
}
