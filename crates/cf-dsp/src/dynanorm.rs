//! Frame-windowed dynamic normaliser
//!
//! Measures per-frame peaks, derives a per-frame gain toward the peak
//! target bounded by the maximum gain, smooths the gain curve with a
//! Gaussian filter so level rides stay inaudible, and applies the
//! interpolated curve.

use crate::error::DspResult;
use crate::BlockProcessor;

/// Offline adaptive leveller
pub struct DynamicNormalizer {
    frame_len: usize,
    filter_size: usize,
    peak_target: f64,
    max_gain: f64,
}

impl DynamicNormalizer {
    /// Create a normaliser
    ///
    /// `frame_ms` is the analysis frame length, `filter_size` the
    /// Gaussian smoothing width in frames (forced odd).
    pub fn new(frame_ms: u32, filter_size: u32, peak_target: f64, max_gain: f64, sample_rate: u32) -> Self {
        let frame_len = ((sample_rate as u64 * frame_ms as u64) / 1000) as usize;
        Self {
            frame_len: frame_len.max(1),
            filter_size: (filter_size as usize) | 1,
            peak_target: peak_target.clamp(0.0, 1.0),
            max_gain: max_gain.max(1.0),
        }
    }

    fn frame_gains(&self, samples: &[f64]) -> Vec<f64> {
        samples
            .chunks(self.frame_len)
            .map(|frame| {
                let peak = frame.iter().map(|s| s.abs()).fold(0.0, f64::max);
                if peak > 1e-9 {
                    (self.peak_target / peak).min(self.max_gain)
                } else {
                    1.0
                }
            })
            .collect()
    }

    fn smooth(&self, gains: &[f64]) -> Vec<f64> {
        let half = self.filter_size / 2;
        let sigma = self.filter_size as f64 / 6.0;
        let kernel: Vec<f64> = (0..self.filter_size)
            .map(|i| {
                let x = i as f64 - half as f64;
                (-x * x / (2.0 * sigma * sigma)).exp()
            })
            .collect();
        let kernel_sum: f64 = kernel.iter().sum();

        (0..gains.len())
            .map(|i| {
                let mut acc = 0.0;
                for (k, weight) in kernel.iter().enumerate() {
                    let idx = (i + k).saturating_sub(half).min(gains.len() - 1);
                    acc += weight * gains[idx];
                }
                acc / kernel_sum
            })
            .collect()
    }
}

impl BlockProcessor for DynamicNormalizer {
    fn process(&mut self, samples: &mut [f64]) -> DspResult<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let gains = self.smooth(&self.frame_gains(samples));

        // Linear interpolation between frame-center gains
        let frame_len = self.frame_len as f64;
        for (i, sample) in samples.iter_mut().enumerate() {
            let position = i as f64 / frame_len - 0.5;
            let low = position.floor().max(0.0) as usize;
            let high = (low + 1).min(gains.len() - 1);
            let t = (position - position.floor()).clamp(0.0, 1.0);
            let gain = if position < 0.0 {
                gains[0]
            } else {
                gains[low.min(gains.len() - 1)] * (1.0 - t) + gains[high] * t
            };
            *sample *= gain;
        }
        Ok(())
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "dynanorm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(samples: &[f64]) -> f64 {
        samples.iter().map(|s| s.abs()).fold(0.0, f64::max)
    }

    fn tone(amplitude: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| (2.0 * std::f64::consts::PI * 440.0 * i as f64 / 48000.0).sin() * amplitude)
            .collect()
    }

    #[test]
    fn quiet_audio_is_lifted_toward_the_peak_target() {
        let mut samples = tone(0.1, 48000 * 20);
        let mut norm = DynamicNormalizer::new(500, 31, 0.95, 5.0, 48000);
        norm.process(&mut samples).unwrap();

        let lifted = peak(&samples[48000 * 9..48000 * 11]);
        assert!(lifted > 0.4, "peak after {}", lifted);
        assert!(lifted <= 0.96);
    }

    #[test]
    fn gain_is_bounded_by_max_gain() {
        let mut samples = tone(0.01, 48000 * 20);
        let mut norm = DynamicNormalizer::new(500, 31, 0.95, 5.0, 48000);
        norm.process(&mut samples).unwrap();

        // 0.01 amplitude with max gain 5: never above 0.05 (plus margin)
        assert!(peak(&samples) < 0.051);
    }

    #[test]
    fn loud_audio_is_not_boosted_past_the_target() {
        let mut samples = tone(0.98, 48000 * 4);
        let mut norm = DynamicNormalizer::new(500, 31, 0.95, 5.0, 48000);
        norm.process(&mut samples).unwrap();
        assert!(peak(&samples) <= 0.98 + 1e-9);
    }
}
