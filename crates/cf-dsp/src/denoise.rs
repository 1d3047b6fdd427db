//! Spectral-subtraction denoiser
//!
//! STFT with a learned noise magnitude profile. The profile is
//! estimated from the quietest analysis frames of the buffer itself, so
//! the filter adapts to whatever floor survived the upstream chain. The
//! reduction parameter bounds the attenuation any bin can receive.

use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use std::sync::Arc;

use crate::error::{DspError, DspResult};
use crate::BlockProcessor;

const FFT_SIZE: usize = 2048;
const HOP_SIZE: usize = FFT_SIZE / 4;
/// Share of the quietest frames used for the noise estimate
const NOISE_FRAME_FRACTION: f64 = 0.10;
/// Over-subtraction factor against musical noise
const OVER_SUBTRACTION: f64 = 1.5;

/// Offline spectral denoiser
pub struct SpectralDenoiser {
    reduction_db: f64,
    forward: Arc<dyn RealToComplex<f64>>,
    inverse: Arc<dyn ComplexToReal<f64>>,
    window: Vec<f64>,
}

impl SpectralDenoiser {
    /// Create a denoiser with the given maximum reduction in dB
    pub fn new(reduction_db: f64) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(FFT_SIZE);
        let inverse = planner.plan_fft_inverse(FFT_SIZE);

        let window: Vec<f64> = (0..FFT_SIZE)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * i as f64 / FFT_SIZE as f64;
                0.5 * (1.0 - phase.cos())
            })
            .collect();

        Self {
            reduction_db: reduction_db.max(0.0),
            forward,
            inverse,
            window,
        }
    }

    /// Estimate the noise magnitude spectrum from the quietest frames
    fn noise_profile(&self, samples: &[f64]) -> DspResult<Vec<f64>> {
        let bins = FFT_SIZE / 2 + 1;
        let mut frames: Vec<(f64, Vec<f64>)> = Vec::new();

        let mut scratch = vec![0.0; FFT_SIZE];
        let mut spectrum = vec![Complex::new(0.0, 0.0); bins];

        let mut start = 0;
        while start + FFT_SIZE <= samples.len() {
            for i in 0..FFT_SIZE {
                scratch[i] = samples[start + i] * self.window[i];
            }
            let energy: f64 = scratch.iter().map(|s| s * s).sum();
            self.forward
                .process(&mut scratch, &mut spectrum)
                .map_err(|e| fft_error(e))?;
            frames.push((energy, spectrum.iter().map(|c| c.norm()).collect()));
            start += HOP_SIZE * 4;
        }

        if frames.is_empty() {
            return Ok(vec![0.0; bins]);
        }

        frames.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        let keep = ((frames.len() as f64 * NOISE_FRAME_FRACTION).ceil() as usize)
            .max(1)
            .min(frames.len());

        let mut profile = vec![0.0; bins];
        for (_, magnitudes) in &frames[..keep] {
            for (bin, m) in magnitudes.iter().enumerate() {
                profile[bin] += m;
            }
        }
        for value in &mut profile {
            *value /= keep as f64;
        }
        Ok(profile)
    }
}

fn fft_error(e: impl std::fmt::Display) -> DspError {
    DspError::Fft {
        stage: "denoise_fft",
        reason: e.to_string(),
    }
}

impl BlockProcessor for SpectralDenoiser {
    fn process(&mut self, samples: &mut [f64]) -> DspResult<()> {
        if samples.len() < FFT_SIZE || self.reduction_db <= 0.0 {
            return Ok(());
        }

        let noise = self.noise_profile(samples)?;
        let floor_gain = cf_core::units::db_to_linear(-self.reduction_db);
        let bins = FFT_SIZE / 2 + 1;

        let mut output = vec![0.0; samples.len()];
        let mut weight = vec![0.0; samples.len()];
        let mut scratch = vec![0.0; FFT_SIZE];
        let mut spectrum = vec![Complex::new(0.0, 0.0); bins];
        let mut time = vec![0.0; FFT_SIZE];

        let mut start = 0;
        while start + FFT_SIZE <= samples.len() {
            for i in 0..FFT_SIZE {
                scratch[i] = samples[start + i] * self.window[i];
            }
            self.forward
                .process(&mut scratch, &mut spectrum)
                .map_err(|e| fft_error(e))?;

            for (bin, value) in spectrum.iter_mut().enumerate() {
                let magnitude = value.norm();
                if magnitude > 1e-12 {
                    let subtracted = OVER_SUBTRACTION * noise[bin];
                    let gain = ((magnitude - subtracted) / magnitude).max(floor_gain);
                    *value *= gain;
                }
            }

            self.inverse
                .process(&mut spectrum, &mut time)
                .map_err(|e| fft_error(e))?;
            for i in 0..FFT_SIZE {
                // realfft's inverse is unnormalised
                output[start + i] += time[i] / FFT_SIZE as f64 * self.window[i];
                weight[start + i] += self.window[i] * self.window[i];
            }

            start += HOP_SIZE;
        }

        for i in 0..samples.len() {
            if weight[i] > 1e-9 {
                samples[i] = output[i] / weight[i];
            }
        }
        Ok(())
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "denoise_fft"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms(samples: &[f64]) -> f64 {
        (samples.iter().map(|s| s * s).sum::<f64>() / samples.len() as f64).sqrt()
    }

    fn noise(len: usize, amplitude: f64) -> Vec<f64> {
        (0..len)
            .map(|i| (((i as f64 * 12.9898).sin() * 43758.5453).fract().abs() - 0.5) * amplitude)
            .collect()
    }

    #[test]
    fn steady_noise_is_attenuated() {
        let mut samples = noise(48000 * 4, 0.02);
        let before = rms(&samples);

        let mut denoiser = SpectralDenoiser::new(20.0);
        denoiser.process(&mut samples).unwrap();

        let after = rms(&samples[FFT_SIZE..samples.len() - FFT_SIZE]);
        assert!(
            after < before * 0.5,
            "noise rms {} should fall well below {}",
            after,
            before
        );
        assert!(samples.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn tone_over_noise_survives() {
        // First half noise only (what the profile learns from), second
        // half voice-like tone over the same noise
        let rate = 48000u32;
        let half = rate as usize * 2;
        let mut samples: Vec<f64> = noise(half * 2, 0.005);
        for i in half..half * 2 {
            samples[i] +=
                (2.0 * std::f64::consts::PI * 440.0 * i as f64 / rate as f64).sin() * 0.3;
        }
        let tone_before = rms(&samples[half + FFT_SIZE..half * 2 - FFT_SIZE]);

        let mut denoiser = SpectralDenoiser::new(20.0);
        denoiser.process(&mut samples).unwrap();

        // The dominant tone keeps most of its energy
        let tone_after = rms(&samples[half + FFT_SIZE..half * 2 - FFT_SIZE]);
        assert!(
            tone_after > tone_before * 0.6,
            "tone rms {} vs {}",
            tone_after,
            tone_before
        );
    }

    #[test]
    fn short_buffers_pass_through() {
        let mut samples = noise(512, 0.1);
        let copy = samples.clone();
        SpectralDenoiser::new(12.0).process(&mut samples).unwrap();
        assert_eq!(samples, copy);
    }
}
