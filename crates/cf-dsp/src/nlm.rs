//! Non-local-means denoiser
//!
//! Time-domain patch-similarity smoothing: each sample is replaced by a
//! weighted average of candidates inside a research window, weighted by
//! how similar their surrounding patches are. Attached by the adapter
//! only when the speech normaliser applies heavy gain, so the strength
//! values are tiny.

use crate::error::DspResult;
use crate::BlockProcessor;

/// Research window half-width (samples)
const RESEARCH_RADIUS: usize = 64;
/// Patch half-width (samples)
const PATCH_RADIUS: usize = 16;

/// Patch-based denoiser
pub struct NlmDenoiser {
    strength: f64,
}

impl NlmDenoiser {
    /// Create a denoiser with the adapter's strength value
    pub fn new(strength: f64) -> Self {
        Self {
            strength: strength.max(0.0),
        }
    }

    fn patch_distance(samples: &[f64], a: usize, b: usize) -> f64 {
        let mut distance = 0.0;
        for offset in 0..=2 * PATCH_RADIUS {
            let d = samples[a - PATCH_RADIUS + offset] - samples[b - PATCH_RADIUS + offset];
            distance += d * d;
        }
        distance / (2 * PATCH_RADIUS + 1) as f64
    }
}

impl BlockProcessor for NlmDenoiser {
    fn process(&mut self, samples: &mut [f64]) -> DspResult<()> {
        let margin = RESEARCH_RADIUS + PATCH_RADIUS;
        if self.strength <= 0.0 || samples.len() < 2 * margin + 1 {
            return Ok(());
        }

        // Filter bandwidth from the strength parameter
        let h2 = self.strength.max(1e-9);
        let input = samples.to_vec();

        for center in margin..input.len() - margin {
            let mut weight_sum = 0.0;
            let mut value_sum = 0.0;

            for candidate in center - RESEARCH_RADIUS..=center + RESEARCH_RADIUS {
                let distance = Self::patch_distance(&input, center, candidate);
                let weight = (-distance / h2).exp();
                weight_sum += weight;
                value_sum += weight * input[candidate];
            }

            if weight_sum > 1e-12 {
                samples[center] = value_sum / weight_sum;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "denoise_nlm"
    }
}
