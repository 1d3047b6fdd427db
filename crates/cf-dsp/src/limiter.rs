//! Lookahead peak limiter
//!
//! Scans ahead of the write position for the worst inter-sample peak
//! estimate inside the lookahead window, pulls the gain down before it
//! arrives and releases smoothly afterwards. Inter-sample peaks are
//! estimated on a 4x linearly interpolated grid.

use cf_core::units;

use crate::error::DspResult;
use crate::BlockProcessor;

/// Lookahead window (ms)
const LOOKAHEAD_MS: f64 = 5.0;
/// Release time constant (ms)
const RELEASE_MS: f64 = 80.0;
/// Interpolation factor for the inter-sample peak estimate
const OVERSAMPLE: usize = 4;

/// Offline lookahead limiter
pub struct Limiter {
    ceiling: f64,
    lookahead: usize,
    release_coeff: f64,
}

impl Limiter {
    /// Create a limiter with a ceiling in dBFS
    pub fn new(ceiling_db: f64, sample_rate: u32) -> Self {
        let rate = sample_rate as f64;
        Self {
            ceiling: units::db_to_linear(ceiling_db),
            lookahead: ((LOOKAHEAD_MS / 1000.0) * rate) as usize,
            release_coeff: (-1.0 / (RELEASE_MS / 1000.0 * rate)).exp(),
        }
    }

    /// Worst interpolated peak around a sample pair
    #[inline]
    fn local_peak(a: f64, b: f64) -> f64 {
        let mut peak = a.abs().max(b.abs());
        for step in 1..OVERSAMPLE {
            let t = step as f64 / OVERSAMPLE as f64;
            peak = peak.max((a + (b - a) * t).abs());
        }
        peak
    }
}

impl BlockProcessor for Limiter {
    fn process(&mut self, samples: &mut [f64]) -> DspResult<()> {
        if samples.is_empty() {
            return Ok(());
        }

        // Per-sample required gain from the lookahead window
        let mut gain = 1.0f64;
        let n = samples.len();
        let original: Vec<f64> = samples.to_vec();

        for i in 0..n {
            // Worst peak in [i, i + lookahead]
            let mut window_peak = 0.0f64;
            let end = (i + self.lookahead).min(n - 1);
            for j in i..end {
                window_peak = window_peak.max(Self::local_peak(original[j], original[j + 1]));
            }
            window_peak = window_peak.max(original[end].abs());

            let needed = if window_peak > self.ceiling {
                self.ceiling / window_peak
            } else {
                1.0
            };

            if needed < gain {
                // Attack: drop immediately so the peak never lands
                gain = needed;
            } else {
                // Release toward unity (or the still-needed gain)
                gain = needed.min(1.0 + (gain - 1.0) * self.release_coeff);
                gain = gain.min(1.0);
            }

            samples[i] = original[i] * gain;
        }
        Ok(())
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "limiter"
    }
}
