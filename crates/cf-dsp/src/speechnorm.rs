//! Per-cycle speech normaliser
//!
//! Expands each half-cycle (between zero crossings) toward the peak
//! target, with the expansion factor bounding how much gain a quiet
//! cycle can receive. Gain changes are slewed between cycles to avoid
//! steps at the crossings.

use crate::error::DspResult;
use crate::BlockProcessor;

/// Per-sample slew limit on the cycle gain
const GAIN_SLEW: f64 = 0.001;

/// Half-cycle expander
pub struct SpeechNormalizer {
    expansion: f64,
    peak_target: f64,
}

impl SpeechNormalizer {
    /// Create a normaliser; `expansion` is clamped to [1, 10]
    pub fn new(expansion: f64, peak_target: f64) -> Self {
        Self {
            expansion: expansion.clamp(1.0, 10.0),
            peak_target: peak_target.clamp(0.0, 1.0),
        }
    }

    fn cycle_gain(&self, cycle_peak: f64) -> f64 {
        if cycle_peak <= 1e-9 {
            return 1.0;
        }
        (self.peak_target / cycle_peak).clamp(1.0, self.expansion)
    }
}

impl BlockProcessor for SpeechNormalizer {
    fn process(&mut self, samples: &mut [f64]) -> DspResult<()> {
        if samples.is_empty() {
            return Ok(());
        }

        // Split into half-cycles at sign changes
        let mut cycle_start = 0;
        let mut gain = 1.0;
        let mut index = 0;

        while index < samples.len() {
            let mut end = index + 1;
            while end < samples.len()
                && (samples[end] >= 0.0) == (samples[cycle_start] >= 0.0)
            {
                end += 1;
            }

            let cycle_peak = samples[cycle_start..end]
                .iter()
                .map(|s| s.abs())
                .fold(0.0, f64::max);
            let target_gain = self.cycle_gain(cycle_peak);

            for sample in &mut samples[cycle_start..end] {
                // Slew toward the cycle's target gain
                if gain < target_gain {
                    gain = (gain + GAIN_SLEW * self.expansion).min(target_gain);
                } else {
                    gain = (gain - GAIN_SLEW * self.expansion).max(target_gain);
                }
                *sample *= gain;
            }

            cycle_start = end;
            index = end;
        }
        Ok(())
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "speechnorm"
    }
}
