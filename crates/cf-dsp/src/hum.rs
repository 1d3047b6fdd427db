//! Mains-hum removal: a notch bank over the fundamental and harmonics

use crate::biquad::Biquad;
use crate::error::DspResult;
use crate::BlockProcessor;

/// Notch bank at the mains fundamental plus harmonics
pub struct HumFilter {
    notches: Vec<Biquad>,
}

impl HumFilter {
    /// Create a bank at `fundamental` Hz with `harmonics` notches in
    /// total (fundamental included), each with the given Q
    ///
    /// Harmonics at or above the usable band are skipped.
    pub fn new(fundamental: f64, harmonics: u32, q: f64, sample_rate: u32) -> Self {
        let nyquist = sample_rate as f64 / 2.0;
        let notches = (1..=harmonics.max(1))
            .map(|n| fundamental * n as f64)
            .filter(|freq| *freq < nyquist * 0.9)
            .map(|freq| Biquad::notch(freq, q, sample_rate))
            .collect();

        Self { notches }
    }

    /// Number of active notches
    pub fn len(&self) -> usize {
        self.notches.len()
    }

    /// Whether every harmonic fell outside the usable band
    pub fn is_empty(&self) -> bool {
        self.notches.is_empty()
    }
}

impl BlockProcessor for HumFilter {
    fn process(&mut self, samples: &mut [f64]) -> DspResult<()> {
        for notch in &mut self.notches {
            notch.process(samples)?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        for notch in &mut self.notches {
            notch.reset();
        }
    }

    fn name(&self) -> &'static str {
        "humnotch"
    }
}
