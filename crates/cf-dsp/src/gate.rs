//! Downward expander gate
//!
//! Serves both the noise gate and the bleed gate; the two differ only
//! in the parameters the adapter writes.

use crate::error::DspResult;
use crate::BlockProcessor;

/// Envelope follower with separate attack and release times
#[derive(Debug, Clone)]
pub(crate) struct EnvelopeFollower {
    attack_coeff: f64,
    release_coeff: f64,
    envelope: f64,
}

impl EnvelopeFollower {
    pub(crate) fn new(attack_ms: f64, release_ms: f64, sample_rate: u32) -> Self {
        let rate = sample_rate as f64;
        Self {
            attack_coeff: (-1.0 / (attack_ms.max(0.01) * 0.001 * rate)).exp(),
            release_coeff: (-1.0 / (release_ms.max(1.0) * 0.001 * rate)).exp(),
            envelope: 0.0,
        }
    }

    #[inline]
    pub(crate) fn process(&mut self, input: f64) -> f64 {
        let abs_input = input.abs();
        let coeff = if abs_input > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = abs_input + coeff * (self.envelope - abs_input);
        self.envelope
    }

    pub(crate) fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

/// Downward expander: attenuates material under the threshold
pub struct Gate {
    threshold: f64,
    ratio: f64,
    range: f64,
    envelope: EnvelopeFollower,
    name: &'static str,
}

impl Gate {
    /// Create a gate
    ///
    /// `threshold` and `range` are linear amplitudes; `range` is the
    /// residual gain applied when fully closed.
    pub fn new(
        threshold: f64,
        ratio: f64,
        range: f64,
        attack_ms: f64,
        release_ms: f64,
        sample_rate: u32,
    ) -> Self {
        Self {
            threshold: threshold.max(1e-9),
            ratio: ratio.max(1.0),
            range: range.clamp(0.0, 1.0),
            envelope: EnvelopeFollower::new(attack_ms, release_ms, sample_rate),
            name: "gate",
        }
    }

    /// Same gate, named as the bleed gate for logging
    pub fn bleed(
        threshold: f64,
        ratio: f64,
        range: f64,
        attack_ms: f64,
        release_ms: f64,
        sample_rate: u32,
    ) -> Self {
        Self {
            name: "bleedgate",
            ..Self::new(threshold, ratio, range, attack_ms, release_ms, sample_rate)
        }
    }

    #[inline]
    fn gain_for(&self, envelope: f64) -> f64 {
        if envelope >= self.threshold {
            return 1.0;
        }
        // Downward expansion: (env/threshold)^(ratio-1), floored at range
        let under = envelope / self.threshold;
        under.powf(self.ratio - 1.0).max(self.range)
    }
}

impl BlockProcessor for Gate {
    fn process(&mut self, samples: &mut [f64]) -> DspResult<()> {
        for sample in samples {
            let envelope = self.envelope.process(*sample);
            *sample *= self.gain_for(envelope);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.envelope.reset();
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_core::units::db_to_linear;

    fn rms(samples: &[f64]) -> f64 {
        (samples.iter().map(|s| s * s).sum::<f64>() / samples.len() as f64).sqrt()
    }

    fn tone(amplitude: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| (2.0 * std::f64::consts::PI * 440.0 * i as f64 / 48000.0).sin() * amplitude)
            .collect()
    }

    #[test]
    fn quiet_material_is_attenuated() {
        let mut quiet = tone(db_to_linear(-60.0), 48000);
        let before = rms(&quiet);

        let mut gate = Gate::new(db_to_linear(-45.0), 2.0, 0.063, 10.0, 250.0, 48000);
        gate.process(&mut quiet).unwrap();

        assert!(rms(&quiet[4800..]) < before * 0.5);
    }

    #[test]
    fn loud_material_passes_unchanged() {
        let mut loud = tone(db_to_linear(-12.0), 48000);
        let reference = loud.clone();

        let mut gate = Gate::new(db_to_linear(-45.0), 2.0, 0.063, 10.0, 250.0, 48000);
        gate.process(&mut loud).unwrap();

        // Past the attack transient the gate is fully open
        let drift: f64 = loud[4800..]
            .iter()
            .zip(&reference[4800..])
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(drift < 1e-3, "gate altered loud material by {drift}");
    }

    #[test]
    fn closed_gain_respects_the_range_floor() {
        let mut gate = Gate::new(db_to_linear(-40.0), 6.0, 0.063, 10.0, 200.0, 48000);
        assert_eq!(gate.gain_for(0.0), 0.063);
        assert_eq!(gate.gain_for(1.0), 1.0);
        let mut silence = vec![0.0; 1024];
        gate.process(&mut silence).unwrap();
        assert!(silence.iter().all(|s| *s == 0.0));
    }
}
