//! Feed-forward program compressor

use cf_core::units;

use crate::error::DspResult;
use crate::gate::EnvelopeFollower;
use crate::BlockProcessor;

/// Mono compressor with makeup gain and parallel mix
pub struct Compressor {
    threshold_db: f64,
    ratio: f64,
    makeup: f64,
    mix: f64,
    envelope: EnvelopeFollower,
}

impl Compressor {
    /// Create a compressor; threshold in dBFS, makeup in dB
    pub fn new(
        threshold_db: f64,
        ratio: f64,
        attack_ms: f64,
        release_ms: f64,
        makeup_db: f64,
        mix: f64,
        sample_rate: u32,
    ) -> Self {
        Self {
            threshold_db,
            ratio: ratio.max(1.0),
            makeup: units::db_to_linear(makeup_db),
            mix: mix.clamp(0.0, 1.0),
            envelope: EnvelopeFollower::new(attack_ms, release_ms, sample_rate),
        }
    }

    #[inline]
    fn gain_for(&self, envelope: f64) -> f64 {
        let envelope_db = units::linear_to_db(envelope.max(1e-9));
        if envelope_db <= self.threshold_db {
            return 1.0;
        }
        let reduction_db = (self.threshold_db - envelope_db) * (1.0 - 1.0 / self.ratio);
        units::db_to_linear(reduction_db)
    }
}

impl BlockProcessor for Compressor {
    fn process(&mut self, samples: &mut [f64]) -> DspResult<()> {
        for sample in samples {
            let dry = *sample;
            let envelope = self.envelope.process(dry);
            let wet = dry * self.gain_for(envelope) * self.makeup;
            *sample = self.mix * wet + (1.0 - self.mix) * dry;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.envelope.reset();
    }

    fn name(&self) -> &'static str {
        "compressor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms_db(samples: &[f64]) -> f64 {
        units::linear_to_db(
            (samples.iter().map(|s| s * s).sum::<f64>() / samples.len() as f64).sqrt(),
        )
    }

    fn tone(amplitude: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| (2.0 * std::f64::consts::PI * 440.0 * i as f64 / 48000.0).sin() * amplitude)
            .collect()
    }

    #[test]
    fn loud_material_is_reduced() {
        let mut loud = tone(0.9, 48000);
        let before = rms_db(&loud);

        let mut comp = Compressor::new(-20.0, 4.0, 10.0, 100.0, 0.0, 1.0, 48000);
        comp.process(&mut loud).unwrap();

        let after = rms_db(&loud[4800..]);
        assert!(after < before - 6.0, "{after} vs {before}");
    }

    #[test]
    fn quiet_material_below_threshold_is_untouched() {
        let mut quiet = tone(0.01, 48000);
        let reference = quiet.clone();

        let mut comp = Compressor::new(-20.0, 4.0, 10.0, 100.0, 0.0, 1.0, 48000);
        comp.process(&mut quiet).unwrap();

        let drift: f64 = quiet
            .iter()
            .zip(&reference)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(drift < 1e-9);
    }

    #[test]
    fn dry_mix_blends_toward_input() {
        let mut full_wet = tone(0.9, 48000);
        let mut half_wet = full_wet.clone();

        Compressor::new(-20.0, 4.0, 10.0, 100.0, 0.0, 1.0, 48000)
            .process(&mut full_wet)
            .unwrap();
        Compressor::new(-20.0, 4.0, 10.0, 100.0, 0.0, 0.5, 48000)
            .process(&mut half_wet)
            .unwrap();

        assert!(rms_db(&half_wet[4800..]) > rms_db(&full_wet[4800..]));
    }
}
