//! Sibilance de-esser
//!
//! Splits the signal at the sibilance band, follows the band envelope
//! against its own long-term average, and ducks only the band when a
//! sibilant burst stands out. Intensity scales how hard the duck is.

use crate::biquad::Biquad;
use crate::error::DspResult;
use crate::gate::EnvelopeFollower;
use crate::BlockProcessor;

/// Band envelope must exceed this multiple of its average to duck
const BURST_RATIO: f64 = 2.0;
/// Long-term average time constant (ms)
const AVERAGE_MS: f64 = 400.0;

/// Split-band de-esser
pub struct DeEsser {
    intensity: f64,
    split: Biquad,
    envelope: EnvelopeFollower,
    average: EnvelopeFollower,
}

impl DeEsser {
    /// Create a de-esser with intensity in [0, 1] splitting at `split_hz`
    pub fn new(intensity: f64, split_hz: f64, sample_rate: u32) -> Self {
        Self {
            intensity: intensity.clamp(0.0, 1.0),
            split: Biquad::highpass(split_hz, 0.707, sample_rate),
            envelope: EnvelopeFollower::new(0.5, 40.0, sample_rate),
            average: EnvelopeFollower::new(AVERAGE_MS, AVERAGE_MS, sample_rate),
        }
    }
}

impl BlockProcessor for DeEsser {
    fn process(&mut self, samples: &mut [f64]) -> DspResult<()> {
        for sample in samples {
            let band = self.split.process_sample(*sample);
            let low = *sample - band;

            let envelope = self.envelope.process(band);
            let average = self.average.process(band);

            let mut gain = 1.0;
            let knee = BURST_RATIO * average.max(1e-9);
            if envelope > knee {
                // Duck the overshoot, scaled by intensity
                let overshoot = 1.0 - knee / envelope;
                gain = 1.0 - self.intensity * overshoot;
            }

            *sample = low + band * gain;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.split.reset();
        self.envelope.reset();
        self.average.reset();
    }

    fn name(&self) -> &'static str {
        "deesser"
    }
}
