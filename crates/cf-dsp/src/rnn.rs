//! RNN voice denoiser
//!
//! Wraps the `nnnoiseless` recurrent denoiser (an RNNoise port). The
//! model works on fixed 480-sample frames scaled to 16-bit range; this
//! wrapper handles the scaling, the final partial frame, an optional
//! second pass for badly contaminated sources, and the wet/dry mix.

use nnnoiseless::DenoiseState;

use crate::error::DspResult;
use crate::BlockProcessor;

const FRAME_SIZE: usize = DenoiseState::FRAME_SIZE;
const SCALE: f64 = 32767.0;

/// Recurrent voice denoiser with wet/dry mix
pub struct RnnDenoiser {
    mix: f64,
    dual_pass: bool,
}

impl RnnDenoiser {
    /// Create a denoiser; `mix` is the wet proportion in [0, 1]
    pub fn new(mix: f64, dual_pass: bool) -> Self {
        Self {
            mix: mix.clamp(0.0, 1.0),
            dual_pass,
        }
    }

    fn run_pass(samples: &mut [f64]) {
        let mut state = DenoiseState::new();
        let mut input = [0.0f32; FRAME_SIZE];
        let mut output = [0.0f32; FRAME_SIZE];

        let mut start = 0;
        while start < samples.len() {
            let take = FRAME_SIZE.min(samples.len() - start);
            for i in 0..take {
                input[i] = (samples[start + i] * SCALE) as f32;
            }
            for value in &mut input[take..] {
                *value = 0.0;
            }

            state.process_frame(&mut output, &input);

            for i in 0..take {
                samples[start + i] = output[i] as f64 / SCALE;
            }
            start += take;
        }
    }
}

impl BlockProcessor for RnnDenoiser {
    fn process(&mut self, samples: &mut [f64]) -> DspResult<()> {
        if self.mix <= 0.0 || samples.is_empty() {
            return Ok(());
        }

        let dry: Vec<f64> = samples.to_vec();
        Self::run_pass(samples);
        if self.dual_pass {
            Self::run_pass(samples);
        }

        if self.mix < 1.0 {
            for (wet, dry) in samples.iter_mut().zip(&dry) {
                *wet = self.mix * *wet + (1.0 - self.mix) * dry;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "denoise_rnn"
    }
}
