//! CastForge adaptive filter graph
//!
//! Offline implementations of the filters the adapter tunes, chained in
//! the fixed order the configuration prescribes:
//! highpass → hum notch → FFT denoise → RNN denoise → gate → de-esser →
//! compressor → dyna-norm → speech-norm → NLM denoise → bleed gate →
//! limiter.
//!
//! Every filter is a [`BlockProcessor`] over a whole mono buffer; the
//! graph owns the chain and runs it sequentially. Construction is
//! driven entirely by the [`FilterChainConfig`](cf_adapt::FilterChainConfig)
//! the adapter populated.

mod biquad;
mod compressor;
mod deesser;
mod denoise;
mod dynanorm;
mod error;
mod gate;
mod graph;
mod hum;
mod limiter;
mod nlm;
mod rnn;
mod speechnorm;

pub use biquad::Biquad;
pub use compressor::Compressor;
pub use deesser::DeEsser;
pub use denoise::SpectralDenoiser;
pub use dynanorm::DynamicNormalizer;
pub use error::{DspError, DspResult};
pub use gate::Gate;
pub use graph::FilterGraph;
pub use hum::HumFilter;
pub use limiter::Limiter;
pub use nlm::NlmDenoiser;
pub use rnn::RnnDenoiser;
pub use speechnorm::SpeechNormalizer;

/// An offline filter over a whole mono buffer
pub trait BlockProcessor: Send {
    /// Process the buffer in place
    fn process(&mut self, samples: &mut [f64]) -> DspResult<()>;

    /// Reset internal state
    fn reset(&mut self);

    /// Filter name for logs
    fn name(&self) -> &'static str;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
