//! CastForge filter-chain adaptation
//!
//! Deterministically maps Pass-1 measurements into a fully populated
//! filter-chain configuration. Tuning is an ordered pipeline of rules
//! (highpass → hum → FFT denoise → RNN denoise → gate → de-esser →
//! compressor → dyna-norm → speech-norm → bleed gate → sanitisation);
//! downstream rules may read values written upstream, never the other
//! way around. Applying the pipeline twice over the same measurements
//! yields identical configurations.

mod config;
mod rules;

pub use config::{FilterChainConfig, HumFrequency};
pub use rules::{apply_rules, TuningRule, TUNING_RULES};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
