//! Pipeline configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use cf_adapt::{FilterChainConfig, HumFrequency};

/// Per-stage enable switches
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StageToggles {
    /// Mix multi-channel input down to mono
    pub downmix: bool,
    /// Resample at the decode boundary (needs `resample_rate`)
    pub resample: bool,
    /// Run region election and measurement synthesis in Pass 1
    pub analysis: bool,
    pub highpass: bool,
    pub hum: bool,
    pub fft_denoise: bool,
    pub rnn_denoise: bool,
    pub nlm_denoise: bool,
    pub gate: bool,
    pub deesser: bool,
    pub compressor: bool,
    pub dynanorm: bool,
    pub speechnorm: bool,
    pub bleed_gate: bool,
    pub limiter: bool,
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            downmix: true,
            resample: false,
            analysis: true,
            highpass: true,
            hum: true,
            fft_denoise: true,
            rnn_denoise: true,
            nlm_denoise: true,
            gate: true,
            deesser: true,
            compressor: true,
            dynanorm: true,
            speechnorm: true,
            bleed_gate: true,
            limiter: true,
        }
    }
}

/// Configuration for one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Target integrated loudness (LUFS)
    pub target_i: f64,
    /// Target true peak (dBTP)
    pub target_tp: f64,
    /// Target loudness range (LU)
    pub target_lra: f64,
    /// Measure mono sources as dual mono
    pub dual_mono: bool,
    /// Mains-hum fundamental selection
    pub hum_frequency: HumFrequency,
    /// Per-stage enables
    pub stages: StageToggles,
    /// Output WAV bit depth (16, 24 or 32-float)
    pub output_bit_depth: u16,
    /// Resample to this rate when the resample stage is on
    pub resample_rate: Option<u32>,
    /// Export the elected silence region as a WAV for inspection
    pub noise_sample_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_i: -16.0,
            target_tp: -1.5,
            target_lra: 11.0,
            dual_mono: false,
            hum_frequency: HumFrequency::default(),
            stages: StageToggles::default(),
            output_bit_depth: 16,
            resample_rate: None,
            noise_sample_path: None,
        }
    }
}

impl PipelineConfig {
    /// Seed the filter-chain configuration the adapter will populate
    ///
    /// Stage toggles gate the adapter's enables: a stage switched off
    /// here stays off no matter what the measurements suggest.
    pub fn seed_filter_config(&self) -> FilterChainConfig {
        FilterChainConfig {
            target_i: self.target_i,
            target_tp: self.target_tp,
            target_lra: self.target_lra,
            dual_mono: self.dual_mono,
            hum_frequency: self.hum_frequency,
            downmix_enabled: self.stages.downmix,
            resample_rate: if self.stages.resample {
                self.resample_rate
            } else {
                None
            },
            highpass_enabled: self.stages.highpass,
            fft_denoise_enabled: self.stages.fft_denoise,
            gate_enabled: self.stages.gate,
            deesser_enabled: self.stages.deesser,
            compressor_enabled: self.stages.compressor,
            dynanorm_enabled: self.stages.dynanorm,
            speechnorm_enabled: self.stages.speechnorm,
            limiter_enabled: self.stages.limiter,
            ..FilterChainConfig::default()
        }
    }

    /// Apply the hard stage switches after adaptation
    pub fn enforce_toggles(&self, config: &mut FilterChainConfig) {
        config.highpass_enabled &= self.stages.highpass;
        config.hum_enabled &= self.stages.hum;
        config.fft_denoise_enabled &= self.stages.fft_denoise;
        config.rnn_denoise_enabled &= self.stages.rnn_denoise;
        config.nlm_denoise_enabled &= self.stages.nlm_denoise;
        config.gate_enabled &= self.stages.gate;
        config.deesser_enabled &= self.stages.deesser;
        config.compressor_enabled &= self.stages.compressor;
        config.dynanorm_enabled &= self.stages.dynanorm;
        config.speechnorm_enabled &= self.stages.speechnorm;
        config.bleed_gate_enabled &= self.stages.bleed_gate;
        config.limiter_enabled &= self.stages.limiter;
    }
}
