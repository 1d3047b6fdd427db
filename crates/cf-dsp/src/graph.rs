//! The filter graph
//!
//! Builds the processing chain from an adapted configuration and runs a
//! buffer through it. Chain order is fixed and mirrors the order the
//! adapter tunes in; disabled filters are simply absent.

use cf_adapt::FilterChainConfig;
use cf_core::AudioBuffer;

use crate::biquad::Biquad;
use crate::compressor::Compressor;
use crate::deesser::DeEsser;
use crate::denoise::SpectralDenoiser;
use crate::dynanorm::DynamicNormalizer;
use crate::gate::Gate;
use crate::hum::HumFilter;
use crate::limiter::Limiter;
use crate::nlm::NlmDenoiser;
use crate::error::DspResult;
use crate::rnn::RnnDenoiser;
use crate::speechnorm::SpeechNormalizer;
use crate::BlockProcessor;

/// An ordered chain of block processors
pub struct FilterGraph {
    processors: Vec<Box<dyn BlockProcessor>>,
}

impl std::fmt::Debug for FilterGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterGraph")
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl FilterGraph {
    /// Build the chain from an adapted configuration
    pub fn from_config(config: &FilterChainConfig, sample_rate: u32) -> Self {
        let mut processors: Vec<Box<dyn BlockProcessor>> = Vec::new();

        if config.highpass_enabled {
            processors.push(Box::new(Biquad::highpass(
                config.highpass_hz,
                config.highpass_q,
                sample_rate,
            )));
        }
        if config.hum_enabled {
            processors.push(Box::new(HumFilter::new(
                config.hum_frequency.hz(),
                config.hum_harmonics,
                config.hum_q,
                sample_rate,
            )));
        }
        if config.fft_denoise_enabled {
            processors.push(Box::new(SpectralDenoiser::new(config.fft_denoise_db)));
        }
        if config.rnn_denoise_enabled {
            processors.push(Box::new(RnnDenoiser::new(
                config.rnn_denoise_mix,
                config.rnn_denoise_dual_pass,
            )));
        }
        if config.gate_enabled {
            processors.push(Box::new(Gate::new(
                config.gate_threshold,
                config.gate_ratio,
                config.gate_range,
                config.gate_attack_ms,
                config.gate_release_ms,
                sample_rate,
            )));
        }
        if config.deesser_enabled {
            processors.push(Box::new(DeEsser::new(
                config.deesser_intensity,
                config.deesser_split_hz,
                sample_rate,
            )));
        }
        if config.compressor_enabled {
            processors.push(Box::new(Compressor::new(
                config.compressor_threshold_db,
                config.compressor_ratio,
                config.compressor_attack_ms,
                config.compressor_release_ms,
                config.compressor_makeup_db,
                config.compressor_mix,
                sample_rate,
            )));
        }
        if config.dynanorm_enabled {
            processors.push(Box::new(DynamicNormalizer::new(
                config.dynanorm_frame_ms,
                config.dynanorm_filter_size,
                config.dynanorm_peak,
                config.dynanorm_max_gain,
                sample_rate,
            )));
        }
        if config.speechnorm_enabled {
            processors.push(Box::new(SpeechNormalizer::new(
                config.speechnorm_expansion,
                config.speechnorm_peak,
            )));
        }
        if config.nlm_denoise_enabled {
            processors.push(Box::new(NlmDenoiser::new(config.nlm_denoise_strength)));
        }
        if config.bleed_gate_enabled {
            processors.push(Box::new(Gate::bleed(
                config.bleed_gate_threshold,
                config.bleed_gate_ratio,
                config.bleed_gate_range,
                config.bleed_gate_attack_ms,
                config.bleed_gate_release_ms,
                sample_rate,
            )));
        }
        if config.limiter_enabled {
            processors.push(Box::new(Limiter::new(
                config.limiter_ceiling_db,
                sample_rate,
            )));
        }

        log::debug!(
            "built filter graph with {} stages: {:?}",
            processors.len(),
            processors.iter().map(|p| p.name()).collect::<Vec<_>>()
        );

        Self { processors }
    }

    /// Run a mono buffer through every stage in order
    pub fn process(&mut self, buffer: &mut AudioBuffer) -> DspResult<()> {
        debug_assert_eq!(buffer.channels, 1, "the graph processes mono audio");
        for processor in &mut self.processors {
            processor.process(&mut buffer.samples)?;
        }
        Ok(())
    }

    /// Reset every stage
    pub fn reset(&mut self) {
        for processor in &mut self.processors {
            processor.reset();
        }
    }

    /// Names of the active stages, in order
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    /// Number of active stages
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Whether every filter was disabled
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_matches_the_chain_layout() {
        let config = FilterChainConfig {
            hum_enabled: true,
            rnn_denoise_enabled: true,
            nlm_denoise_enabled: true,
            bleed_gate_enabled: true,
            ..FilterChainConfig::default()
        };
        let graph = FilterGraph::from_config(&config, 48000);

        assert_eq!(
            graph.stage_names(),
            vec![
                "highpass",
                "humnotch",
                "denoise_fft",
                "denoise_rnn",
                "gate",
                "deesser",
                "compressor",
                "dynanorm",
                "speechnorm",
                "denoise_nlm",
                "bleedgate",
                "limiter",
            ]
        );
    }

    #[test]
    fn disabled_filters_are_absent() {
        let config = FilterChainConfig {
            highpass_enabled: false,
            fft_denoise_enabled: false,
            gate_enabled: false,
            deesser_enabled: false,
            compressor_enabled: false,
            dynanorm_enabled: false,
            speechnorm_enabled: false,
            limiter_enabled: false,
            ..FilterChainConfig::default()
        };
        let graph = FilterGraph::from_config(&config, 48000);
        assert!(graph.is_empty());
    }

    #[test]
    fn processes_a_buffer_end_to_end() {
        let config = FilterChainConfig::default();
        let mut graph = FilterGraph::from_config(&config, 48000);

        let samples: Vec<f64> = (0..48000 * 2)
            .map(|i| {
                (2.0 * std::f64::consts::PI * 300.0 * i as f64 / 48000.0).sin() * 0.3
                    + (((i as f64 * 12.9898).sin() * 43758.5453).fract().abs() - 0.5) * 0.002
            })
            .collect();
        let mut buffer = AudioBuffer::from_mono(samples, 48000);

        graph.process(&mut buffer).unwrap();

        assert!(buffer.samples.iter().all(|s| s.is_finite()));
        // The limiter ceiling bounds the output
        assert!(buffer.peak() <= cf_core::units::db_to_linear(-1.0) + 1e-6);
    }
}
