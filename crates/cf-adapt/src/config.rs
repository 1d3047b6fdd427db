//! Filter-chain configuration
//!
//! The one mutable record shared across passes: loudness targets,
//! per-filter enables and per-filter parameters. Starts from defaults,
//! is populated in place by the adapter after Pass 1, and is read-only
//! for every later pass.

use cf_core::units;
use serde::{Deserialize, Serialize};

/// Mains hum fundamental
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HumFrequency {
    /// 50 Hz mains (Europe and most of the world)
    Hz50,
    /// 60 Hz mains (Americas)
    Hz60,
}

impl HumFrequency {
    /// Fundamental in Hz
    pub fn hz(&self) -> f64 {
        match self {
            HumFrequency::Hz50 => 50.0,
            HumFrequency::Hz60 => 60.0,
        }
    }
}

impl Default for HumFrequency {
    fn default() -> Self {
        Self::Hz50
    }
}

/// Targets, enables and parameters for the adaptive filter chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterChainConfig {
    /// Target integrated loudness (LUFS)
    pub target_i: f64,
    /// Target true peak (dBTP)
    pub target_tp: f64,
    /// Target loudness range (LU)
    pub target_lra: f64,
    /// Measure mono sources as dual mono
    pub dual_mono: bool,

    /// Mix multi-channel input down to mono before processing
    pub downmix_enabled: bool,
    /// Resample the output to this rate, when set
    pub resample_rate: Option<u32>,

    /// High-pass rumble filter
    pub highpass_enabled: bool,
    /// High-pass cutoff (Hz)
    pub highpass_hz: f64,
    /// High-pass resonance
    pub highpass_q: f64,

    /// Mains-hum notch bank
    pub hum_enabled: bool,
    /// Hum fundamental selection
    pub hum_frequency: HumFrequency,
    /// Notch count, fundamental included; clamped to [1, 8]
    pub hum_harmonics: u32,
    /// Notch Q factor
    pub hum_q: f64,

    /// Spectral-subtraction denoiser
    pub fft_denoise_enabled: bool,
    /// Noise reduction strength (dB)
    pub fft_denoise_db: f64,

    /// RNN voice denoiser
    pub rnn_denoise_enabled: bool,
    /// Run the RNN denoiser twice for badly contaminated sources
    pub rnn_denoise_dual_pass: bool,
    /// Wet/dry mix in [0, 1]
    pub rnn_denoise_mix: f64,

    /// Non-local-means denoiser (attached by heavy speech-norm gain)
    pub nlm_denoise_enabled: bool,
    /// Patch-similarity strength
    pub nlm_denoise_strength: f64,

    /// Noise gate
    pub gate_enabled: bool,
    /// Gate threshold as a linear amplitude, always positive
    pub gate_threshold: f64,
    /// Downward expansion ratio
    pub gate_ratio: f64,
    /// Residual level when closed (linear)
    pub gate_range: f64,
    /// Gate attack (ms)
    pub gate_attack_ms: f64,
    /// Gate release (ms)
    pub gate_release_ms: f64,

    /// Sibilance de-esser
    pub deesser_enabled: bool,
    /// De-esser intensity in [0, 1]
    pub deesser_intensity: f64,
    /// Sibilance band split frequency (Hz)
    pub deesser_split_hz: f64,

    /// Program compressor
    pub compressor_enabled: bool,
    /// Compression ratio
    pub compressor_ratio: f64,
    /// Compressor threshold (dBFS)
    pub compressor_threshold_db: f64,
    /// Compressor attack (ms)
    pub compressor_attack_ms: f64,
    /// Compressor release (ms)
    pub compressor_release_ms: f64,
    /// Makeup gain (dB)
    pub compressor_makeup_db: f64,
    /// Wet/dry mix in [0, 1]
    pub compressor_mix: f64,

    /// Frame-windowed dynamic normaliser
    pub dynanorm_enabled: bool,
    /// Analysis frame length (ms)
    pub dynanorm_frame_ms: u32,
    /// Gaussian smoothing filter size (frames, odd)
    pub dynanorm_filter_size: u32,
    /// Peak target (linear)
    pub dynanorm_peak: f64,
    /// Maximum gain factor
    pub dynanorm_max_gain: f64,
    /// Compression factor (0 disables)
    pub dynanorm_compress: f64,
    /// Per-frame DC correction
    pub dynanorm_dc_correct: bool,

    /// Per-cycle speech normaliser
    pub speechnorm_enabled: bool,
    /// Expansion factor, clamped to [1, 10]
    pub speechnorm_expansion: f64,
    /// Peak target (linear)
    pub speechnorm_peak: f64,
    /// Target RMS (linear) derived from the loudness target
    pub speechnorm_target_rms: f64,

    /// Bleed gate against amplified crosstalk
    pub bleed_gate_enabled: bool,
    /// Bleed gate threshold (linear), always positive
    pub bleed_gate_threshold: f64,
    /// Bleed gate ratio
    pub bleed_gate_ratio: f64,
    /// Residual level when closed (linear)
    pub bleed_gate_range: f64,
    /// Bleed gate attack (ms)
    pub bleed_gate_attack_ms: f64,
    /// Bleed gate release (ms)
    pub bleed_gate_release_ms: f64,

    /// Safety limiter at the end of the chain
    pub limiter_enabled: bool,
    /// Limiter ceiling (dBFS)
    pub limiter_ceiling_db: f64,
}

impl Default for FilterChainConfig {
    fn default() -> Self {
        Self {
            target_i: -16.0,
            target_tp: -1.5,
            target_lra: 11.0,
            dual_mono: false,

            downmix_enabled: true,
            resample_rate: None,

            highpass_enabled: true,
            highpass_hz: 80.0,
            highpass_q: 0.707,

            hum_enabled: false,
            hum_frequency: HumFrequency::Hz50,
            hum_harmonics: 4,
            hum_q: 30.0,

            fft_denoise_enabled: true,
            fft_denoise_db: 12.0,

            rnn_denoise_enabled: false,
            rnn_denoise_dual_pass: false,
            rnn_denoise_mix: 0.85,

            nlm_denoise_enabled: false,
            nlm_denoise_strength: 0.00001,

            gate_enabled: true,
            gate_threshold: units::db_to_linear(-45.0),
            gate_ratio: 2.0,
            gate_range: 0.125,
            gate_attack_ms: 10.0,
            gate_release_ms: 250.0,

            deesser_enabled: true,
            deesser_intensity: 0.5,
            deesser_split_hz: 5000.0,

            compressor_enabled: true,
            compressor_ratio: 3.0,
            compressor_threshold_db: -18.0,
            compressor_attack_ms: 20.0,
            compressor_release_ms: 250.0,
            compressor_makeup_db: 2.0,
            compressor_mix: 0.8,

            dynanorm_enabled: true,
            dynanorm_frame_ms: 500,
            dynanorm_filter_size: 31,
            dynanorm_peak: 0.95,
            dynanorm_max_gain: 5.0,
            dynanorm_compress: 0.0,
            dynanorm_dc_correct: false,

            speechnorm_enabled: true,
            speechnorm_expansion: 1.0,
            speechnorm_peak: 0.95,
            speechnorm_target_rms: 0.0,

            bleed_gate_enabled: false,
            bleed_gate_threshold: units::db_to_linear(-35.0),
            bleed_gate_ratio: 4.0,
            bleed_gate_range: 0.125,
            bleed_gate_attack_ms: 15.0,
            bleed_gate_release_ms: 250.0,

            limiter_enabled: true,
            limiter_ceiling_db: -1.0,
        }
    }
}

impl FilterChainConfig {
    /// Replace every non-finite numeric field with its declared default
    /// and enforce the structural clamps
    pub fn sanitize(&mut self) {
        let defaults = FilterChainConfig::default();

        fn fix(value: &mut f64, default: f64) {
            if !value.is_finite() {
                *value = default;
            }
        }

        fix(&mut self.target_i, defaults.target_i);
        fix(&mut self.target_tp, defaults.target_tp);
        fix(&mut self.target_lra, defaults.target_lra);
        fix(&mut self.highpass_hz, defaults.highpass_hz);
        fix(&mut self.highpass_q, defaults.highpass_q);
        fix(&mut self.hum_q, defaults.hum_q);
        fix(&mut self.fft_denoise_db, defaults.fft_denoise_db);
        fix(&mut self.rnn_denoise_mix, defaults.rnn_denoise_mix);
        fix(&mut self.nlm_denoise_strength, defaults.nlm_denoise_strength);
        fix(&mut self.gate_threshold, defaults.gate_threshold);
        fix(&mut self.gate_ratio, defaults.gate_ratio);
        fix(&mut self.gate_range, defaults.gate_range);
        fix(&mut self.gate_attack_ms, defaults.gate_attack_ms);
        fix(&mut self.gate_release_ms, defaults.gate_release_ms);
        fix(&mut self.deesser_intensity, defaults.deesser_intensity);
        fix(&mut self.deesser_split_hz, defaults.deesser_split_hz);
        fix(&mut self.compressor_ratio, defaults.compressor_ratio);
        fix(
            &mut self.compressor_threshold_db,
            defaults.compressor_threshold_db,
        );
        fix(&mut self.compressor_attack_ms, defaults.compressor_attack_ms);
        fix(
            &mut self.compressor_release_ms,
            defaults.compressor_release_ms,
        );
        fix(&mut self.compressor_makeup_db, defaults.compressor_makeup_db);
        fix(&mut self.compressor_mix, defaults.compressor_mix);
        fix(&mut self.dynanorm_peak, defaults.dynanorm_peak);
        fix(&mut self.dynanorm_max_gain, defaults.dynanorm_max_gain);
        fix(&mut self.dynanorm_compress, defaults.dynanorm_compress);
        fix(&mut self.speechnorm_expansion, defaults.speechnorm_expansion);
        fix(&mut self.speechnorm_peak, defaults.speechnorm_peak);
        fix(
            &mut self.speechnorm_target_rms,
            defaults.speechnorm_target_rms,
        );
        fix(
            &mut self.bleed_gate_threshold,
            defaults.bleed_gate_threshold,
        );
        fix(&mut self.bleed_gate_ratio, defaults.bleed_gate_ratio);
        fix(&mut self.bleed_gate_range, defaults.bleed_gate_range);
        fix(&mut self.bleed_gate_attack_ms, defaults.bleed_gate_attack_ms);
        fix(
            &mut self.bleed_gate_release_ms,
            defaults.bleed_gate_release_ms,
        );
        fix(&mut self.limiter_ceiling_db, defaults.limiter_ceiling_db);

        self.hum_harmonics = self.hum_harmonics.clamp(1, 8);
        if self.gate_threshold <= 0.0 {
            self.gate_threshold = defaults.gate_threshold;
        }
        if self.bleed_gate_threshold <= 0.0 {
            self.bleed_gate_threshold = defaults.bleed_gate_threshold;
        }
    }

    /// True when every numeric field is finite
    pub fn is_finite(&self) -> bool {
        [
            self.target_i,
            self.target_tp,
            self.target_lra,
            self.highpass_hz,
            self.highpass_q,
            self.hum_q,
            self.fft_denoise_db,
            self.rnn_denoise_mix,
            self.nlm_denoise_strength,
            self.gate_threshold,
            self.gate_ratio,
            self.gate_range,
            self.gate_attack_ms,
            self.gate_release_ms,
            self.deesser_intensity,
            self.deesser_split_hz,
            self.compressor_ratio,
            self.compressor_threshold_db,
            self.compressor_attack_ms,
            self.compressor_release_ms,
            self.compressor_makeup_db,
            self.compressor_mix,
            self.dynanorm_peak,
            self.dynanorm_max_gain,
            self.dynanorm_compress,
            self.speechnorm_expansion,
            self.speechnorm_peak,
            self.speechnorm_target_rms,
            self.bleed_gate_threshold,
            self.bleed_gate_ratio,
            self.bleed_gate_range,
            self.bleed_gate_attack_ms,
            self.bleed_gate_release_ms,
            self.limiter_ceiling_db,
        ]
        .iter()
        .all(|v| v.is_finite())
    }

    /// Render the declarative filter-chain specification string
    ///
    /// Comma-separated filter descriptors with `key=value` arguments,
    /// in chain order, enabled filters only.
    pub fn render_spec(&self) -> String {
        let mut filters: Vec<String> = Vec::new();

        if self.downmix_enabled {
            filters.push("downmix=channels=1".to_string());
        }
        if self.highpass_enabled {
            filters.push(format!(
                "highpass=freq={:.1}:q={:.3}",
                self.highpass_hz, self.highpass_q
            ));
        }
        if self.hum_enabled {
            filters.push(format!(
                "humnotch=freq={:.0}:harmonics={}:q={:.1}",
                self.hum_frequency.hz(),
                self.hum_harmonics,
                self.hum_q
            ));
        }
        if self.fft_denoise_enabled {
            filters.push(format!("denoise_fft=reduction={:.2}", self.fft_denoise_db));
        }
        if self.rnn_denoise_enabled {
            filters.push(format!(
                "denoise_rnn=mix={:.2}:passes={}",
                self.rnn_denoise_mix,
                if self.rnn_denoise_dual_pass { 2 } else { 1 }
            ));
        }
        if self.gate_enabled {
            filters.push(format!(
                "gate=threshold={:.6}:ratio={:.1}:range={:.4}:attack={:.0}:release={:.0}",
                self.gate_threshold,
                self.gate_ratio,
                self.gate_range,
                self.gate_attack_ms,
                self.gate_release_ms
            ));
        }
        if self.deesser_enabled {
            filters.push(format!(
                "deesser=intensity={:.2}:split={:.0}",
                self.deesser_intensity, self.deesser_split_hz
            ));
        }
        if self.compressor_enabled {
            filters.push(format!(
                "compressor=threshold={:.1}:ratio={:.1}:attack={:.0}:release={:.0}:makeup={:.1}:mix={:.2}",
                self.compressor_threshold_db,
                self.compressor_ratio,
                self.compressor_attack_ms,
                self.compressor_release_ms,
                self.compressor_makeup_db,
                self.compressor_mix
            ));
        }
        if self.dynanorm_enabled {
            filters.push(format!(
                "dynanorm=frame={}:filter={}:peak={:.2}:maxgain={:.1}",
                self.dynanorm_frame_ms,
                self.dynanorm_filter_size,
                self.dynanorm_peak,
                self.dynanorm_max_gain
            ));
        }
        if self.speechnorm_enabled {
            filters.push(format!(
                "speechnorm=expansion={:.2}:peak={:.2}:rms={:.4}",
                self.speechnorm_expansion, self.speechnorm_peak, self.speechnorm_target_rms
            ));
        }
        if self.nlm_denoise_enabled {
            filters.push(format!(
                "denoise_nlm=strength={:.6}",
                self.nlm_denoise_strength
            ));
        }
        if self.bleed_gate_enabled {
            filters.push(format!(
                "bleedgate=threshold={:.6}:ratio={:.1}:range={:.4}:attack={:.0}:release={:.0}",
                self.bleed_gate_threshold,
                self.bleed_gate_ratio,
                self.bleed_gate_range,
                self.bleed_gate_attack_ms,
                self.bleed_gate_release_ms
            ));
        }
        if self.limiter_enabled {
            filters.push(format!("limiter=ceiling={:.2}", self.limiter_ceiling_db));
        }

        filters.join(",")
    }
}
