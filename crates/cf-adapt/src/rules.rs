//! The ordered tuning pipeline
//!
//! Each rule is a pure function over `(&AudioMeasurements, &mut
//! FilterChainConfig)`. The pipeline order is fixed data: downstream
//! rules may read config values written upstream (the speech-norm rule
//! reads nothing the bleed-gate rule writes, but the bleed-gate rule
//! reads the speech-norm peak), so reordering is a behaviour change.

use cf_core::units;
use cf_analysis::AudioMeasurements;

use crate::config::FilterChainConfig;

/// One named tuning rule
pub struct TuningRule {
    /// Stable rule name, used in logs
    pub name: &'static str,
    /// The tuning function
    pub apply: fn(&AudioMeasurements, &mut FilterChainConfig),
}

/// The pipeline, in execution order
pub const TUNING_RULES: &[TuningRule] = &[
    TuningRule { name: "highpass", apply: tune_highpass },
    TuningRule { name: "hum", apply: tune_hum },
    TuningRule { name: "fft_denoise", apply: tune_fft_denoise },
    TuningRule { name: "rnn_denoise", apply: tune_rnn_denoise },
    TuningRule { name: "gate", apply: tune_gate },
    TuningRule { name: "deesser", apply: tune_deesser },
    TuningRule { name: "compressor", apply: tune_compressor },
    TuningRule { name: "dynanorm", apply: tune_dynanorm },
    TuningRule { name: "speechnorm", apply: tune_speechnorm },
    TuningRule { name: "bleed_gate", apply: tune_bleed_gate },
];

/// Run the whole pipeline and sanitise the result
pub fn apply_rules(m: &AudioMeasurements, config: &mut FilterChainConfig) {
    for rule in TUNING_RULES {
        (rule.apply)(m, config);
    }
    config.sanitize();
    log::debug!("adapted filter chain: {}", config.render_spec());
}

/// Gain the normaliser will have to supply (LU)
fn lufs_gap(m: &AudioMeasurements, config: &FilterChainConfig) -> f64 {
    config.target_i - m.loudness.integrated
}

/// Spectral centroid of the program material: the elected speech region
/// when one exists, the whole-file average otherwise
fn program_centroid(m: &AudioMeasurements) -> f64 {
    m.elected_speech
        .as_ref()
        .map(|s| s.stats.centroid)
        .unwrap_or(m.spectral_average.centroid)
}

/// Spectral rolloff of the program material
fn program_rolloff(m: &AudioMeasurements) -> f64 {
    m.elected_speech
        .as_ref()
        .map(|s| s.stats.rolloff)
        .unwrap_or(m.spectral_average.rolloff)
}

// ── highpass ────────────────────────────────────────────────────────

const HP_BASE_DARK_HZ: f64 = 60.0;
const HP_BASE_NORMAL_HZ: f64 = 80.0;
const HP_BASE_BRIGHT_HZ: f64 = 100.0;
const HP_CENTROID_NORMAL_HZ: f64 = 4000.0;
const HP_CENTROID_BRIGHT_HZ: f64 = 6000.0;
const HP_GAP_BUMP_DB: f64 = 15.0;
const HP_GAP_BIG_BUMP_DB: f64 = 25.0;
const HP_BUMP_HZ: f64 = 20.0;
const HP_BIG_BUMP_HZ: f64 = 40.0;
const HP_CAP_HZ: f64 = 120.0;

fn tune_highpass(m: &AudioMeasurements, config: &mut FilterChainConfig) {
    let centroid = program_centroid(m);
    let base = if centroid < HP_CENTROID_NORMAL_HZ {
        HP_BASE_DARK_HZ
    } else if centroid <= HP_CENTROID_BRIGHT_HZ {
        HP_BASE_NORMAL_HZ
    } else {
        HP_BASE_BRIGHT_HZ
    };

    let gap = lufs_gap(m, config);
    let bump = if gap > HP_GAP_BIG_BUMP_DB {
        HP_BIG_BUMP_HZ
    } else if gap > HP_GAP_BUMP_DB {
        HP_BUMP_HZ
    } else {
        0.0
    };

    config.highpass_hz = (base + bump).min(HP_CAP_HZ);
}

// ── hum notch ───────────────────────────────────────────────────────

/// Room tone with entropy below this looks tonal: suspect mains hum
const HUM_ENTROPY_KNEE: f64 = 0.7;
const HUM_HARMONICS: u32 = 4;
const HUM_Q: f64 = 30.0;

fn tune_hum(m: &AudioMeasurements, config: &mut FilterChainConfig) {
    let Some(profile) = &m.noise_profile else {
        return;
    };
    if profile.entropy < HUM_ENTROPY_KNEE {
        config.hum_enabled = true;
        config.hum_harmonics = HUM_HARMONICS;
        config.hum_q = HUM_Q;
    }
}

// ── FFT denoise ─────────────────────────────────────────────────────

const FFT_BASE_DB: f64 = 12.0;
const FFT_HEADROOM_LOW_DB: f64 = 15.0;
const FFT_HEADROOM_HIGH_DB: f64 = 30.0;
const FFT_SCALE_LOW: f64 = 0.7;
const FFT_SCALE_MID: f64 = 1.0;
const FFT_SCALE_HIGH: f64 = 1.2;
const FFT_MIN_DB: f64 = 6.0;
const FFT_MAX_DB: f64 = 40.0;

fn tune_fft_denoise(m: &AudioMeasurements, config: &mut FilterChainConfig) {
    let base = FFT_BASE_DB + lufs_gap(m, config);
    let scale = if m.noise_reduction_headroom < FFT_HEADROOM_LOW_DB {
        FFT_SCALE_LOW
    } else if m.noise_reduction_headroom <= FFT_HEADROOM_HIGH_DB {
        FFT_SCALE_MID
    } else {
        FFT_SCALE_HIGH
    };
    config.fft_denoise_db = (base * scale).clamp(FFT_MIN_DB, FFT_MAX_DB);
}

// ── RNN denoise ─────────────────────────────────────────────────────

const RNN_GAP_DB: f64 = 15.0;
const RNN_FLOOR_DB: f64 = -55.0;
const RNN_DUAL_GAP_DB: f64 = 25.0;
const RNN_DUAL_FLOOR_DB: f64 = -45.0;
const RNN_MIX_MILD: f64 = 0.80;
const RNN_MIX_MODERATE: f64 = 0.85;
const RNN_MIX_SEVERE: f64 = 0.95;

fn tune_rnn_denoise(m: &AudioMeasurements, config: &mut FilterChainConfig) {
    let gap = lufs_gap(m, config);
    let floor = m.noise_floor;

    if gap <= RNN_GAP_DB && floor <= RNN_FLOOR_DB {
        return;
    }
    config.rnn_denoise_enabled = true;
    config.rnn_denoise_dual_pass = gap > RNN_DUAL_GAP_DB && floor > RNN_DUAL_FLOOR_DB;
    config.rnn_denoise_mix = if config.rnn_denoise_dual_pass {
        RNN_MIX_SEVERE
    } else if gap > RNN_GAP_DB {
        RNN_MIX_MODERATE
    } else {
        RNN_MIX_MILD
    };
}

// ── gate ────────────────────────────────────────────────────────────

const GATE_MIN_DB: f64 = -70.0;
const GATE_MAX_DB: f64 = -25.0;

fn tune_gate(m: &AudioMeasurements, config: &mut FilterChainConfig) {
    config.gate_threshold = m
        .suggested_gate_threshold
        .clamp(units::db_to_linear(GATE_MIN_DB), units::db_to_linear(GATE_MAX_DB));
}

// ── de-esser ────────────────────────────────────────────────────────

const DEESS_DARK: f64 = 0.4;
const DEESS_NORMAL: f64 = 0.5;
const DEESS_BRIGHT: f64 = 0.6;
const DEESS_ROLLOFF_DISABLE_HZ: f64 = 6000.0;
const DEESS_ROLLOFF_SOFT_HZ: f64 = 8000.0;
const DEESS_ROLLOFF_HOT_HZ: f64 = 12000.0;
const DEESS_SOFT_SCALE: f64 = 0.7;
const DEESS_HOT_SCALE: f64 = 1.2;
const DEESS_HOT_CAP: f64 = 0.8;
const DEESS_MIN: f64 = 0.3;

fn tune_deesser(m: &AudioMeasurements, config: &mut FilterChainConfig) {
    let centroid = program_centroid(m);
    let mut intensity = if centroid > HP_CENTROID_BRIGHT_HZ {
        DEESS_BRIGHT
    } else if centroid >= HP_CENTROID_NORMAL_HZ {
        DEESS_NORMAL
    } else {
        DEESS_DARK
    };

    let rolloff = program_rolloff(m);
    if rolloff < DEESS_ROLLOFF_DISABLE_HZ {
        config.deesser_enabled = false;
        return;
    } else if rolloff < DEESS_ROLLOFF_SOFT_HZ {
        intensity *= DEESS_SOFT_SCALE;
    } else if rolloff > DEESS_ROLLOFF_HOT_HZ {
        intensity = (intensity * DEESS_HOT_SCALE).min(DEESS_HOT_CAP);
    }

    if intensity < DEESS_MIN {
        config.deesser_enabled = false;
    } else {
        config.deesser_enabled = true;
        config.deesser_intensity = intensity;
    }
}

// ── compressor ──────────────────────────────────────────────────────

const COMP_DR_WIDE_DB: f64 = 30.0;
const COMP_DR_MID_DB: f64 = 20.0;
const COMP_LRA_WIDE: f64 = 15.0;
const COMP_LRA_MID: f64 = 8.0;
/// Noise-floor quality knees for the wet/dry mix
const COMP_FLOOR_CLEAN_DB: f64 = -65.0;
const COMP_FLOOR_OK_DB: f64 = -50.0;
const COMP_MIX_CLEAN: f64 = 0.9;
const COMP_MIX_OK: f64 = 0.8;
const COMP_MIX_NOISY: f64 = 0.7;
const COMP_MIX_DYNAMICS_STEP: f64 = 0.10;
const COMP_DR_NARROW_DB: f64 = 15.0;

fn tune_compressor(m: &AudioMeasurements, config: &mut FilterChainConfig) {
    let dynamic_range = m.amplitude.dynamic_range;

    let (ratio, threshold, makeup) = if dynamic_range > COMP_DR_WIDE_DB {
        (2.0, -16.0, 1.0)
    } else if dynamic_range > COMP_DR_MID_DB {
        (3.0, -18.0, 2.0)
    } else {
        (4.0, -20.0, 3.0)
    };
    config.compressor_ratio = ratio;
    config.compressor_threshold_db = threshold;
    config.compressor_makeup_db = makeup;

    let (attack, release) = if m.loudness.range > COMP_LRA_WIDE {
        (25.0, 300.0)
    } else if m.loudness.range > COMP_LRA_MID {
        (20.0, 250.0)
    } else {
        (15.0, 150.0)
    };
    config.compressor_attack_ms = attack;
    config.compressor_release_ms = release;

    let mut mix = if m.noise_floor < COMP_FLOOR_CLEAN_DB {
        COMP_MIX_CLEAN
    } else if m.noise_floor < COMP_FLOOR_OK_DB {
        COMP_MIX_OK
    } else {
        COMP_MIX_NOISY
    };
    if dynamic_range > COMP_DR_WIDE_DB {
        mix -= COMP_MIX_DYNAMICS_STEP;
    } else if dynamic_range < COMP_DR_NARROW_DB {
        mix += COMP_MIX_DYNAMICS_STEP;
    }
    config.compressor_mix = mix.clamp(0.0, 1.0);
}

// ── dyna-norm ───────────────────────────────────────────────────────

fn tune_dynanorm(_m: &AudioMeasurements, config: &mut FilterChainConfig) {
    // Fixed conservative parameters: the adaptive work happens in the
    // surrounding filters
    config.dynanorm_frame_ms = 500;
    config.dynanorm_filter_size = 31;
    config.dynanorm_peak = 0.95;
    config.dynanorm_max_gain = 5.0;
    config.dynanorm_compress = 0.0;
    config.dynanorm_dc_correct = false;
}

// ── speech-norm ─────────────────────────────────────────────────────

const SPEECHNORM_MAX_EXPANSION: f64 = 10.0;
/// Expansion at or past this attaches the heavy denoise pair
const SPEECHNORM_DENOISE_KNEE: f64 = 8.0;
const NLM_BASE_STRENGTH: f64 = 0.00001;
/// Speech programme loudness approximation: LUFS ≈ −23 + 20·log10(RMS)
const RMS_REFERENCE_LUFS: f64 = -23.0;

fn tune_speechnorm(m: &AudioMeasurements, config: &mut FilterChainConfig) {
    let expansion =
        units::db_to_linear(lufs_gap(m, config)).clamp(1.0, SPEECHNORM_MAX_EXPANSION);
    config.speechnorm_expansion = expansion;
    config.speechnorm_target_rms =
        units::db_to_linear(config.target_i - RMS_REFERENCE_LUFS).min(1.0);

    if expansion >= SPEECHNORM_DENOISE_KNEE {
        config.rnn_denoise_enabled = true;
        config.nlm_denoise_enabled = true;
        config.nlm_denoise_strength = NLM_BASE_STRENGTH * expansion * expansion;
    }
}

// ── bleed gate ──────────────────────────────────────────────────────

const BLEED_CREST_KNEE_DB: f64 = 15.0;
const BLEED_PEAK_TO_FLOOR_KNEE_DB: f64 = 20.0;
const BLEED_PEAK_MARGIN_DB: f64 = 3.0;
const BLEED_NOISE_MARGIN_DB: f64 = 6.0;
const BLEED_DISABLE_BELOW_DB: f64 = -40.0;
const BLEED_THRESHOLD_MIN_DB: f64 = -50.0;
const BLEED_THRESHOLD_MAX_DB: f64 = -20.0;
/// Predicted output peak above this counts as severe bleed
const BLEED_SEVERE_PEAK_DB: f64 = -10.0;

fn tune_bleed_gate(m: &AudioMeasurements, config: &mut FilterChainConfig) {
    let Some(profile) = &m.noise_profile else {
        return;
    };

    // Worst case: speech-norm drives the bleed peaks all the way to its
    // own peak target
    let speechnorm_peak_db = units::linear_to_db(config.speechnorm_peak);
    let worst_case_gain = speechnorm_peak_db - profile.peak_level;
    let predicted_peak = profile.peak_level + worst_case_gain;
    let predicted_noise = profile.measured_noise_floor + worst_case_gain;

    if predicted_peak < BLEED_DISABLE_BELOW_DB {
        config.bleed_gate_enabled = false;
        return;
    }

    let peak_to_floor = profile.peak_level - profile.measured_noise_floor;
    let threshold_db = if profile.crest_factor > BLEED_CREST_KNEE_DB
        || peak_to_floor > BLEED_PEAK_TO_FLOOR_KNEE_DB
    {
        predicted_peak - BLEED_PEAK_MARGIN_DB
    } else {
        predicted_noise + BLEED_NOISE_MARGIN_DB
    };
    let threshold_db = threshold_db.clamp(BLEED_THRESHOLD_MIN_DB, BLEED_THRESHOLD_MAX_DB);

    config.bleed_gate_enabled = true;
    config.bleed_gate_threshold = units::db_to_linear(threshold_db);

    if predicted_peak > BLEED_SEVERE_PEAK_DB {
        config.bleed_gate_ratio = 6.0;
        config.bleed_gate_range = 0.063;
        config.bleed_gate_attack_ms = 10.0;
        config.bleed_gate_release_ms = 200.0;
    } else {
        config.bleed_gate_ratio = 4.0;
        config.bleed_gate_range = 0.125;
        config.bleed_gate_attack_ms = 15.0;
        config.bleed_gate_release_ms = 250.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cf_analysis::{
        AmplitudeSummary, AudioMeasurements, LoudnessSummary, NoiseProfile, SpectralSnapshot,
    };
    use cf_core::units::db_to_linear;

    /// Measurement fixture with sane spoken-word values
    fn measurements(integrated: f64, noise_floor: f64) -> AudioMeasurements {
        let amplitude = AmplitudeSummary {
            rms_level: -20.0,
            peak_level: -4.0,
            rms_trough: noise_floor + 8.0,
            rms_peak: -12.0,
            dynamic_range: 25.0,
            crest_factor: 16.0,
            sample_count: 48000 * 60,
            ..AmplitudeSummary::default()
        };
        AudioMeasurements {
            duration: 60.0,
            sample_rate: 48000,
            loudness: LoudnessSummary {
                integrated,
                true_peak: -3.0,
                sample_peak: -3.5,
                range: 9.0,
                threshold: integrated - 10.0,
            },
            target_offset: -16.0 - integrated,
            noise_floor,
            prescan_noise_floor: noise_floor,
            silence_detect_level: noise_floor + 1.0,
            spectral_average: SpectralSnapshot {
                centroid: 5000.0,
                rolloff: 7000.0,
                entropy: 0.6,
                flatness: 0.3,
                kurtosis: 5.0,
                ..SpectralSnapshot::default()
            },
            amplitude,
            intervals: Vec::new(),
            silence_candidates: Vec::new(),
            speech_candidates: Vec::new(),
            noise_profile: None,
            elected_speech: None,
            suggested_gate_threshold: db_to_linear(-45.0),
            noise_reduction_headroom: (-20.0f64 - noise_floor).clamp(0.0, 60.0),
            warnings: Vec::new(),
        }
    }

    fn profile(floor: f64, peak: f64, entropy: f64) -> NoiseProfile {
        NoiseProfile {
            start: 18.0,
            duration: 10.0,
            measured_noise_floor: floor,
            peak_level: peak,
            crest_factor: peak - floor,
            entropy,
            centroid: 120.0,
            flatness: 0.8,
            kurtosis: 2.0,
            extraction_warning: None,
        }
    }

    fn adapt(m: &AudioMeasurements) -> FilterChainConfig {
        let mut config = FilterChainConfig::default();
        apply_rules(m, &mut config);
        config
    }

    #[test]
    fn clean_studio_recording() {
        // -16 LUFS source at target, -72 dBFS floor, 56 dB headroom
        let mut m = measurements(-16.0, -72.0);
        m.suggested_gate_threshold = db_to_linear(-42.0);
        m.noise_reduction_headroom = 56.0;
        let config = adapt(&m);

        // Gap 0: base 12 dB, x1.2 for generous headroom
        assert_relative_eq!(config.fft_denoise_db, 14.4, epsilon = 1e-9);
        // Centroid 5000 Hz: normal voice, 80 Hz high-pass, no gap bump
        assert_relative_eq!(config.highpass_hz, 80.0);
        // Gate keeps the synthesised threshold
        assert_relative_eq!(config.gate_threshold, db_to_linear(-42.0), epsilon = 1e-15);
        assert!(!config.rnn_denoise_enabled);
    }

    #[test]
    fn deesser_disabled_for_dull_source() {
        let mut m = measurements(-16.0, -72.0);
        m.spectral_average.rolloff = 5500.0;
        let config = adapt(&m);
        assert!(!config.deesser_enabled);
    }

    #[test]
    fn quiet_source_needing_heavy_gain() {
        // -35 LUFS source, -55 dBFS floor: gap 19 dB
        let mut m = measurements(-35.0, -55.0);
        m.noise_reduction_headroom = 20.0;
        let config = adapt(&m);

        assert!(config.rnn_denoise_enabled);
        assert!(!config.rnn_denoise_dual_pass);
        assert_relative_eq!(config.rnn_denoise_mix, 0.85);

        // FFT denoise: (12 + 19) x 1.0 = 31 dB, inside the clamp
        assert_relative_eq!(config.fft_denoise_db, 31.0, epsilon = 1e-9);

        // Speech-norm expansion 10^(19/20) ~ 8.91, over the denoise knee
        assert_relative_eq!(config.speechnorm_expansion, 8.9125, epsilon = 1e-3);
        assert!(config.nlm_denoise_enabled);
        assert_relative_eq!(config.nlm_denoise_strength, 7.943e-4, epsilon = 1e-6);
    }

    #[test]
    fn bleed_laden_source() {
        // Noise-profile peak -22 dBFS, crest 25 dB, floor -47 dBFS
        let mut m = measurements(-20.0, -47.0);
        m.noise_profile = Some(profile(-47.0, -22.0, 0.85));
        let config = adapt(&m);

        assert!(config.bleed_gate_enabled);
        // Predicted output peak ~ -0.45 dBFS: severe; threshold
        // predicted - 3 = -3.45, clamped to the -20 dBFS ceiling
        assert_relative_eq!(config.bleed_gate_threshold, db_to_linear(-20.0), epsilon = 1e-12);
        assert_relative_eq!(config.bleed_gate_ratio, 6.0);
        assert_relative_eq!(config.bleed_gate_range, 0.063);
        assert_relative_eq!(config.bleed_gate_attack_ms, 10.0);
    }

    #[test]
    fn quiet_bleed_disables_the_gate() {
        // Profile so quiet that even worst-case gain leaves it inaudible
        let mut m = measurements(-16.0, -90.0);
        let mut p = profile(-96.0, -88.0, 0.85);
        // Worst-case gain referenced to a tiny speech-norm peak keeps
        // the predicted peak below the enable floor
        p.peak_level = -88.0;
        m.noise_profile = Some(p);
        let mut config = FilterChainConfig {
            speechnorm_peak: db_to_linear(-50.0),
            ..FilterChainConfig::default()
        };
        apply_rules(&m, &mut config);
        assert!(!config.bleed_gate_enabled);
    }

    #[test]
    fn hum_filter_follows_noise_entropy() {
        let mut m = measurements(-16.0, -60.0);
        m.noise_profile = Some(profile(-60.0, -45.0, 0.55));
        let config = adapt(&m);
        assert!(config.hum_enabled);
        assert_eq!(config.hum_harmonics, 4);
        assert_relative_eq!(config.hum_q, 30.0);

        let mut m2 = measurements(-16.0, -60.0);
        m2.noise_profile = Some(profile(-60.0, -45.0, 0.9));
        assert!(!adapt(&m2).hum_enabled);
    }

    #[test]
    fn compressor_buckets_by_dynamic_range() {
        let mut wide = measurements(-16.0, -60.0);
        wide.amplitude.dynamic_range = 35.0;
        let config = adapt(&wide);
        assert_relative_eq!(config.compressor_ratio, 2.0);
        assert_relative_eq!(config.compressor_threshold_db, -16.0);
        assert_relative_eq!(config.compressor_makeup_db, 1.0);

        let mut narrow = measurements(-16.0, -60.0);
        narrow.amplitude.dynamic_range = 12.0;
        let config = adapt(&narrow);
        assert_relative_eq!(config.compressor_ratio, 4.0);
        assert_relative_eq!(config.compressor_threshold_db, -20.0);
        assert_relative_eq!(config.compressor_makeup_db, 3.0);
    }

    #[test]
    fn adapter_is_idempotent() {
        let mut m = measurements(-28.0, -58.0);
        m.noise_profile = Some(profile(-58.0, -35.0, 0.6));

        let mut first = FilterChainConfig::default();
        apply_rules(&m, &mut first);
        let mut second = first.clone();
        apply_rules(&m, &mut second);

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn adapted_config_is_always_finite() {
        let mut m = measurements(f64::NEG_INFINITY, f64::NAN);
        m.suggested_gate_threshold = f64::NAN;
        m.noise_reduction_headroom = f64::INFINITY;
        let config = adapt(&m);

        assert!(config.is_finite());
        assert!(config.gate_threshold > 0.0);
        assert!((1..=8).contains(&config.hum_harmonics));
    }

    #[test]
    fn pipeline_order_is_fixed() {
        let names: Vec<&str> = TUNING_RULES.iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            [
                "highpass",
                "hum",
                "fft_denoise",
                "rnn_denoise",
                "gate",
                "deesser",
                "compressor",
                "dynanorm",
                "speechnorm",
                "bleed_gate",
            ]
        );
    }

    #[test]
    fn gate_threshold_is_clamped_to_working_range() {
        let mut m = measurements(-16.0, -60.0);
        m.suggested_gate_threshold = db_to_linear(-90.0);
        assert_relative_eq!(
            adapt(&m).gate_threshold,
            db_to_linear(-70.0),
            epsilon = 1e-15
        );

        m.suggested_gate_threshold = db_to_linear(-10.0);
        assert_relative_eq!(
            adapt(&m).gate_threshold,
            db_to_linear(-25.0),
            epsilon = 1e-15
        );
    }
}
