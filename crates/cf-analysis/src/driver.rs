//! Analysis driver
//!
//! Runs the decoded input once through the read-only metering chain
//! (downmix → amplitude stats → spectral stats → ebur128) and produces
//! the measurement bundles. One chain implementation serves all three
//! loudness families: whole-file input, whole-file output and trimmed
//! region re-measurement.

use cf_core::{units, AudioBuffer, TimeSpan};

use crate::astats::AmplitudeStats;
use crate::interval::IntervalAccumulator;
use crate::loudness::LoudnessAnalyzer;
use crate::measurements::{AudioMeasurements, OutputMeasurements, RegionSample};
use crate::metadata::{keys, FrameMetadata};
use crate::prescan;
use crate::profile;
use crate::silence;
use crate::spectral::SpectralAnalyzer;
use crate::speech;
use crate::{AnalysisError, AnalysisResult};

/// Noise-floor derivation offsets below integrated loudness (dB)
const FLOOR_OFFSET_LOUD_DB: f64 = 18.0;
const FLOOR_OFFSET_MEDIUM_DB: f64 = 12.0;
const FLOOR_OFFSET_QUIET_DB: f64 = 8.0;
const FLOOR_LOUD_LUFS: f64 = -20.0;
const FLOOR_MEDIUM_LUFS: f64 = -30.0;
/// Final clamp on the derived noise floor (dBFS)
const FLOOR_MIN_DB: f64 = -90.0;
const FLOOR_MAX_DB: f64 = -30.0;
/// Offset below rms_level used by the second fallback tier (dB)
const FLOOR_BELOW_RMS_DB: f64 = 15.0;

/// Options for one analysis run
#[derive(Debug, Clone, Copy)]
pub struct AnalysisOptions {
    /// Target integrated loudness (LUFS), used for the target offset
    pub target_i: f64,
    /// Measure a mono source as dual mono
    pub dual_mono: bool,
    /// Source bit depth when the decoder knows it
    pub source_bit_depth: Option<u32>,
    /// Analysis block size in frames (also the spectral FFT size)
    pub block_frames: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            target_i: -16.0,
            dual_mono: false,
            source_bit_depth: None,
            block_frames: 2048,
        }
    }
}

/// The aggregated metering chain: one instance per pass or region
struct MeterChain {
    amplitude: AmplitudeStats,
    spectral: SpectralAnalyzer,
    loudness: LoudnessAnalyzer,
}

impl MeterChain {
    fn new(sample_rate: u32, opts: &AnalysisOptions) -> AnalysisResult<Self> {
        Ok(Self {
            amplitude: AmplitudeStats::new(opts.source_bit_depth),
            spectral: SpectralAnalyzer::new(sample_rate, opts.block_frames),
            loudness: LoudnessAnalyzer::new(1, sample_rate, opts.dual_mono)?,
        })
    }

    /// Run one mono block through every meter and publish the results
    fn process_block(&mut self, block: &[f64]) -> AnalysisResult<FrameMetadata> {
        self.amplitude.add_block(block);
        let snap = self.spectral.analyze_block(block)?;
        self.loudness.add_block(block)?;

        let mut meta = FrameMetadata::new();
        meta.set(keys::SPECTRAL_MEAN, snap.mean);
        meta.set(keys::SPECTRAL_VARIANCE, snap.variance);
        meta.set(keys::SPECTRAL_CENTROID, snap.centroid);
        meta.set(keys::SPECTRAL_SPREAD, snap.spread);
        meta.set(keys::SPECTRAL_SKEWNESS, snap.skewness);
        meta.set(keys::SPECTRAL_KURTOSIS, snap.kurtosis);
        meta.set(keys::SPECTRAL_ENTROPY, snap.entropy);
        meta.set(keys::SPECTRAL_FLATNESS, snap.flatness);
        meta.set(keys::SPECTRAL_CREST, snap.crest);
        meta.set(keys::SPECTRAL_FLUX, snap.flux);
        meta.set(keys::SPECTRAL_SLOPE, snap.slope);
        meta.set(keys::SPECTRAL_DECREASE, snap.decrease);
        meta.set(keys::SPECTRAL_ROLLOFF, snap.rolloff);
        meta.set(keys::LOUDNESS_MOMENTARY, self.loudness.momentary());
        meta.set(keys::LOUDNESS_SHORT_TERM, self.loudness.short_term());
        meta.set(keys::LOUDNESS_TRUE_PEAK, self.loudness.block_true_peak_db());
        meta.set(keys::LOUDNESS_SAMPLE_PEAK, self.loudness.block_sample_peak_db());
        Ok(meta)
    }
}

/// Measure a decoded input buffer (Pass 1, before region election)
pub fn measure(buffer: &AudioBuffer, opts: &AnalysisOptions) -> AnalysisResult<AudioMeasurements> {
    let mono = buffer.to_mono();
    if mono.samples.is_empty() {
        return Err(AnalysisError::EmptyInput);
    }

    let mut chain = MeterChain::new(mono.sample_rate, opts)?;
    let mut accumulator = IntervalAccumulator::new(mono.sample_rate);

    for block in mono.samples.chunks(opts.block_frames) {
        let meta = chain.process_block(block)?;
        accumulator.add_block(block, &meta);
    }

    let loudness = chain.loudness.finalize()?;
    let amplitude = chain.amplitude.finalize();
    let spectral_average = chain.spectral.average();
    let intervals = accumulator.finish();

    let scan = prescan::run(&intervals);
    let noise_floor = tiered_noise_floor(
        amplitude.rms_trough,
        amplitude.rms_level,
        loudness.integrated,
    );

    log::debug!(
        "measured {:.1}s: I {:.1} LUFS, TP {:.1} dBTP, floor {:.1} dBFS, {} intervals",
        mono.duration(),
        loudness.integrated,
        loudness.true_peak,
        noise_floor,
        intervals.len()
    );

    let mut warnings = Vec::new();
    if scan.fallback {
        warnings.push(
            "input too short for the room-tone pre-scan; using default silence threshold"
                .to_string(),
        );
    }

    let suggested_gate_threshold =
        profile::gate_threshold_linear(noise_floor, amplitude.rms_trough);
    let noise_reduction_headroom = profile::noise_reduction_headroom(
        amplitude.rms_level,
        noise_floor,
        loudness.integrated,
    );

    Ok(AudioMeasurements {
        duration: mono.duration(),
        sample_rate: mono.sample_rate,
        target_offset: opts.target_i - loudness.integrated,
        loudness,
        noise_floor,
        prescan_noise_floor: scan.noise_floor,
        silence_detect_level: scan.threshold,
        spectral_average,
        amplitude,
        intervals,
        silence_candidates: Vec::new(),
        speech_candidates: Vec::new(),
        noise_profile: None,
        elected_speech: None,
        suggested_gate_threshold,
        noise_reduction_headroom,
        warnings,
    })
}

/// Run region election and measurement synthesis over completed
/// measurements (Pass 1, after [`measure`])
pub fn analyze_regions(m: &mut AudioMeasurements) {
    let scan = prescan::run(&m.intervals);

    let silence_election = silence::elect_silence(&m.intervals, &scan);
    m.silence_candidates = silence_election.candidates;

    let mut silence_end = None;
    if let Some(elected) = silence_election.elected {
        if let Some(warning) = &elected.transient_warning {
            m.warnings.push(warning.clone());
        }
        let profile = profile::noise_profile(&elected);
        if let Some(warning) = &profile.extraction_warning {
            m.warnings.push(warning.clone());
        }
        // A measured profile beats the tiered derivation
        m.noise_floor = profile.measured_noise_floor;
        silence_end = Some(elected.span.end);
        m.noise_profile = Some(profile);
    } else {
        m.warnings.push(
            "no silence region elected; keeping the derived noise floor".to_string(),
        );
    }

    let speech_election =
        speech::elect_speech(&m.intervals, silence_end, m.noise_profile.as_ref());
    m.speech_candidates = speech_election.candidates;
    if speech_election.elected.is_none() {
        m.warnings
            .push("no speech region elected; filter tuning uses whole-file statistics".to_string());
    }
    m.elected_speech = speech_election.elected;

    m.suggested_gate_threshold =
        profile::gate_threshold_linear(m.noise_floor, m.amplitude.rms_trough);
    m.noise_reduction_headroom = profile::noise_reduction_headroom(
        m.amplitude.rms_level,
        m.noise_floor,
        m.loudness.integrated,
    );
}

/// Measure the Pass-2 artifact (no region detection)
pub fn measure_output(
    buffer: &AudioBuffer,
    opts: &AnalysisOptions,
) -> AnalysisResult<OutputMeasurements> {
    let mono = buffer.to_mono();
    if mono.samples.is_empty() {
        return Err(AnalysisError::EmptyInput);
    }

    let mut chain = MeterChain::new(mono.sample_rate, opts)?;
    let mut accumulator = IntervalAccumulator::new(mono.sample_rate);

    for block in mono.samples.chunks(opts.block_frames) {
        let meta = chain.process_block(block)?;
        accumulator.add_block(block, &meta);
    }

    Ok(OutputMeasurements {
        duration: mono.duration(),
        sample_rate: mono.sample_rate,
        loudness: chain.loudness.finalize()?,
        spectral_average: chain.spectral.average(),
        amplitude: chain.amplitude.finalize(),
        intervals: accumulator.finish(),
        silence_sample: None,
        speech_sample: None,
    })
}

/// Trim one elected region out of the processed audio and re-measure it
pub fn measure_region(
    buffer: &AudioBuffer,
    span: TimeSpan,
    opts: &AnalysisOptions,
) -> AnalysisResult<RegionSample> {
    let cut = buffer.slice_span(span).to_mono();
    let mut warnings = Vec::new();

    let mut chain = MeterChain::new(buffer.sample_rate, opts)?;
    for block in cut.samples.chunks(opts.block_frames) {
        chain.process_block(block)?;
    }

    let loudness = match chain.loudness.finalize() {
        Ok(summary) if summary.integrated.is_finite() => Some(summary),
        _ => {
            warnings.push(format!(
                "loudness not captured for the re-measured region at {:.1}s",
                span.start
            ));
            None
        }
    };

    Ok(RegionSample {
        span,
        amplitude: chain.amplitude.finalize(),
        spectral: chain.spectral.average(),
        loudness,
        warnings,
    })
}

/// Three-tier noise-floor derivation with a final clamp
fn tiered_noise_floor(rms_trough: f64, rms_level: f64, integrated: f64) -> f64 {
    let floor = if rms_trough.is_finite() && rms_trough != 0.0 && rms_trough > units::DB_FLOOR {
        rms_trough
    } else if rms_level.is_finite() && rms_level > units::DB_FLOOR {
        rms_level - FLOOR_BELOW_RMS_DB
    } else {
        let offset = if integrated > FLOOR_LOUD_LUFS {
            FLOOR_OFFSET_LOUD_DB
        } else if integrated > FLOOR_MEDIUM_LUFS {
            FLOOR_OFFSET_MEDIUM_DB
        } else {
            FLOOR_OFFSET_QUIET_DB
        };
        integrated - offset
    };

    floor.clamp(FLOOR_MIN_DB, FLOOR_MAX_DB)
}
