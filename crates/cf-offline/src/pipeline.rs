//! The multi-pass processing pipeline
//!
//! Pass 1 measures the input and adapts the filter chain; Pass 2 runs
//! the chain, re-measures the output and the elected regions, and
//! writes the artifact; Pass 3 is a measurement-only loudness pass over
//! the closed artifact; Pass 4 applies linear-mode loudness
//! normalisation with true-peak limiting and validates the result.
//! Passes run strictly in sequence; each observes a fully flushed
//! artifact of its predecessor.

use std::path::Path;

use serde::{Deserialize, Serialize};

use cf_adapt::FilterChainConfig;
use cf_analysis::{
    analyze_regions, measure, measure_output, measure_region, AnalysisOptions, AudioMeasurements,
    LoudnessAnalyzer, LoudnessSummary, OutputMeasurements,
};
use cf_core::{units, AudioBuffer, TimeSpan};
use cf_dsp::{BlockProcessor, FilterGraph, Limiter};

use crate::config::PipelineConfig;
use crate::decoder;
use crate::encoder;
use crate::error::{PipelineError, PipelineResult};
use crate::resample;

/// Safety margin kept under the linear-mode gain ceiling (dB)
const LINEAR_SAFETY_MARGIN_DB: f64 = 0.1;
/// Allowed deviation between final and effective loudness (LU)
const TARGET_TOLERANCE_LU: f64 = 0.5;
/// Integrated loudness below this counts as silent audio (LUFS)
const SILENT_LUFS: f64 = -70.0;

/// Outcome of the loudness-normalisation passes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalisationResult {
    /// The loudness the caller asked for (LUFS)
    pub requested_i: f64,
    /// The loudness actually targeted after the linear-mode clamp
    pub effective_i: f64,
    /// Whether the clamp lowered the target
    pub linear_mode_forced: bool,
    /// Pass-3 measured integrated loudness (LUFS)
    pub measured_i: f64,
    /// Pass-3 measured true peak (dBTP)
    pub measured_tp: f64,
    /// Pass-3 measured loudness range (LU)
    pub measured_lra: f64,
    /// Pass-3 measured gating threshold (LUFS)
    pub measured_threshold: f64,
    /// requested_i − measured_i (LU)
    pub target_offset: f64,
    /// Final integrated loudness after Pass 4 (LUFS)
    pub output_i: f64,
    /// Final true peak after Pass 4 (dBTP)
    pub output_tp: f64,
    /// Whether the final loudness landed within tolerance
    pub within_target: bool,
}

/// Everything one pipeline run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Pass-1 measurements and elections
    pub measurements: AudioMeasurements,
    /// The adapted filter-chain configuration
    pub filter_config: FilterChainConfig,
    /// Pass-2 output-side measurements with region re-measurements
    pub output: OutputMeasurements,
    /// Pass-3/4 normalisation outcome
    pub normalisation: NormalisationResult,
}

/// The post-processor: owns the configuration, runs the passes
pub struct PostProcessor {
    config: PipelineConfig,
}

impl PostProcessor {
    /// Create a processor with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run all four passes: read `input`, write the processed and
    /// normalised artifact to `output`
    pub fn process(&self, input: &Path, output: &Path) -> PipelineResult<PipelineReport> {
        // ── Pass 1: measure and adapt ───────────────────────────────
        let (mono, opts) = self.load_input(input)?;

        let mut measurements = measure(&mono, &opts)
            .map_err(|e| PipelineError::AnalysisFailed(e.to_string()))?;
        if self.config.stages.analysis {
            analyze_regions(&mut measurements);
        }

        let mut filter_config = self.config.seed_filter_config();
        cf_adapt::apply_rules(&measurements, &mut filter_config);
        self.config.enforce_toggles(&mut filter_config);
        log::info!("pass 1 complete: {}", filter_config.render_spec());

        if let (Some(path), Some(profile)) =
            (&self.config.noise_sample_path, &measurements.noise_profile)
        {
            let span = TimeSpan::from_duration(profile.start, profile.duration);
            encoder::write_wav(&mono.slice_span(span), path, 16)?;
        }

        // ── Pass 2: filter, re-measure, write ───────────────────────
        let mut processed = mono;
        let mut graph = FilterGraph::from_config(&filter_config, processed.sample_rate);
        graph
            .process(&mut processed)
            .map_err(|e| PipelineError::ProcessingFailed(e.to_string()))?;

        let mut output_measurements = measure_output(&processed, &opts)
            .map_err(|e| PipelineError::ProcessingFailed(e.to_string()))?;

        if let Some(profile) = &measurements.noise_profile {
            let span = TimeSpan::from_duration(profile.start, profile.duration);
            output_measurements.silence_sample = Some(
                measure_region(&processed, span, &opts)
                    .map_err(|e| PipelineError::ProcessingFailed(e.to_string()))?,
            );
        }
        if let Some(speech) = &measurements.elected_speech {
            output_measurements.speech_sample = Some(
                measure_region(&processed, speech.span, &opts)
                    .map_err(|e| PipelineError::ProcessingFailed(e.to_string()))?,
            );
        }

        encoder::write_atomic(&processed, output, self.config.output_bit_depth)?;
        log::info!("pass 2 complete: wrote {}", output.display());
        drop(processed);

        // ── Passes 3 and 4 over the closed artifact ─────────────────
        let normalisation = self.normalize(output)?;

        Ok(PipelineReport {
            measurements,
            filter_config,
            output: output_measurements,
            normalisation,
        })
    }

    /// Run the loudness passes alone: measure `path`, then rewrite it
    /// in place at the effective target
    pub fn normalize(&self, path: &Path) -> PipelineResult<NormalisationResult> {
        // ── Pass 3: measurement only ────────────────────────────────
        let artifact = decoder::decode(path)
            .map_err(|e| PipelineError::ProcessingFailed(e.to_string()))?
            .to_mono();
        let measured = self.measure_loudness(&artifact)?;

        if !measured.integrated.is_finite() || measured.integrated < SILENT_LUFS {
            return Err(PipelineError::SilentAudio {
                lufs: measured.integrated,
            });
        }
        log::info!(
            "pass 3 complete: I {:.2} LUFS, TP {:.2} dBTP, LRA {:.2} LU",
            measured.integrated,
            measured.true_peak,
            measured.range
        );

        // ── Pass 4: linear-mode normalisation ───────────────────────
        let (effective_i, linear_mode_forced) = compute_effective_target(
            self.config.target_i,
            self.config.target_tp,
            measured.integrated,
            measured.true_peak,
        );
        log::info!(
            "pass 4: {}",
            render_normalize_spec(&self.config, &measured, effective_i)
        );

        let gain_db = effective_i - measured.integrated;
        let mut normalized = artifact;
        normalized.apply_gain(units::db_to_linear(gain_db));

        let mut limiter = Limiter::new(self.config.target_tp, normalized.sample_rate);
        limiter
            .process(&mut normalized.samples)
            .map_err(|e| PipelineError::ProcessingFailed(e.to_string()))?;

        let final_loudness = self.measure_loudness(&normalized)?;
        let within_target =
            (final_loudness.integrated - effective_i).abs() <= TARGET_TOLERANCE_LU;
        if !within_target {
            log::warn!(
                "final loudness {:.2} LUFS missed the effective target {:.2} LUFS",
                final_loudness.integrated,
                effective_i
            );
        }

        encoder::write_atomic(&normalized, path, self.config.output_bit_depth)?;
        log::info!(
            "pass 4 complete: {:.2} LUFS / {:.2} dBTP (forced linear: {})",
            final_loudness.integrated,
            final_loudness.true_peak,
            linear_mode_forced
        );

        Ok(NormalisationResult {
            requested_i: self.config.target_i,
            effective_i,
            linear_mode_forced,
            measured_i: measured.integrated,
            measured_tp: measured.true_peak,
            measured_lra: measured.range,
            measured_threshold: measured.threshold,
            target_offset: self.config.target_i - measured.integrated,
            output_i: final_loudness.integrated,
            output_tp: final_loudness.true_peak,
            within_target,
        })
    }

    /// Decode, optionally resample, and downmix the input
    fn load_input(&self, input: &Path) -> PipelineResult<(AudioBuffer, AnalysisOptions)> {
        let info = decoder::probe(input)?;
        let decoded = decoder::decode(input)?;

        if !self.config.stages.downmix && decoded.channels > 1 {
            return Err(PipelineError::ProcessingFailed(
                "multi-channel input requires the downmix stage".into(),
            ));
        }
        let mut mono = decoded.to_mono();

        if self.config.stages.resample {
            if let Some(rate) = self.config.resample_rate {
                mono = resample::resample(&mono, rate)?;
            }
        }

        let opts = AnalysisOptions {
            target_i: self.config.target_i,
            dual_mono: self.config.dual_mono,
            source_bit_depth: info.bit_depth,
            ..AnalysisOptions::default()
        };
        Ok((mono, opts))
    }

    /// One loudness-only measurement over a buffer
    fn measure_loudness(&self, buffer: &AudioBuffer) -> PipelineResult<LoudnessSummary> {
        let mut meter = LoudnessAnalyzer::new(1, buffer.sample_rate, self.config.dual_mono)
            .map_err(|e| PipelineError::ProcessingFailed(e.to_string()))?;
        for block in buffer.samples.chunks(8192) {
            meter
                .add_block(block)
                .map_err(|e| PipelineError::ProcessingFailed(e.to_string()))?;
        }
        meter
            .finalize()
            .map_err(|e| PipelineError::ProcessingFailed(e.to_string()))
    }
}

/// Pick the loudness target linear-mode gain can actually reach
///
/// A constant gain may not push the program to the desired loudness
/// without the true peak crossing its own target; the effective target
/// is capped accordingly (with a small safety margin) and the caller is
/// told when the cap engaged.
pub fn compute_effective_target(
    desired_i: f64,
    target_tp: f64,
    measured_i: f64,
    measured_tp: f64,
) -> (f64, bool) {
    let max_linear_i = target_tp - measured_tp + measured_i - LINEAR_SAFETY_MARGIN_DB;
    if desired_i > max_linear_i {
        (max_linear_i, true)
    } else {
        (desired_i, false)
    }
}

/// The second-pass normalisation descriptor, rendered for the logs
fn render_normalize_spec(
    config: &PipelineConfig,
    measured: &LoudnessSummary,
    effective_i: f64,
) -> String {
    format!(
        "normalize=i={:.1}:tp={:.1}:lra={:.1}:measured_i={:.2}:measured_tp={:.2}\
         :measured_lra={:.2}:measured_thresh={:.2}:offset={:.2}:dual_mono={}\
         :linear=true:print_format=summary",
        effective_i,
        config.target_tp,
        config.target_lra,
        measured.integrated,
        measured.true_peak,
        measured.range,
        measured.threshold,
        effective_i - measured.integrated,
        config.dual_mono,
    )
}
