//! Sample rate conversion at the decode boundary
//!
//! Rubato sinc resampling applied right after decoding, so every later
//! stage (interval boundaries included) sees one consistent rate.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use cf_core::AudioBuffer;

use crate::error::{PipelineError, PipelineResult};

const CHUNK_SIZE: usize = 1024;

/// Resample a mono buffer to `target_rate`
pub fn resample(buffer: &AudioBuffer, target_rate: u32) -> PipelineResult<AudioBuffer> {
    if buffer.sample_rate == target_rate || buffer.samples.is_empty() {
        return Ok(AudioBuffer {
            samples: buffer.samples.clone(),
            channels: buffer.channels,
            sample_rate: target_rate,
        });
    }
    if buffer.channels != 1 {
        return Err(PipelineError::ProcessingFailed(
            "resampler expects mono input".into(),
        ));
    }

    let ratio = target_rate as f64 / buffer.sample_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f64>::new(ratio, 2.0, params, CHUNK_SIZE, 1)
        .map_err(|e| PipelineError::ProcessingFailed(format!("resampler init: {e}")))?;

    let mut output = Vec::with_capacity((buffer.samples.len() as f64 * ratio) as usize + 1024);
    let mut chunks = buffer.samples.chunks_exact(CHUNK_SIZE);

    for chunk in chunks.by_ref() {
        let waves_in = vec![chunk.to_vec()];
        let frames = resampler
            .process(&waves_in, None)
            .map_err(|e| PipelineError::ProcessingFailed(format!("resample: {e}")))?;
        output.extend_from_slice(&frames[0]);
    }

    let remainder = chunks.remainder();
    if !remainder.is_empty() {
        let waves_in = vec![remainder.to_vec()];
        let frames = resampler
            .process_partial(Some(&waves_in), None)
            .map_err(|e| PipelineError::ProcessingFailed(format!("resample tail: {e}")))?;
        output.extend_from_slice(&frames[0]);
    }

    // Drain the resampler's internal delay
    let tail = resampler
        .process_partial::<Vec<f64>>(None, None)
        .map_err(|e| PipelineError::ProcessingFailed(format!("resample flush: {e}")))?;
    output.extend_from_slice(&tail[0]);

    log::debug!(
        "resampled {} Hz -> {} Hz ({} -> {} frames)",
        buffer.sample_rate,
        target_rate,
        buffer.samples.len(),
        output.len()
    );

    Ok(AudioBuffer::from_mono(output, target_rate))
}
