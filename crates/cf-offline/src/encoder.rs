//! WAV encoding with atomic in-place writes
//!
//! Output is written to a sibling temporary file and moved into place
//! with a single rename, so a reader never observes a half-written
//! artifact. On failure the temporary file stays on disk for diagnosis.

use std::path::{Path, PathBuf};

use cf_core::AudioBuffer;

use crate::error::{PipelineError, PipelineResult};

/// Write a buffer as WAV at the given bit depth (16, 24 or 32-float)
pub fn write_wav(buffer: &AudioBuffer, path: &Path, bit_depth: u16) -> PipelineResult<()> {
    let spec = hound::WavSpec {
        channels: buffer.channels as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample: bit_depth,
        sample_format: if bit_depth == 32 {
            hound::SampleFormat::Float
        } else {
            hound::SampleFormat::Int
        },
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| PipelineError::ProcessingFailed(format!("wav create: {e}")))?;

    match bit_depth {
        16 => {
            for &sample in &buffer.samples {
                writer
                    .write_sample((sample.clamp(-1.0, 1.0) * 32767.0) as i16)
                    .map_err(|e| PipelineError::ProcessingFailed(format!("wav write: {e}")))?;
            }
        }
        24 => {
            for &sample in &buffer.samples {
                writer
                    .write_sample((sample.clamp(-1.0, 1.0) * 8388607.0) as i32)
                    .map_err(|e| PipelineError::ProcessingFailed(format!("wav write: {e}")))?;
            }
        }
        32 => {
            for &sample in &buffer.samples {
                writer
                    .write_sample(sample as f32)
                    .map_err(|e| PipelineError::ProcessingFailed(format!("wav write: {e}")))?;
            }
        }
        other => {
            return Err(PipelineError::ProcessingFailed(format!(
                "unsupported bit depth: {other}"
            )));
        }
    }

    writer
        .finalize()
        .map_err(|e| PipelineError::ProcessingFailed(format!("wav finalize: {e}")))
}

/// Write a buffer to `path` via a temporary file plus atomic rename
pub fn write_atomic(buffer: &AudioBuffer, path: &Path, bit_depth: u16) -> PipelineResult<()> {
    let tmp = temp_path(path);
    write_wav(buffer, &tmp, bit_depth)?;
    std::fs::rename(&tmp, path)
        .map_err(|e| PipelineError::ProcessingFailed(format!("rename into place: {e}")))?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    path.with_file_name(format!(".{file_name}.tmp"))
}
