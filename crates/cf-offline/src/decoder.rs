//! Audio decoding
//!
//! Symphonia-backed decoding of any supported container to normalised
//! f64 PCM. Decode errors inside a stream are skipped; packet-level
//! I/O errors end the stream.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use cf_core::AudioBuffer;

use crate::error::{PipelineError, PipelineResult};

/// Basic stream information from a probe
#[derive(Debug, Clone)]
pub struct AudioFileInfo {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: usize,
    /// Bits per sample, when the codec reports it
    pub bit_depth: Option<u32>,
    /// Duration in seconds, when the container reports frame counts
    pub duration: Option<f64>,
}

/// Append one decoded symphonia buffer as interleaved f64
macro_rules! append_planes {
    ($buf:expr, $channels:expr, $out:expr, $convert:expr) => {{
        let planes = $buf.planes();
        let frames = $buf.frames();
        let available = $channels.min(planes.planes().len());
        for frame in 0..frames {
            for ch in 0..available {
                $out.push($convert(planes.planes()[ch][frame]));
            }
        }
    }};
}

/// Decode a whole file to an [`AudioBuffer`]
pub fn decode(path: &Path) -> PipelineResult<AudioBuffer> {
    let (mut format, track_id, sample_rate, channels) = open(path)?;

    let codec_params = format
        .tracks()
        .iter()
        .find(|t| t.id == track_id)
        .map(|t| t.codec_params.clone())
        .ok_or_else(|| PipelineError::AnalysisFailed("audio track disappeared".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| PipelineError::AnalysisFailed(format!("decoder init: {e}")))?;

    let mut samples: Vec<f64> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                return Err(PipelineError::AnalysisFailed(format!("packet read: {e}")));
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => append_samples(&decoded, channels, &mut samples),
            // Bad packets are skipped, not fatal
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => {
                return Err(PipelineError::AnalysisFailed(format!("decode: {e}")));
            }
        }
    }

    Ok(AudioBuffer {
        samples,
        channels,
        sample_rate,
    })
}

/// Probe a file without decoding it
pub fn probe(path: &Path) -> PipelineResult<AudioFileInfo> {
    let (format, track_id, sample_rate, channels) = open(path)?;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.id == track_id)
        .ok_or_else(|| PipelineError::AnalysisFailed("audio track disappeared".into()))?;

    let duration = track
        .codec_params
        .n_frames
        .map(|frames| frames as f64 / sample_rate as f64);

    Ok(AudioFileInfo {
        sample_rate,
        channels,
        bit_depth: track.codec_params.bits_per_sample,
        duration,
    })
}

type OpenedFormat = (
    Box<dyn symphonia::core::formats::FormatReader>,
    u32,
    u32,
    usize,
);

fn open(path: &Path) -> PipelineResult<OpenedFormat> {
    let file = File::open(path)
        .map_err(|e| PipelineError::AnalysisFailed(format!("open {}: {e}", path.display())))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| PipelineError::AnalysisFailed(format!("probe: {e}")))?;

    let format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| PipelineError::AnalysisFailed("no audio track found".into()))?;

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);

    Ok((format, track_id, sample_rate, channels))
}

fn append_samples(decoded: &AudioBufferRef, channels: usize, out: &mut Vec<f64>) {
    match decoded {
        AudioBufferRef::F32(buf) => append_planes!(buf, channels, out, |s: f32| s as f64),
        AudioBufferRef::F64(buf) => append_planes!(buf, channels, out, |s: f64| s),
        AudioBufferRef::S8(buf) => {
            append_planes!(buf, channels, out, |s: i8| s as f64 / 128.0)
        }
        AudioBufferRef::S16(buf) => {
            append_planes!(buf, channels, out, |s: i16| s as f64 / 32768.0)
        }
        AudioBufferRef::S24(buf) => {
            append_planes!(buf, channels, out, |s: symphonia::core::sample::i24| {
                s.inner() as f64 / 8388608.0
            })
        }
        AudioBufferRef::S32(buf) => {
            append_planes!(buf, channels, out, |s: i32| s as f64 / 2147483648.0)
        }
        AudioBufferRef::U8(buf) => {
            append_planes!(buf, channels, out, |s: u8| (s as f64 - 128.0) / 128.0)
        }
        AudioBufferRef::U16(buf) => {
            append_planes!(buf, channels, out, |s: u16| (s as f64 - 32768.0) / 32768.0)
        }
        AudioBufferRef::U24(buf) => {
            append_planes!(buf, channels, out, |s: symphonia::core::sample::u24| {
                (s.inner() as f64 - 8388608.0) / 8388608.0
            })
        }
        AudioBufferRef::U32(buf) => {
            append_planes!(buf, channels, out, |s: u32| {
                (s as f64 - 2147483648.0) / 2147483648.0
            })
        }
    }
}
