// Audio file decoding into a mono 16-bit PCM stream at a fixed rate.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::config::AudioConfig;
use crate::error::AudioError;

/// Decoded PCM, immutable once built. Cloning shares the sample buffer.
#[derive(Debug, Clone)]
pub struct AudioStream {
    samples: Arc<[i16]>,
    sample_rate: u32,
    block_size: usize,
}

impl AudioStream {
    pub fn new(samples: Vec<i16>, sample_rate: u32, block_size: usize) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            block_size: block_size.max(1),
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Shared handle to the sample buffer for the playback thread.
    pub fn shared_samples(&self) -> Arc<[i16]> {
        Arc::clone(&self.samples)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Number of blocks playback will produce, the last one possibly partial.
    pub fn block_count(&self) -> usize {
        self.samples.len().div_ceil(self.block_size)
    }
}

pub struct AudioDecoder {
    config: AudioConfig,
}

impl AudioDecoder {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    /// Decode `path`, downmix to mono and resample to the target rate.
    pub fn decode_file(&self, path: impl AsRef<Path>) -> Result<AudioStream, AudioError> {
        let path = path.as_ref();
        let (interleaved, source_rate, channels) = decode_interleaved(path)?;

        let mono = downmix_to_mono(&interleaved, channels);
        let resampled = resample_linear(&mono, source_rate, self.config.target_sample_rate);
        let samples = to_i16(&resampled);

        log::info!(
            "Decoded {}: {} ch @ {} Hz -> {} mono samples @ {} Hz",
            path.display(),
            channels,
            source_rate,
            samples.len(),
            self.config.target_sample_rate
        );

        Ok(AudioStream::new(
            samples,
            self.config.target_sample_rate,
            self.config.block_size,
        ))
    }
}

// Returns interleaved f32 samples, their sample rate and channel count
fn decode_interleaved(path: &Path) -> Result<(Vec<f32>, u32, usize), AudioError> {
    let file = File::open(path).map_err(|e| AudioError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AudioError::Decode(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(AudioError::NoTrack)?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(AudioError::UnknownSampleRate)?;
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::Decode(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                log::warn!("Error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("Error decoding packet: {}", e);
                continue;
            }
        };

        // Initialize sample buffer on first decode
        if sample_buf.is_none() {
            let spec = *decoded.spec();
            channels = spec.channels.count();
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    if samples.is_empty() {
        return Err(AudioError::Decode(format!(
            "no audio samples decoded from {}",
            path.display()
        )));
    }

    Ok((samples, sample_rate, channels.max(1)))
}

/// Average every frame of `interleaved` into one sample.
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear-interpolation resampler; good enough for an amplitude envelope.
pub fn resample_linear(samples: &[f32], from_sr: u32, to_sr: u32) -> Vec<f32> {
    if from_sr == to_sr || from_sr == 0 || to_sr == 0 {
        return samples.to_vec();
    }
    let ratio = from_sr as f64 / to_sr as f64;
    let output_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };
        output.push(sample);
    }

    output
}

/// Convert normalised floats to saturated signed 16-bit samples.
pub fn to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)
        .collect()
}
