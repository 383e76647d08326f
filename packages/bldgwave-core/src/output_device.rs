// Playback of an `AudioStream` on a cpal output device.
//
// The device callback drives a `BlockFeeder`; everything it touches is
// preallocated before the stream starts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};

use crate::amplitude_stream::{AmplitudeQueue, BlockFeeder, PlaybackState};
use crate::audio_decoder::AudioStream;
use crate::config::AudioConfig;
use crate::error::AudioError;

/// Names of the output devices on the default host.
pub fn list_output_devices() -> Vec<String> {
    let host = cpal::default_host();
    match host.output_devices() {
        Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
        Err(e) => {
            log::warn!("Failed to enumerate output devices: {}", e);
            Vec::new()
        }
    }
}

fn select_device(name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match name {
        Some(wanted) => host
            .output_devices()
            .map_err(|e| AudioError::Config(e.to_string()))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| AudioError::DeviceNotFound(wanted.to_string())),
        None => host.default_output_device().ok_or(AudioError::NoDevice),
    }
}

// Preference order for the device sample format
fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::F32 => Some(0),
        SampleFormat::I16 => Some(1),
        SampleFormat::U16 => Some(2),
        _ => None,
    }
}

fn get_output_config(
    device: &cpal::Device,
    sample_rate: u32,
) -> Result<(SampleFormat, u16), AudioError> {
    let supported = device
        .supported_output_configs()
        .map_err(|e| AudioError::Config(e.to_string()))?
        .filter(|c| sample_rate >= c.min_sample_rate().0 && sample_rate <= c.max_sample_rate().0)
        .filter_map(|c| format_rank(c.sample_format()).map(|rank| (rank, c)))
        .min_by_key(|(rank, c)| (*rank, c.channels()))
        .map(|(_, c)| c)
        .ok_or_else(|| {
            AudioError::Config(format!("no output configuration supports {} Hz", sample_rate))
        })?;

    Ok((supported.sample_format(), supported.channels()))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut feeder: BlockFeeder,
    block_size: usize,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<i16>,
{
    let channels = config.channels.max(1) as usize;
    let mut scratch = vec![0i16; block_size.max(1)];

    device.build_output_stream(
        config,
        move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            let mut offset = 0;
            while offset < frames {
                let n = (frames - offset).min(scratch.len());
                feeder.fill(&mut scratch[..n]);
                let out = &mut data[offset * channels..(offset + n) * channels];
                // Mono source goes to every channel
                for (frame, &sample) in out.chunks_mut(channels).zip(scratch.iter()) {
                    frame.fill(T::from_sample(sample));
                }
                offset += n;
            }
        },
        move |err| {
            log::error!("Audio output stream error: {}", err);
        },
        None,
    )
}

/// Owns the running output stream. Dropping it stops playback.
pub struct PlaybackHandle {
    _stream: Stream,
    state: Arc<PlaybackState>,
    duration: Duration,
}

impl PlaybackHandle {
    pub fn stop(&self) {
        self.state.request_stop();
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    /// Length of the audio being played.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Block until the last block has been fed or `timeout` elapses.
    /// Returns whether playback finished.
    pub fn wait_until_finished(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.state.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        true
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.state.finish();
    }
}

/// Feeds audio to the output device and publishes per-block amplitudes.
pub struct AmplitudeStreamer {
    config: AudioConfig,
    queue: Arc<AmplitudeQueue>,
    state: Arc<PlaybackState>,
}

impl AmplitudeStreamer {
    pub fn new(config: AudioConfig) -> Self {
        let queue = Arc::new(AmplitudeQueue::new(config.queue_capacity));
        Self {
            config,
            queue,
            state: Arc::new(PlaybackState::new()),
        }
    }

    /// Consumer end of the amplitude channel.
    pub fn queue(&self) -> Arc<AmplitudeQueue> {
        Arc::clone(&self.queue)
    }

    pub fn state(&self) -> Arc<PlaybackState> {
        Arc::clone(&self.state)
    }

    /// Idle -> Playing. A device failure leaves the state Finished so the
    /// animator winds down on its own.
    pub fn start(&self, stream: &AudioStream) -> Result<PlaybackHandle, AudioError> {
        if !self.state.start() {
            return Err(AudioError::AlreadyStarted);
        }
        self.open_stream(stream).map_err(|e| {
            self.state.finish();
            e
        })
    }

    fn open_stream(&self, stream: &AudioStream) -> Result<PlaybackHandle, AudioError> {
        let device = select_device(self.config.device.as_deref())?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using audio device: {}", device_name);

        let (sample_format, channels) = get_output_config(&device, stream.sample_rate())?;
        let block_size = stream.block_size();
        let fixed = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(stream.sample_rate()),
            buffer_size: BufferSize::Fixed(block_size as u32),
        };

        log::info!(
            "Audio config: {} channels, {}Hz, {:?}, {} frames per block",
            channels,
            stream.sample_rate(),
            sample_format,
            block_size
        );

        let build = |config: &StreamConfig| {
            let feeder = BlockFeeder::new(stream, self.queue(), self.state());
            match sample_format {
                SampleFormat::I16 => build_stream::<i16>(&device, config, feeder, block_size),
                SampleFormat::U16 => build_stream::<u16>(&device, config, feeder, block_size),
                _ => build_stream::<f32>(&device, config, feeder, block_size),
            }
        };

        let output = match build(&fixed) {
            Ok(s) => s,
            Err(e) => {
                // Not every backend accepts a fixed buffer size
                log::warn!("Fixed buffer of {} frames rejected ({}), using device default", block_size, e);
                let flexible = StreamConfig {
                    buffer_size: BufferSize::Default,
                    ..fixed.clone()
                };
                build(&flexible).map_err(|e| AudioError::StreamBuild(e.to_string()))?
            }
        };

        output
            .play()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))?;
        log::info!("Audio stream started ({:.1}s of audio)", stream.duration().as_secs_f64());

        Ok(PlaybackHandle {
            _stream: output,
            state: self.state(),
            duration: stream.duration(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_output_is_preferred() {
        assert!(format_rank(SampleFormat::F32) < format_rank(SampleFormat::I16));
        assert!(format_rank(SampleFormat::I16) < format_rank(SampleFormat::U16));
        assert_eq!(format_rank(SampleFormat::U8), None);
    }

    #[test]
    fn second_start_is_rejected() {
        let streamer = AmplitudeStreamer::new(AudioConfig::default());
        // Simulate a stream that is already running
        assert!(streamer.state().start());
        let stream = AudioStream::new(vec![0; 10], 44_100, 4);
        assert!(matches!(streamer.start(&stream), Err(AudioError::AlreadyStarted)));
        assert_eq!(streamer.queue().capacity(), 50);
    }
}
