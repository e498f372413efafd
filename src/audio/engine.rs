// Audio engine - Real-time CPAL output callback
//
// The callback drives the sequencer player, mixes the tracks, taps the mix
// for capture and writes it to every output channel. Processing is f32
// internally; conversion to the device format happens on the final write
// through `FromSample<f32>`, so f32, i16 and u16 devices all work.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig,
    SupportedStreamConfig,
};

use crate::audio::dsp_utils::{flush_denormals_to_zero, soft_clip};
use crate::capture::CaptureTap;
use crate::sequencer::player::SequencerPlayer;

/// Audio host error types
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("No audio output device found")]
    NoDevice,

    #[error("Output config error: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),

    #[error("Error in stream creation: {0}")]
    Build(#[from] cpal::BuildStreamError),

    #[error("Cannot start stream: {0}")]
    Play(#[from] cpal::PlayStreamError),

    #[error("Unsupported sample format: {0:?}")]
    UnsupportedFormat(SampleFormat),
}

/// The default output device and its preferred config
pub struct OutputDevice {
    device: Device,
    config: SupportedStreamConfig,
}

impl OutputDevice {
    pub fn default_output() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
        let config = device.default_output_config()?;

        log::info!(
            "Audio device: {} ({} Hz, {} ch, {:?})",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            config.sample_rate().0,
            config.channels(),
            config.sample_format()
        );

        Ok(Self { device, config })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    pub fn channels(&self) -> usize {
        self.config.channels() as usize
    }
}

/// Everything the callback owns: the player, the tap and a mix buffer
///
/// Kept apart from the stream so block processing runs without a device.
pub struct OutputRenderer {
    player: SequencerPlayer,
    tap: CaptureTap,
    mix: Vec<f32>,
}

impl OutputRenderer {
    /// `block_size` bounds the frames processed per sequencer block
    pub fn new(player: SequencerPlayer, tap: CaptureTap, block_size: usize) -> Self {
        Self {
            player,
            tap,
            mix: vec![0.0; block_size.max(1)],
        }
    }

    /// Fill an interleaved output buffer
    ///
    /// No allocations, no I/O, no blocking locks.
    pub fn render_interleaved<T>(&mut self, data: &mut [T], channels: usize)
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = channels.max(1);
        let block_size = self.mix.len();

        for chunk in data.chunks_mut(block_size * channels) {
            let frames = chunk.len() / channels;
            let mix = &mut self.mix[..frames];

            let block_start = self.player.process_block(frames);
            self.player.render(block_start, mix);

            for sample in mix.iter_mut() {
                *sample = flush_denormals_to_zero(soft_clip(*sample));
            }
            self.tap.write(mix);

            for (frame, &value) in chunk.chunks_mut(channels).zip(mix.iter()) {
                let converted = T::from_sample(value);
                for out in frame.iter_mut() {
                    *out = converted;
                }
            }
        }
    }

    pub fn player(&self) -> &SequencerPlayer {
        &self.player
    }
}

pub struct AudioEngine {
    _stream: Stream,
    sample_rate: u32,
    healthy: Arc<AtomicBool>,
}

impl AudioEngine {
    /// Open a stream on `output` and start playing immediately
    pub fn start(output: OutputDevice, renderer: OutputRenderer) -> Result<Self, AudioError> {
        let sample_rate = output.sample_rate();
        let channels = output.channels();
        let sample_format = output.config.sample_format();
        let config: StreamConfig = output.config.into();
        let healthy = Arc::new(AtomicBool::new(true));

        let stream = match sample_format {
            SampleFormat::F32 => {
                Self::build_stream::<f32>(&output.device, &config, channels, renderer, healthy.clone())
            }
            SampleFormat::I16 => {
                Self::build_stream::<i16>(&output.device, &config, channels, renderer, healthy.clone())
            }
            SampleFormat::U16 => {
                Self::build_stream::<u16>(&output.device, &config, channels, renderer, healthy.clone())
            }
            other => return Err(AudioError::UnsupportedFormat(other)),
        }?;

        stream.play()?;
        log::info!("Audio stream started");

        Ok(Self {
            _stream: stream,
            sample_rate,
            healthy,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// False once the stream has reported an error
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Build an output stream for any device sample type
    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        channels: usize,
        mut renderer: OutputRenderer,
        healthy: Arc<AtomicBool>,
    ) -> Result<Stream, AudioError>
    where
        T: SizedSample + FromSample<f32> + Send + 'static,
    {
        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                // ========== SACRED ZONE ==========
                // No allocations, No I/O, No blocking locks
                renderer.render_interleaved(data, channels);
                // ========== SACRED ZONE END ==========
            },
            move |err| {
                // Runs outside the audio callback, so I/O is fine here
                log::error!("Audio stream error: {}", err);
                healthy.store(false, Ordering::Relaxed);
            },
            None,
        )?;

        Ok(stream)
    }
}
