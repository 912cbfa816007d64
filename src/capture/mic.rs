//! Microphone capture over cpal, emitting interleaved s16le PCM bytes.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use tracing::debug;

use super::source::{CaptureFormat, CaptureSource};

const DESIRED_SAMPLE_RATE: u32 = 16_000;

pub struct MicSource {
    stream: Option<cpal::Stream>,
    shared: Arc<SharedBuffer>,
    format: CaptureFormat,
}

struct SharedBuffer {
    bytes: Mutex<Vec<u8>>,
    error: Mutex<Option<String>>,
}

impl MicSource {
    pub fn new() -> Self {
        Self {
            stream: None,
            shared: Arc::new(SharedBuffer {
                bytes: Mutex::new(Vec::new()),
                error: Mutex::new(None),
            }),
            format: CaptureFormat {
                sample_rate: DESIRED_SAMPLE_RATE,
                channels: 1,
            },
        }
    }

    fn take_bytes(&self) -> Vec<u8> {
        let mut buffer = self
            .shared
            .bytes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *buffer)
    }
}

impl Default for MicSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSource for MicSource {
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("No default input device available"))?;
        let supported_configs = device
            .supported_input_configs()
            .context("Failed to query device capabilities")?;

        // Prefer mono at 16 kHz, then anything at 16 kHz, then whatever the
        // device offers.
        let desired_rate = cpal::SampleRate(DESIRED_SAMPLE_RATE);
        let mut mono_exact = None;
        let mut any_exact = None;
        let mut mono_fallback = None;
        let mut any_fallback = None;
        for config in supported_configs {
            let supports_desired =
                config.min_sample_rate() <= desired_rate && config.max_sample_rate() >= desired_rate;

            if config.channels() == 1 && supports_desired && mono_exact.is_none() {
                mono_exact = Some(config.with_sample_rate(desired_rate));
            }
            if supports_desired && any_exact.is_none() {
                any_exact = Some(config.with_sample_rate(desired_rate));
            }
            if config.channels() == 1 && mono_fallback.is_none() {
                mono_fallback = Some(config.with_max_sample_rate());
            }
            if any_fallback.is_none() {
                any_fallback = Some(config.with_max_sample_rate());
            }
        }

        let supported = mono_exact
            .or(any_exact)
            .or(mono_fallback)
            .or(any_fallback)
            .ok_or_else(|| anyhow!("No supported capture configuration available"))?;
        let sample_format = supported.sample_format();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        self.format = CaptureFormat {
            sample_rate,
            channels: config.channels,
        };

        {
            let mut buffer = self
                .shared
                .bytes
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            buffer.clear();
        }

        let stream = build_input_stream(sample_format, &device, &config, Arc::clone(&self.shared))?;
        stream.play().context("Failed to start audio stream")?;

        debug!(
            "Microphone capturing at {} Hz, {} channel(s)",
            sample_rate, config.channels
        );

        self.stream = Some(stream);
        Ok(())
    }

    fn drain(&mut self) -> Vec<u8> {
        self.take_bytes()
    }

    fn stop(&mut self) -> Result<Vec<u8>> {
        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
        let bytes = self.take_bytes();
        let error = {
            let mut guard = self
                .shared
                .error
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.take()
        };
        if let Some(message) = error {
            return Err(anyhow!("Capture stream reported: {message}"));
        }
        Ok(bytes)
    }

    fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    fn format(&self) -> CaptureFormat {
        self.format
    }
}

fn build_input_stream(
    sample_format: cpal::SampleFormat,
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: Arc<SharedBuffer>,
) -> Result<cpal::Stream> {
    let stream = match sample_format {
        cpal::SampleFormat::F32 => typed_input_stream::<f32>(device, config, shared),
        cpal::SampleFormat::I16 => typed_input_stream::<i16>(device, config, shared),
        cpal::SampleFormat::U16 => typed_input_stream::<u16>(device, config, shared),
        cpal::SampleFormat::I8 => typed_input_stream::<i8>(device, config, shared),
        cpal::SampleFormat::U8 => typed_input_stream::<u8>(device, config, shared),
        other => {
            return Err(anyhow!("Unsupported sample format: {other:?}"));
        }
    }
    .context("Failed to build input stream")?;

    Ok(stream)
}

fn typed_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: Arc<SharedBuffer>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let data_shared = Arc::clone(&shared);
    device.build_input_stream(
        config,
        move |data: &[T], _| on_audio_data(data, &data_shared),
        move |err| capture_error(err, &shared),
        None,
    )
}

fn on_audio_data<T>(input: &[T], shared: &Arc<SharedBuffer>)
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let mut buffer = shared
        .bytes
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    buffer.reserve(input.len() * 2);
    for frame in input {
        let sample: i16 = i16::from_sample(*frame);
        buffer.extend_from_slice(&sample.to_le_bytes());
    }
}

fn capture_error(err: cpal::StreamError, shared: &Arc<SharedBuffer>) {
    let mut guard = shared
        .error
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = Some(err.to_string());
}
