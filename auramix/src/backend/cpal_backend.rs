//! Output through the system audio API via cpal.
//!
//! The cpal callback runs on a thread we do not control, so it never mixes:
//! it drains a lock-free ring that the mixing thread fills through
//! [`RingBufferSink`].

use super::{AudioBackend, Device, SampleFormat};
use crate::audio_data::Channel;
use crate::error::{AuramixError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Lists every output device of the default host.
pub fn enumerate_devices() -> Result<Vec<Device>> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let devices = host
        .output_devices()
        .map_err(|e| AuramixError::AudioDevice(format!("Failed to enumerate devices: {}", e)))?;

    let mut result = Vec::new();
    for device in devices {
        match describe(&device) {
            Ok(described) => result.push(described),
            Err(e) => log::debug!("Skipping output device: {}", e),
        }
    }

    // default device first
    if let Some(name) = default_name {
        if let Some(index) = result.iter().position(|d| d.name == name) {
            let default = result.remove(index);
            result.insert(0, default);
        }
    }
    Ok(result)
}

/// Describes the default output device.
pub fn default_device() -> Result<Device> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or_else(|| {
        AuramixError::AudioDevice("No default output device available".to_string())
    })?;
    describe(&device)
}

fn describe(device: &cpal::Device) -> Result<Device> {
    let name = device
        .name()
        .map_err(|e| AuramixError::AudioDevice(format!("Failed to get device name: {}", e)))?;
    let config = device.default_output_config().map_err(|e| {
        AuramixError::AudioDevice(format!("Failed to get default config for {}: {}", name, e))
    })?;

    let format = match config.sample_format() {
        cpal::SampleFormat::F32 => SampleFormat::F32,
        cpal::SampleFormat::I16 => SampleFormat::I16,
        cpal::SampleFormat::U16 => SampleFormat::U16,
        other => {
            return Err(AuramixError::AudioFormat(format!(
                "Unsupported sample format {:?} on {}",
                other, name
            )));
        }
    };

    Ok(Device {
        id: name.clone(),
        headphones: looks_like_headphones(&name),
        sample_rate: config.sample_rate().0,
        format,
        channels: Channel::layout_for_count(config.channels() as usize),
        name,
    })
}

/// cpal does not report the form factor, so guess it from the name.
pub(crate) fn looks_like_headphones(name: &str) -> bool {
    let name = name.to_lowercase();
    ["headphone", "headset", "earphone", "earbud", "airpods"]
        .iter()
        .any(|hint| name.contains(hint))
}

/// The mixing thread's end of the device ring.
pub struct RingBufferSink {
    producer: HeapProd<f32>,
}

impl AudioBackend for RingBufferSink {
    fn writable_frame_count(&mut self, channels: usize) -> usize {
        if channels == 0 {
            return 0;
        }
        self.producer.vacant_len() / channels
    }

    fn post_data(&mut self, data: &[f32], frames: usize, channels: usize) {
        let samples = &data[..frames * channels];
        let pushed = self.producer.push_slice(samples);
        if pushed < samples.len() {
            log::trace!("Ring full, dropped {} samples", samples.len() - pushed);
        }
    }
}

/// An open cpal output stream. Dropping it stops the device.
pub struct CpalOutput {
    stream: cpal::Stream,
    device: Device,
}

impl CpalOutput {
    /// Opens the default device at its native rate and channel count.
    ///
    /// The returned sink accepts up to `period_size * ring_buffer_periods`
    /// frames ahead of the device.
    pub fn open_default(
        period_size: usize,
        ring_buffer_periods: usize,
    ) -> Result<(Self, RingBufferSink)> {
        let host = cpal::default_host();
        let cpal_device = host.default_output_device().ok_or_else(|| {
            AuramixError::AudioDevice("No default output device available".to_string())
        })?;
        let device = describe(&cpal_device)?;

        let config = cpal::StreamConfig {
            channels: device.channel_count() as u16,
            sample_rate: cpal::SampleRate(device.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let capacity = period_size.max(1) * ring_buffer_periods.max(1) * device.channel_count();
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();

        let stream = match device.format {
            SampleFormat::F32 => create_stream::<f32>(&cpal_device, &config, consumer)?,
            SampleFormat::I16 => create_stream::<i16>(&cpal_device, &config, consumer)?,
            SampleFormat::U16 => create_stream::<u16>(&cpal_device, &config, consumer)?,
        };

        stream
            .play()
            .map_err(|e| AuramixError::AudioDevice(format!("Failed to start stream: {}", e)))?;

        log::info!(
            "Opened output device {}: {} Hz, {} channels{}",
            device.name,
            device.sample_rate,
            device.channel_count(),
            if device.headphones { " (headphones)" } else { "" }
        );

        Ok((Self { stream, device }, RingBufferSink { producer }))
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn pause(&self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| AuramixError::AudioDevice(format!("Failed to pause stream: {}", e)))
    }
}

fn create_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: HeapCons<f32>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                // silence when the mixer falls behind
                for sample in data.iter_mut() {
                    *sample = T::from_sample(consumer.try_pop().unwrap_or(0.0));
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AuramixError::AudioDevice(format!("Failed to build stream: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headphone_guess() {
        assert!(looks_like_headphones("USB Headset"));
        assert!(looks_like_headphones("Bob's AirPods Pro"));
        assert!(!looks_like_headphones("Built-in Speakers"));
    }

    #[test]
    fn test_ring_sink_backpressure() {
        let (producer, mut consumer) = HeapRb::<f32>::new(8).split();
        let mut sink = RingBufferSink { producer };
        assert_eq!(sink.writable_frame_count(2), 4);

        sink.post_data(&[1.0; 6], 3, 2);
        assert_eq!(sink.writable_frame_count(2), 1);

        let mut out = [0.0; 6];
        assert_eq!(consumer.pop_slice(&mut out), 6);
        assert_eq!(sink.writable_frame_count(2), 4);
    }
}
