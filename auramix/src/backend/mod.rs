//! Platform audio output.
//!
//! The mixer only talks to an [`AudioBackend`]; [`cpal_backend`] provides the
//! real device implementation and [`CaptureBackend`] an in-memory one.

mod capture;
pub mod cpal_backend;

pub use capture::CaptureBackend;

use crate::audio_data::Channel;

/// Sink for mixed periods.
///
/// Both calls happen on the mixing thread once per period and must not block.
pub trait AudioBackend: Send {
    /// How many frames of `channels` channels can be posted right now.
    fn writable_frame_count(&mut self, channels: usize) -> usize;

    /// Hands over `frames` interleaved frames. `data.len() >= frames * channels`.
    fn post_data(&mut self, data: &[f32], frames: usize, channels: usize);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    F32,
    I16,
    U16,
}

/// An output device and its channel layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub sample_rate: u32,
    pub format: SampleFormat,
    /// Drives the headphone panning law instead of the speaker ones.
    pub headphones: bool,
    pub channels: Vec<Channel>,
}

impl Device {
    /// A device description not tied to any hardware, for offline mixing.
    pub fn virtual_device(sample_rate: u32, channels: Vec<Channel>, headphones: bool) -> Self {
        Self {
            id: "virtual".to_string(),
            name: "Virtual output".to_string(),
            sample_rate,
            format: SampleFormat::F32,
            headphones,
            channels,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn find_channel(&self, channel: Channel) -> Option<usize> {
        crate::audio_data::find_channel(&self.channels, channel)
    }
}
