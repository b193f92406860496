use super::AudioBackend;
use crate::audio_data::{Channel, Wave};
use crate::error::Result;
use std::collections::VecDeque;

/// Backend that records every posted period in memory.
///
/// Writable counts can be scripted to simulate a device that is temporarily
/// full; once the script runs out, every query answers `default_writable`.
#[derive(Debug)]
pub struct CaptureBackend {
    default_writable: usize,
    script: VecDeque<usize>,
    data: Vec<f32>,
    channels: usize,
    posts: usize,
}

impl CaptureBackend {
    pub fn new(default_writable: usize) -> Self {
        Self {
            default_writable,
            script: VecDeque::new(),
            data: Vec::new(),
            channels: 0,
            posts: 0,
        }
    }

    /// Answers the next `counts.len()` writable queries with `counts`.
    pub fn script_writable(&mut self, counts: impl IntoIterator<Item = usize>) {
        self.script.extend(counts);
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.data.len() / self.channels
        }
    }

    /// Number of `post_data` calls received.
    pub fn posts(&self) -> usize {
        self.posts
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.posts = 0;
    }

    /// Turns the recording into a wave with the given layout.
    pub fn into_wave(self, sample_rate: u32, channels: Vec<Channel>) -> Result<Wave> {
        Wave::from_samples(self.data, sample_rate, channels)
    }
}

impl AudioBackend for CaptureBackend {
    fn writable_frame_count(&mut self, _channels: usize) -> usize {
        self.script.pop_front().unwrap_or(self.default_writable)
    }

    fn post_data(&mut self, data: &[f32], frames: usize, channels: usize) {
        self.channels = channels;
        self.data.extend_from_slice(&data[..frames * channels]);
        self.posts += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_writable() {
        let mut backend = CaptureBackend::new(64);
        backend.script_writable([0, 10]);
        assert_eq!(backend.writable_frame_count(2), 0);
        assert_eq!(backend.writable_frame_count(2), 10);
        assert_eq!(backend.writable_frame_count(2), 64);
    }

    #[test]
    fn test_records_posts() {
        let mut backend = CaptureBackend::new(64);
        backend.post_data(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 2);
        assert_eq!(backend.frames(), 2);
        assert_eq!(backend.posts(), 1);
        let wave = backend.into_wave(48000, Channel::layout_for_count(2)).unwrap();
        assert_eq!(wave.frame(1), &[3.0, 4.0]);
    }
}
