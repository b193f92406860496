//! The sample source capability shared by in-memory waves and live streams.
//!
//! A [`Source`] is owned outside of the mixer; controllers only hold an
//! `Arc<dyn Source>`. Every method may be called from the mixing thread, so
//! implementations must answer without blocking on I/O.

use crate::audio_data::Channel;

/// Outcome of [`Source::start_seeking`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekResult {
    /// The target is outside of the source.
    Failed,
    /// The source is fetching the target in the background; poll
    /// [`Source::is_seek_complete`].
    Pending,
    /// The target can be read right away.
    Done,
}

pub trait Source: Send + Sync {
    /// Total number of frames (samples per channel).
    fn size(&self) -> usize;

    /// Duration in seconds.
    fn length(&self) -> f64 {
        let rate = self.sample_rate();
        if rate == 0 {
            return 0.0;
        }
        self.size() as f64 / rate as f64
    }

    fn channel_count(&self) -> usize;

    /// Role of the channel at `index`, `Unknown` when out of range.
    fn channel_type(&self, index: usize) -> Channel;

    fn find_channel(&self, channel: Channel) -> Option<usize> {
        (0..self.channel_count()).find(|&i| self.channel_type(i) == channel)
    }

    fn sample_rate(&self) -> u32;

    /// Copies every channel of `frame` into `out`.
    ///
    /// Returns `false` when the frame is not currently available; the caller
    /// treats it as silence.
    fn read_frame(&self, frame: usize, out: &mut [f32]) -> bool;

    /// Requests that `target` become readable.
    fn start_seeking(&self, target: usize) -> SeekResult {
        if target < self.size() {
            SeekResult::Done
        } else {
            SeekResult::Failed
        }
    }

    fn is_seeking(&self) -> bool {
        false
    }

    fn is_seek_complete(&self) -> bool {
        true
    }

    fn seek_target(&self) -> usize {
        0
    }

    /// Acknowledges a completed seek; the source may recycle the seek window.
    fn seeking_done(&self) {}
}
