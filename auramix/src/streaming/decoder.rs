use crate::audio_data::{Channel, Wave};
use crate::error::{AuramixError, Result};

/// Stream metadata reported by [`StreamDecoder::decode_start`].
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: Vec<Channel>,
    /// Total number of frames in the stream.
    pub total_frames: usize,
}

/// Incremental decoding of a compressed or otherwise external source.
///
/// Decoders run on the stream thread only, never on the mixing thread.
pub trait StreamDecoder: Send {
    /// Opens the stream and reports its layout.
    fn decode_start(&mut self) -> Result<StreamInfo>;

    /// Decodes frames starting at `start` into `target`, up to `target.size()`
    /// frames, and returns how many were written. Anything past the end of
    /// the stream is written as silence.
    ///
    /// `start` does not have to follow the previous call; a decoder must be
    /// able to jump backwards as well as forwards.
    fn decode_some(&mut self, target: &mut Wave, start: usize) -> Result<usize>;
}

/// Streams out of a [`Wave`] that is already in memory.
pub struct WaveDecoder {
    wave: Wave,
}

impl WaveDecoder {
    pub fn new(wave: Wave) -> Self {
        Self { wave }
    }

    pub fn into_inner(self) -> Wave {
        self.wave
    }
}

impl StreamDecoder for WaveDecoder {
    fn decode_start(&mut self) -> Result<StreamInfo> {
        if self.wave.channel_count() == 0 || self.wave.sample_rate() == 0 {
            return Err(AuramixError::Stream(
                "Wave has no channels or no sample rate".to_string(),
            ));
        }
        Ok(StreamInfo {
            sample_rate: self.wave.sample_rate(),
            channels: self.wave.channels().to_vec(),
            total_frames: self.wave.size(),
        })
    }

    fn decode_some(&mut self, target: &mut Wave, start: usize) -> Result<usize> {
        let channels = self.wave.channel_count();
        if target.channel_count() != channels {
            return Err(AuramixError::Stream(format!(
                "Target has {} channels, stream has {}",
                target.channel_count(),
                channels
            )));
        }

        let frames = target.size().min(self.wave.size().saturating_sub(start));
        let dst = target.samples_mut();
        if frames > 0 {
            let src = &self.wave.samples()[start * channels..(start + frames) * channels];
            dst[..frames * channels].copy_from_slice(src);
        }
        dst[frames * channels..].fill(0.0);
        Ok(frames)
    }
}

/// Advertises more frames than the wrapped wave holds, like a truncated file.
#[cfg(test)]
pub(crate) struct TruncatedDecoder {
    pub inner: WaveDecoder,
    pub advertised: usize,
}

#[cfg(test)]
impl StreamDecoder for TruncatedDecoder {
    fn decode_start(&mut self) -> Result<StreamInfo> {
        let info = self.inner.decode_start()?;
        Ok(StreamInfo {
            total_frames: self.advertised,
            ..info
        })
    }

    fn decode_some(&mut self, target: &mut Wave, start: usize) -> Result<usize> {
        self.inner.decode_some(target, start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize) -> Wave {
        Wave::from_samples((0..frames).map(|i| i as f32).collect(), 1000, vec![Channel::Mono])
            .unwrap()
    }

    #[test]
    fn test_wave_decoder_info() {
        let mut decoder = WaveDecoder::new(ramp(10));
        let info = decoder.decode_start().unwrap();
        assert_eq!(info.total_frames, 10);
        assert_eq!(info.sample_rate, 1000);
        assert_eq!(info.channels, vec![Channel::Mono]);
    }

    #[test]
    fn test_wave_decoder_random_access() {
        let mut decoder = WaveDecoder::new(ramp(10));
        let mut target = Wave::new(4, 1000, vec![Channel::Mono]);

        assert_eq!(decoder.decode_some(&mut target, 6).unwrap(), 4);
        assert_eq!(target.samples(), &[6.0, 7.0, 8.0, 9.0]);

        assert_eq!(decoder.decode_some(&mut target, 1).unwrap(), 4);
        assert_eq!(target.samples(), &[1.0, 2.0, 3.0, 4.0]);

        // past the end is zero filled
        assert_eq!(decoder.decode_some(&mut target, 8).unwrap(), 2);
        assert_eq!(target.samples(), &[8.0, 9.0, 0.0, 0.0]);
        assert_eq!(decoder.decode_some(&mut target, 20).unwrap(), 0);
        assert_eq!(target.samples(), &[0.0; 4]);
    }

    #[test]
    fn test_wave_decoder_rejects_layout_mismatch() {
        let mut decoder = WaveDecoder::new(ramp(10));
        let mut target = Wave::new(4, 1000, Channel::layout_for_count(2));
        assert!(decoder.decode_some(&mut target, 0).is_err());
    }
}
