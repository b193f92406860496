use super::channel::{Channel, find_channel};
use super::resampler::AudioResampler;
use crate::error::{AuramixError, Result};
use crate::source::{SeekResult, Source};

/// Owned block of interleaved `f32` samples tagged with a sample rate and channel roles.
///
/// # Data Format
/// Samples are stored **INTERLEAVED**, frame by frame:
/// - Stereo: `[L0, R0, L1, R1, ...]`
/// - 5.1: `[FL0, FR0, C0, LFE0, BL0, BR0, FL1, ...]`
///
/// `samples().len() == size() * channel_count()` always holds.
///
/// A `Wave` has exactly one owner. It deliberately does not implement `Clone`;
/// use [`Wave::duplicate`] when a deep copy is really wanted, and plain moves
/// (or `std::mem::swap`) to hand the buffer over.
#[derive(Debug, Default)]
pub struct Wave {
    data: Vec<f32>,
    size: usize,
    channels: Vec<Channel>,
    sample_rate: u32,
}

impl Wave {
    /// Creates a silent wave with `size` frames.
    pub fn new(size: usize, sample_rate: u32, channels: Vec<Channel>) -> Self {
        Self {
            data: vec![0.0; size * channels.len()],
            size,
            channels,
            sample_rate,
        }
    }

    /// Wraps interleaved samples. Fails if the sample count is not a multiple
    /// of the channel count.
    pub fn from_samples(
        samples: Vec<f32>,
        sample_rate: u32,
        channels: Vec<Channel>,
    ) -> Result<Self> {
        if channels.is_empty() {
            return Err(AuramixError::AudioFormat(
                "Channel count must be greater than 0".to_string(),
            ));
        }
        if samples.len() % channels.len() != 0 {
            return Err(AuramixError::AudioFormat(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels.len()
            )));
        }

        Ok(Self {
            size: samples.len() / channels.len(),
            data: samples,
            channels,
            sample_rate,
        })
    }

    /// Deep copy of this wave.
    pub fn duplicate(&self) -> Self {
        Self {
            data: self.data.clone(),
            size: self.size,
            channels: self.channels.clone(),
            sample_rate: self.sample_rate,
        }
    }

    /// Resizes to `size` frames keeping the channel layout. Contents are zeroed.
    pub fn resize(&mut self, size: usize) {
        self.size = size;
        self.data.clear();
        self.data.resize(size * self.channels.len(), 0.0);
    }

    /// Resizes to `size` frames with a new channel layout. Contents are zeroed.
    pub fn resize_with_channels(&mut self, size: usize, channels: Vec<Channel>) {
        self.channels = channels;
        self.resize(size);
    }

    /// Copies interleaved `samples` in, keeping the channel layout.
    pub fn assign(&mut self, samples: &[f32]) -> Result<()> {
        let channels = self.channels.len();
        if channels == 0 || samples.len() % channels != 0 {
            return Err(AuramixError::AudioFormat(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }
        self.size = samples.len() / channels;
        self.data.clear();
        self.data.extend_from_slice(samples);
        Ok(())
    }

    /// Sets every sample to zero.
    pub fn clean(&mut self) {
        self.data.fill(0.0);
    }

    /// Frees the buffer and sets the size to 0. Channel layout and rate are kept.
    pub fn destroy(&mut self) {
        self.data = Vec::new();
        self.size = 0;
    }

    /// Takes the sample buffer out of the wave, leaving it empty.
    pub fn release(&mut self) -> Vec<f32> {
        self.size = 0;
        std::mem::take(&mut self.data)
    }

    pub fn get(&self, frame: usize, channel: usize) -> f32 {
        debug_assert!(channel < self.channels.len());
        self.data[frame * self.channels.len() + channel]
    }

    pub fn get_mut(&mut self, frame: usize, channel: usize) -> &mut f32 {
        debug_assert!(channel < self.channels.len());
        let channels = self.channels.len();
        &mut self.data[frame * channels + channel]
    }

    /// All channel samples of one frame.
    pub fn frame(&self, frame: usize) -> &[f32] {
        let channels = self.channels.len();
        &self.data[frame * channels..(frame + 1) * channels]
    }

    pub fn frame_mut(&mut self, frame: usize) -> &mut [f32] {
        let channels = self.channels.len();
        &mut self.data[frame * channels..(frame + 1) * channels]
    }

    pub fn frames(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.channels.len().max(1))
    }

    pub fn frames_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        let channels = self.channels.len().max(1);
        self.data.chunks_exact_mut(channels)
    }

    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Number of frames (samples per channel).
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Duration in seconds.
    pub fn length(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.size as f64 / self.sample_rate as f64
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Role of the channel at `index`, `Unknown` when out of range.
    pub fn channel_type(&self, index: usize) -> Channel {
        self.channels.get(index).copied().unwrap_or(Channel::Unknown)
    }

    pub fn find_channel(&self, channel: Channel) -> Option<usize> {
        find_channel(&self.channels, channel)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Downmixes every channel into a single Mono channel by averaging.
    pub fn to_mono(&self) -> Self {
        if self.channels.len() == 1 {
            let mut mono = self.duplicate();
            mono.channels = vec![Channel::Mono];
            return mono;
        }

        let channels = self.channels.len() as f32;
        let samples = self
            .frames()
            .map(|frame| frame.iter().sum::<f32>() / channels)
            .collect::<Vec<_>>();

        Self {
            size: samples.len(),
            data: samples,
            channels: vec![Channel::Mono],
            sample_rate: self.sample_rate,
        }
    }

    /// Offline conversion to another sample rate using rubato.
    ///
    /// Not for the mixing thread: it allocates and runs an FFT resampler over
    /// the whole buffer.
    pub fn resample(&self, target_sample_rate: u32) -> Result<Self> {
        if target_sample_rate == self.sample_rate {
            return Ok(self.duplicate());
        }

        let resampler = AudioResampler::new(
            self.sample_rate,
            target_sample_rate,
            self.channels.len(),
            Some(1024),
        )?;
        let ratio = target_sample_rate as f64 / self.sample_rate as f64;
        let expected_frames = (self.size as f64 * ratio).round() as usize;
        let mut samples = resampler.resample_interleaved(&self.data)?;
        samples.resize(expected_frames * self.channels.len(), 0.0);

        Ok(Self {
            data: samples,
            size: expected_frames,
            channels: self.channels.clone(),
            sample_rate: target_sample_rate,
        })
    }
}

impl Source for Wave {
    fn size(&self) -> usize {
        self.size
    }

    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn channel_type(&self, index: usize) -> Channel {
        Wave::channel_type(self, index)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_frame(&self, frame: usize, out: &mut [f32]) -> bool {
        if frame >= self.size {
            return false;
        }
        let src = self.frame(frame);
        let n = src.len().min(out.len());
        out[..n].copy_from_slice(&src[..n]);
        true
    }

    fn start_seeking(&self, target: usize) -> SeekResult {
        if target < self.size {
            SeekResult::Done
        } else {
            SeekResult::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_ramp(frames: usize) -> Wave {
        let samples = (0..frames * 2).map(|i| i as f32).collect();
        Wave::from_samples(samples, 48000, vec![Channel::FrontLeft, Channel::FrontRight]).unwrap()
    }

    #[test]
    fn test_layout_invariant() {
        let wave = Wave::new(100, 44100, Channel::layout_for_count(6));
        assert_eq!(wave.samples().len(), 600);
        assert_eq!(wave.size(), 100);
        assert!(Wave::from_samples(vec![0.0; 5], 48000, Channel::layout_for_count(2)).is_err());
    }

    #[test]
    fn test_duplicate_is_independent() {
        let original = stereo_ramp(4);
        let mut copy = original.duplicate();
        *copy.get_mut(0, 0) = 42.0;
        assert_eq!(original.get(0, 0), 0.0);
        assert_eq!(copy.get(0, 0), 42.0);
        assert_eq!(copy.frame(3), &[6.0, 7.0]);
    }

    #[test]
    fn test_release_and_destroy() {
        let mut wave = stereo_ramp(4);
        let data = wave.release();
        assert_eq!(data.len(), 8);
        assert!(wave.is_empty());

        let mut wave = stereo_ramp(4);
        wave.destroy();
        assert_eq!(wave.samples().len(), 0);
        assert_eq!(wave.channel_count(), 2);
    }

    #[test]
    fn test_channel_queries() {
        let wave = stereo_ramp(2);
        assert_eq!(wave.find_channel(Channel::FrontRight), Some(1));
        assert_eq!(wave.find_channel(Channel::Mono), None);
        assert_eq!(wave.channel_type(7), Channel::Unknown);
        assert!((wave.length() - 2.0 / 48000.0).abs() < 1e-12);
    }

    #[test]
    fn test_frames_mut_scales_in_place() {
        let mut wave = stereo_ramp(3);
        for frame in wave.frames_mut() {
            frame[1] = -frame[0];
        }
        assert_eq!(wave.samples(), &[0.0, -0.0, 2.0, -2.0, 4.0, -4.0]);
        assert_eq!(wave.frames().count(), 3);
    }

    #[test]
    fn test_to_mono() {
        let mono = stereo_ramp(3).to_mono();
        assert_eq!(mono.channels(), &[Channel::Mono]);
        assert_eq!(mono.samples(), &[0.5, 2.5, 4.5]);
    }

    #[test]
    fn test_source_seek_bounds() {
        let wave = stereo_ramp(10);
        assert_eq!(wave.start_seeking(9), SeekResult::Done);
        assert_eq!(wave.start_seeking(10), SeekResult::Failed);
        let mut out = [0.0; 2];
        assert!(wave.read_frame(1, &mut out));
        assert_eq!(out, [2.0, 3.0]);
        assert!(!wave.read_frame(10, &mut out));
    }

    #[test]
    fn test_resample_same_rate_duplicates() {
        let wave = stereo_ramp(8);
        let same = wave.resample(48000).unwrap();
        assert_eq!(same.samples(), wave.samples());
    }
}
