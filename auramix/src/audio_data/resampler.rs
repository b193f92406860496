use crate::error::{AuramixError, Result};
use rubato::{FftFixedIn, Resampler};

/// Offline whole-buffer resampler built on rubato's FFT resampler.
pub struct AudioResampler {
    source_sample_rate: u32,
    target_sample_rate: u32,
    channels: usize,
    chunk_size: usize,
}

impl AudioResampler {
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: usize,
        chunk_size: Option<usize>,
    ) -> Result<Self> {
        if source_sample_rate == 0 || target_sample_rate == 0 {
            return Err(AuramixError::AudioFormat(
                "Sample rates must be greater than 0".to_string(),
            ));
        }

        if channels == 0 {
            return Err(AuramixError::AudioFormat(
                "Channel count must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            source_sample_rate,
            target_sample_rate,
            channels,
            chunk_size: chunk_size.unwrap_or(1024),
        })
    }

    pub fn resample_channel(&self, channel_samples: &[f32]) -> Result<Vec<f32>> {
        if self.source_sample_rate == self.target_sample_rate {
            return Ok(channel_samples.to_vec());
        }

        let mut resampler = FftFixedIn::<f32>::new(
            self.source_sample_rate as usize,
            self.target_sample_rate as usize,
            self.chunk_size,
            2, // sub_chunks
            1,
        )
        .map_err(|e| AuramixError::AudioLoading(format!("Failed to create resampler: {}", e)))?;

        let mut output = Vec::new();
        let mut input_index = 0;

        while input_index < channel_samples.len() {
            let take = (channel_samples.len() - input_index).min(self.chunk_size);

            // the last chunk is zero padded up to the fixed input size
            let mut chunk = vec![0.0f32; self.chunk_size];
            chunk[..take].copy_from_slice(&channel_samples[input_index..input_index + take]);

            let waves_out = resampler
                .process(&[chunk], None)
                .map_err(|e| AuramixError::AudioLoading(format!("Resampling error: {}", e)))?;

            if let Some(first) = waves_out.first() {
                output.extend_from_slice(first);
            }

            input_index += take;
        }

        Ok(output)
    }

    pub fn resample_interleaved(&self, interleaved: &[f32]) -> Result<Vec<f32>> {
        if self.source_sample_rate == self.target_sample_rate {
            return Ok(interleaved.to_vec());
        }

        let mut resampled = Vec::with_capacity(self.channels);
        for ch in 0..self.channels {
            let planar: Vec<f32> = interleaved
                .chunks(self.channels)
                .map(|frame| frame.get(ch).copied().unwrap_or(0.0))
                .collect();
            resampled.push(self.resample_channel(&planar)?);
        }

        let frames = resampled.iter().map(Vec::len).min().unwrap_or(0);
        let mut output = Vec::with_capacity(frames * self.channels);
        for frame in 0..frames {
            for channel in &resampled {
                output.push(channel[frame]);
            }
        }

        Ok(output)
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }

    pub fn resample_ratio(&self) -> f64 {
        self.target_sample_rate as f64 / self.source_sample_rate as f64
    }
}
