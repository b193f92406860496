use crate::{
    audio_data::{AudioDataLoader, Channel, ConvertToMono, LoadOptions, Wave},
    error::{AuramixError, Result},
};
use std::fs::File;
use std::path::Path;
use symphonia::{
    core::{
        audio::{Channels, SampleBuffer},
        codecs::DecoderOptions,
        errors::Error,
        formats::{FormatOptions, FormatReader},
        io::{MediaSource, MediaSourceStream},
        meta::MetadataOptions,
        probe::Hint,
    },
    default::{get_codecs, get_probe},
};

/// Default loader using the Symphonia decoder library (WAV, FLAC, Vorbis, ...).
pub struct DefaultAudioLoader;

impl AudioDataLoader for DefaultAudioLoader {
    fn load(&self, path: &str, options: &LoadOptions) -> Result<Wave> {
        let mut format = open_format(path)?;

        let track = format.default_track().ok_or_else(|| {
            AuramixError::AudioLoading("No default audio track found".to_string())
        })?;
        let track_id = track.id;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| AuramixError::AudioLoading("Sample rate not found".to_string()))?;

        let channels = channel_roles(track.codec_params.channels)?;

        let mut decoder = get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| AuramixError::AudioLoading(format!("Failed to create decoder: {:?}", e)))?;

        let mut samples: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(_)) => break, // end-of-file
                Err(e) => {
                    return Err(AuramixError::AudioLoading(format!(
                        "Error reading packet: {:?}",
                        e
                    )));
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(Error::IoError(_)) => break,
                Err(Error::DecodeError(_)) => continue, // recoverable corruption
                Err(e) => {
                    return Err(AuramixError::AudioLoading(format!(
                        "Error decoding packet: {:?}",
                        e
                    )));
                }
            };

            let spec = *decoded.spec();
            let mut tmp = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            tmp.copy_interleaved_ref(decoded);
            samples.extend_from_slice(tmp.samples());
        }

        let mut wave = Wave::from_samples(samples, sample_rate, channels)?;

        if options.convert_to_mono == ConvertToMono::ForceMono {
            wave = wave.to_mono();
        }

        if let Some(rate) = options.target_sample_rate {
            wave = wave.resample(rate)?;
        }

        log::info!(
            "Loaded {}: {} frames, {} Hz, {:?}",
            path,
            wave.size(),
            wave.sample_rate(),
            wave.channels()
        );

        Ok(wave)
    }
}

/// Opens `path` and returns the container reader.
pub(crate) fn open_format(path: &str) -> Result<Box<dyn FormatReader>> {
    let file = File::open(path)?;
    let mut hint = Hint::new();
    if let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    detect_format(Box::new(file), &hint)
}

/// Detects the container format of an arbitrary byte source. `hint` may
/// name the expected extension.
pub(crate) fn detect_format(
    source: Box<dyn MediaSource>,
    hint: &Hint,
) -> Result<Box<dyn FormatReader>> {
    let mss = MediaSourceStream::new(source, Default::default());
    let detected = get_probe()
        .format(
            hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| {
            AuramixError::AudioLoading(format!("Failed to detect audio format: {:?}", e))
        })?;

    Ok(detected.format)
}

/// Maps Symphonia's channel flags onto channel roles, in interleave order.
pub(crate) fn channel_roles(channels: Option<Channels>) -> Result<Vec<Channel>> {
    let channels = channels
        .ok_or_else(|| AuramixError::AudioLoading("Channel count not found".to_string()))?;

    if channels.count() == 1 {
        return Ok(vec![Channel::Mono]);
    }

    let mut roles = Vec::with_capacity(channels.count());
    for bit in 0..32 {
        let flag = Channels::from_bits_truncate(1 << bit);
        if flag.is_empty() || !channels.contains(flag) {
            continue;
        }
        roles.push(role_of(flag));
    }

    Ok(roles)
}

fn role_of(flag: Channels) -> Channel {
    if flag == Channels::FRONT_LEFT {
        Channel::FrontLeft
    } else if flag == Channels::FRONT_RIGHT {
        Channel::FrontRight
    } else if flag == Channels::FRONT_CENTRE {
        Channel::Center
    } else if flag == Channels::LFE1 {
        Channel::LowFreq
    } else if flag == Channels::REAR_LEFT || flag == Channels::SIDE_LEFT {
        Channel::BackLeft
    } else if flag == Channels::REAR_RIGHT || flag == Channels::SIDE_RIGHT {
        Channel::BackRight
    } else {
        Channel::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_roles_stereo() {
        let roles = channel_roles(Some(Channels::FRONT_LEFT | Channels::FRONT_RIGHT)).unwrap();
        assert_eq!(roles, vec![Channel::FrontLeft, Channel::FrontRight]);
    }

    #[test]
    fn test_channel_roles_surround() {
        let flags = Channels::FRONT_LEFT
            | Channels::FRONT_RIGHT
            | Channels::FRONT_CENTRE
            | Channels::LFE1
            | Channels::REAR_LEFT
            | Channels::REAR_RIGHT;
        assert_eq!(channel_roles(Some(flags)).unwrap(), Channel::layout_for_count(6));
    }

    #[test]
    fn test_channel_roles_mono_and_missing() {
        assert_eq!(
            channel_roles(Some(Channels::FRONT_CENTRE)).unwrap(),
            vec![Channel::Mono]
        );
        assert!(channel_roles(None).is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = DefaultAudioLoader.load("does/not/exist.wav", &LoadOptions::default());
        assert!(matches!(result, Err(AuramixError::Io(_))));
    }
}
