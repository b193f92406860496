use super::decoder::{StreamDecoder, StreamInfo};
use crate::audio_data::{Wave, channel_roles, detect_format, open_format};
use crate::error::{AuramixError, Result};
use symphonia::{
    core::{
        audio::SampleBuffer,
        codecs::{CodecParameters, Decoder, DecoderOptions},
        errors::Error,
        formats::{FormatReader, SeekMode, SeekTo},
        io::MediaSource,
        probe::Hint,
        units::{Time, TimeBase},
    },
    default::get_codecs,
};

/// Decoding a short distance forward is cheaper than a container seek.
const FORWARD_SKIP_SECONDS: usize = 1;

struct OpenStream {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
}

/// Where the encoded bytes come from.
enum Origin {
    Path(String),
    /// Taken by the first open; the container reader owns it afterwards.
    Reader {
        source: Option<Box<dyn MediaSource>>,
        hint: Hint,
    },
}

/// Streams a file or any seekable byte source through Symphonia (WAV, FLAC,
/// Vorbis, ...).
///
/// Decoded frames that were not requested yet are kept, so a chain of
/// consecutive `decode_some` calls decodes every packet once. Jumps backwards
/// or far ahead reposition with an accurate container seek. When that fails a
/// file is reopened and a reader is rewound to its start.
pub struct SymphoniaDecoder {
    origin: Origin,
    name: String,
    stream: Option<OpenStream>,
    info: Option<StreamInfo>,
    /// Interleaved frames decoded but not yet handed out.
    pending: Vec<f32>,
    /// Frame index of `pending[0]`.
    pending_start: usize,
}

impl SymphoniaDecoder {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::with_origin(path.clone(), Origin::Path(path))
    }

    /// Streams from `source`, e.g. a `Cursor<Vec<u8>>` or an open `File`.
    /// `extension` helps symphonia pick a container format.
    pub fn from_reader(source: Box<dyn MediaSource>, extension: Option<&str>) -> Self {
        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }
        let name = match extension {
            Some(ext) => format!("<{} reader>", ext),
            None => "<reader>".to_string(),
        };
        Self::with_origin(
            name,
            Origin::Reader {
                source: Some(source),
                hint,
            },
        )
    }

    fn with_origin(name: String, origin: Origin) -> Self {
        Self {
            origin,
            name,
            stream: None,
            info: None,
            pending: Vec::new(),
            pending_start: 0,
        }
    }

    /// The file path, or a placeholder for reader-backed decoders.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<StreamInfo> {
        let format = match &mut self.origin {
            Origin::Path(path) => open_format(path)?,
            Origin::Reader { source, hint } => {
                let source = source.take().ok_or_else(|| {
                    AuramixError::Stream(format!("{}: reader was already consumed", self.name))
                })?;
                detect_format(source, hint)?
            }
        };
        let track = format.default_track().ok_or_else(|| {
            AuramixError::AudioLoading("No default audio track found".to_string())
        })?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| AuramixError::AudioLoading("Sample rate not found".to_string()))?;
        let total_frames = params.n_frames.ok_or_else(|| {
            AuramixError::Stream(format!("{}: stream length is unknown", self.name))
        })? as usize;
        let channels = channel_roles(params.channels)?;
        let decoder = make_decoder(&params)?;

        self.stream = Some(OpenStream {
            format,
            decoder,
            track_id,
            time_base: params.time_base,
        });
        self.pending.clear();
        self.pending_start = 0;

        Ok(StreamInfo {
            sample_rate,
            channels,
            total_frames,
        })
    }

    /// Starts decoding over from frame 0.
    fn restart(&mut self, info: &StreamInfo) -> Result<()> {
        if let Origin::Path(_) = self.origin {
            self.open()?;
            return Ok(());
        }

        let Some(stream) = self.stream.as_mut() else {
            return Err(AuramixError::Stream(format!("{}: not open", self.name)));
        };
        let seeked = stream
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time {
                        seconds: 0,
                        frac: 0.0,
                    },
                    track_id: Some(stream.track_id),
                },
            )
            .map_err(|e| AuramixError::Stream(format!("{}: cannot rewind: {:?}", self.name, e)))?;
        stream.decoder.reset();
        self.pending.clear();
        self.pending_start = ts_to_frame(seeked.actual_ts, stream.time_base, info.sample_rate);
        Ok(())
    }

    fn pending_frames(&self, channels: usize) -> usize {
        self.pending.len() / channels
    }

    /// Makes sure the next decoded frame is at or before `start`, without
    /// decoding far ahead of what is needed.
    fn reposition(&mut self, start: usize, info: &StreamInfo) -> Result<()> {
        let channels = info.channels.len();
        let pending_end = self.pending_start + self.pending_frames(channels);
        let skip_limit = pending_end + FORWARD_SKIP_SECONDS * info.sample_rate as usize;
        if start >= self.pending_start && start <= skip_limit {
            return Ok(());
        }

        let Some(stream) = self.stream.as_mut() else {
            self.open()?;
            return Ok(());
        };

        let seconds = start as f64 / info.sample_rate as f64;
        let seek = stream.format.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time: Time {
                    seconds: seconds.trunc() as u64,
                    frac: seconds.fract(),
                },
                track_id: Some(stream.track_id),
            },
        );

        match seek {
            Ok(seeked) => {
                stream.decoder.reset();
                let actual = ts_to_frame(seeked.actual_ts, stream.time_base, info.sample_rate);
                self.pending.clear();
                self.pending_start = actual;
                if actual > start {
                    log::debug!(
                        "{}: seek to frame {} landed at {}, restarting",
                        self.name,
                        start,
                        actual
                    );
                    self.restart(info)?;
                }
            }
            Err(e) => {
                log::debug!("{}: container seek failed ({:?}), restarting", self.name, e);
                self.restart(info)?;
            }
        }
        Ok(())
    }

    /// Decodes one more packet into `pending`. Returns `false` at end of stream.
    fn decode_packet(&mut self, channels: usize) -> Result<bool> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(false);
        };

        loop {
            let packet = match stream.format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(_)) => return Ok(false),
                Err(Error::ResetRequired) => {
                    let params = stream
                        .format
                        .tracks()
                        .iter()
                        .find(|t| t.id == stream.track_id)
                        .map(|t| t.codec_params.clone())
                        .ok_or_else(|| AuramixError::Decode("Track disappeared".to_string()))?;
                    stream.decoder = make_decoder(&params)?;
                    continue;
                }
                Err(e) => {
                    return Err(AuramixError::Decode(format!(
                        "Error reading packet: {:?}",
                        e
                    )));
                }
            };

            if packet.track_id() != stream.track_id {
                continue;
            }

            let decoded = match stream.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(Error::IoError(_)) => return Ok(false),
                Err(Error::DecodeError(e)) => {
                    log::warn!("{}: skipping corrupt packet: {}", self.name, e);
                    continue;
                }
                Err(e) => {
                    return Err(AuramixError::Decode(format!(
                        "Error decoding packet: {:?}",
                        e
                    )));
                }
            };

            let spec = *decoded.spec();
            if spec.channels.count() != channels {
                return Err(AuramixError::Decode(format!(
                    "Packet has {} channels, stream has {}",
                    spec.channels.count(),
                    channels
                )));
            }

            let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buf.copy_interleaved_ref(decoded);
            self.pending.extend_from_slice(buf.samples());
            return Ok(true);
        }
    }
}

impl StreamDecoder for SymphoniaDecoder {
    fn decode_start(&mut self) -> Result<StreamInfo> {
        let info = self.open()?;
        log::info!(
            "Opened stream {}: {} frames, {} Hz, {:?}",
            self.name,
            info.total_frames,
            info.sample_rate,
            info.channels
        );
        self.info = Some(info.clone());
        Ok(info)
    }

    fn decode_some(&mut self, target: &mut Wave, start: usize) -> Result<usize> {
        let info = match self.info.clone() {
            Some(info) => info,
            None => self.decode_start()?,
        };
        let channels = info.channels.len();
        if target.channel_count() != channels {
            return Err(AuramixError::Stream(format!(
                "Target has {} channels, stream has {}",
                target.channel_count(),
                channels
            )));
        }

        let wanted = target.size().min(info.total_frames.saturating_sub(start));
        let mut written = 0;
        if wanted > 0 {
            self.reposition(start, &info)?;
        }

        while written < wanted {
            let needed = start + written;

            // drop frames before the one we need
            let stale = needed
                .saturating_sub(self.pending_start)
                .min(self.pending_frames(channels));
            if stale > 0 {
                self.pending.drain(..stale * channels);
                self.pending_start += stale;
            }

            let available = self.pending_frames(channels);
            if available == 0 || self.pending_start != needed {
                if !self.decode_packet(channels)? {
                    break;
                }
                continue;
            }

            let n = available.min(wanted - written);
            target.samples_mut()[written * channels..(written + n) * channels]
                .copy_from_slice(&self.pending[..n * channels]);
            self.pending.drain(..n * channels);
            self.pending_start += n;
            written += n;
        }

        target.samples_mut()[written * channels..].fill(0.0);
        Ok(written)
    }
}

fn make_decoder(params: &CodecParameters) -> Result<Box<dyn Decoder>> {
    get_codecs()
        .make(params, &DecoderOptions::default())
        .map_err(|e| AuramixError::Decode(format!("Failed to create decoder: {:?}", e)))
}

fn ts_to_frame(ts: u64, time_base: Option<TimeBase>, sample_rate: u32) -> usize {
    match time_base {
        Some(tb) => {
            let time = tb.calc_time(ts);
            ((time.seconds as f64 + time.frac) * sample_rate as f64).round() as usize
        }
        None => ts as usize,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_data::Channel;
    use std::io::Cursor;

    /// 16-bit PCM mono WAV whose frame `i` holds `i * 8`.
    fn ramp_wav(frames: usize, sample_rate: u32) -> Vec<u8> {
        let data_len = (frames * 2) as u32;
        let mut bytes = Vec::with_capacity(44 + frames * 2);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for i in 0..frames {
            bytes.extend_from_slice(&((i * 8) as i16).to_le_bytes());
        }
        bytes
    }

    fn expected(frame: usize) -> f32 {
        (frame * 8) as f32 / 32768.0
    }

    fn reader_decoder(frames: usize) -> SymphoniaDecoder {
        SymphoniaDecoder::from_reader(Box::new(Cursor::new(ramp_wav(frames, 8000))), Some("wav"))
    }

    #[test]
    fn test_reader_info() {
        let mut decoder = reader_decoder(3000);
        let info = decoder.decode_start().unwrap();
        assert_eq!(info.sample_rate, 8000);
        assert_eq!(info.channels, vec![Channel::Mono]);
        assert_eq!(info.total_frames, 3000);
        assert_eq!(decoder.name(), "<wav reader>");
    }

    #[test]
    fn test_reader_decodes_forward_and_backward() {
        let mut decoder = reader_decoder(3000);
        decoder.decode_start().unwrap();
        let mut target = Wave::new(100, 8000, vec![Channel::Mono]);

        for start in [0, 100, 2500, 40, 2950] {
            let written = decoder.decode_some(&mut target, start).unwrap();
            assert_eq!(written, 100.min(3000 - start));
            for i in 0..written {
                let value = target.get(i, 0);
                assert!((value - expected(start + i)).abs() < 1e-6, "frame {}", start + i);
            }
            assert!(target.samples()[written..].iter().all(|s| *s == 0.0));
        }
    }

    #[test]
    fn test_stream_from_reader() {
        use crate::source::{SeekResult, Source};
        use crate::streaming::AudioStream;

        let source = Box::new(Cursor::new(ramp_wav(4000, 8000)));
        let stream = AudioStream::from_reader(source, Some("wav"), 500).unwrap();
        assert_eq!(stream.size(), 4000);
        while stream.fill_buffer() {}

        let mut out = [0.0];
        assert!(stream.read_frame(1200, &mut out));
        assert!((out[0] - expected(1200)).abs() < 1e-6);

        assert_eq!(stream.start_seeking(3500), SeekResult::Pending);
        while stream.fill_buffer() {}
        assert!(stream.is_seek_complete());
        stream.seeking_done();
        assert!(stream.read_frame(3500, &mut out));
        assert!((out[0] - expected(3500)).abs() < 1e-6);
    }

    #[test]
    fn test_reader_is_consumed_once() {
        let mut decoder = reader_decoder(10);
        decoder.decode_start().unwrap();
        assert!(matches!(decoder.open(), Err(AuramixError::Stream(_))));
    }

    #[test]
    fn test_missing_file() {
        let mut decoder = SymphoniaDecoder::new("does/not/exist.flac");
        assert!(matches!(decoder.decode_start(), Err(AuramixError::Io(_))));
    }

    #[test]
    fn test_ts_to_frame() {
        assert_eq!(ts_to_frame(480, None, 48000), 480);
        assert_eq!(ts_to_frame(480, Some(TimeBase::new(1, 48000)), 48000), 480);
        assert_eq!(ts_to_frame(1, Some(TimeBase::new(1, 1000)), 48000), 48);
    }
}
