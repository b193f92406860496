//! The per-period software mixer.
//!
//! Each call to [`Mixer::mix_period`] asks the backend how much it can take,
//! sums every playing voice into a scratch buffer under the controller
//! registry lock and posts the result. Nothing in a period allocates, blocks
//! on I/O or returns an error: bad voices are detached and go silent.

pub mod routing;
mod shared;

pub use routing::{MAX_CHANNELS, RoutingMatrix, route};
pub use shared::{MixerShared, OutputSettings};

use crate::audio_data::Channel;
use crate::backend::{AudioBackend, Device};
use crate::error::{AuramixError, Result};
use crate::events::AuramixEvent;
use crate::math::{Vec3, snap_frame};
use crate::playback::{Voice, VoiceKind};
use crate::source::Source;
use crate::spatial::{Environment, Speaker, panning};
use crossbeam_channel::Sender;
use std::sync::Arc;

/// Result of one [`Mixer::mix_period`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodOutcome {
    /// The backend had no room; nothing was mixed or advanced.
    Skipped,
    /// This many frames were mixed and posted.
    Mixed(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MixerStats {
    pub periods_mixed: u64,
    pub skipped_periods: u64,
    pub frames_mixed: u64,
}

/// Which panning law positional voices use on this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Topology {
    Headphones { left: usize, right: usize },
    Stereo { left: usize, right: usize },
    Surround { speakers: [usize; 4] },
    Mono { channel: usize },
    /// No usable layout: broadcast with distance attenuation only.
    Unknown,
}

impl Topology {
    fn of(device: &Device) -> Self {
        let find = |c| device.find_channel(c);
        let fronts = find(Channel::FrontLeft).zip(find(Channel::FrontRight));
        let backs = find(Channel::BackLeft).zip(find(Channel::BackRight));

        match (fronts, backs) {
            (Some((left, right)), _) if device.headphones => Topology::Headphones { left, right },
            (Some((fl, fr)), Some((bl, br))) => Topology::Surround {
                speakers: [fl, fr, bl, br],
            },
            (Some((left, right)), None) => Topology::Stereo { left, right },
            _ => match find(Channel::Mono) {
                Some(channel) => Topology::Mono { channel },
                None => Topology::Unknown,
            },
        }
    }
}

/// Mixes every registered voice into periods for one output device.
pub struct Mixer {
    shared: Arc<MixerShared>,
    device: Device,
    topology: Topology,
    device_lfe: Option<usize>,
    period_size: usize,
    scratch: Vec<f32>,
    events: Option<Sender<AuramixEvent>>,
    released: Vec<Arc<dyn Source>>,
    stats: MixerStats,
}

impl Mixer {
    pub fn new(shared: Arc<MixerShared>, device: Device, period_size: usize) -> Result<Self> {
        if period_size == 0 {
            return Err(AuramixError::Configuration(
                "Period size must be greater than 0".to_string(),
            ));
        }
        if device.sample_rate == 0 {
            return Err(AuramixError::AudioDevice(format!(
                "Device {} reports a sample rate of 0",
                device.name
            )));
        }
        if device.channels.is_empty() || device.channel_count() > MAX_CHANNELS {
            return Err(AuramixError::AudioDevice(format!(
                "Device {} has {} channels, expected 1..={}",
                device.name,
                device.channel_count(),
                MAX_CHANNELS
            )));
        }

        let topology = Topology::of(&device);
        log::debug!(
            "Mixer for {}: {:?}, {} frames per period",
            device.name,
            topology,
            period_size
        );

        Ok(Self {
            shared,
            topology,
            device_lfe: device.find_channel(Channel::LowFreq),
            scratch: vec![0.0; period_size * device.channel_count()],
            device,
            period_size,
            events: None,
            released: Vec::with_capacity(MAX_CHANNELS),
            stats: MixerStats::default(),
        })
    }

    /// Sends voice events to `events`. Events are dropped when it is full.
    pub fn with_events(mut self, events: Sender<AuramixEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn period_size(&self) -> usize {
        self.period_size
    }

    pub fn stats(&self) -> MixerStats {
        self.stats
    }

    /// Produces and posts one period.
    ///
    /// When the backend has no room the period is skipped without touching
    /// any voice, so the caller can simply try again later.
    pub fn mix_period(&mut self, backend: &mut dyn AudioBackend) -> PeriodOutcome {
        let channels = self.device.channel_count();
        let frames = backend.writable_frame_count(channels).min(self.period_size);
        if frames == 0 {
            self.stats.skipped_periods += 1;
            log::trace!("Backend full, skipping period");
            return PeriodOutcome::Skipped;
        }

        let out = &mut self.scratch[..frames * channels];
        out.fill(0.0);

        let env = self.shared.environment();
        let settings = self.shared.settings();
        let ctx = VoiceContext {
            device: &self.device,
            topology: self.topology,
            device_lfe: self.device_lfe,
            env: &env,
            events: self.events.as_ref(),
            frames,
        };

        {
            let mut table = self.shared.registry().lock();
            for voice in table.iter_mut() {
                mix_voice(&ctx, voice, out, &mut self.released);
            }
        }
        // sources detached this period are freed outside the lock
        self.released.clear();

        if !settings.is_unity(channels) {
            for frame in out.chunks_exact_mut(channels) {
                for (d, sample) in frame.iter_mut().enumerate() {
                    *sample *= settings.master_volume() * settings.channel_volume(d);
                }
            }
        }

        backend.post_data(out, frames, channels);
        self.stats.periods_mixed += 1;
        self.stats.frames_mixed += frames as u64;
        PeriodOutcome::Mixed(frames)
    }
}

struct VoiceContext<'a> {
    device: &'a Device,
    topology: Topology,
    device_lfe: Option<usize>,
    env: &'a Environment,
    events: Option<&'a Sender<AuramixEvent>>,
    frames: usize,
}

impl VoiceContext<'_> {
    fn emit(&self, event: AuramixEvent) {
        if let Some(events) = self.events {
            let _ = events.try_send(event);
        }
    }
}

/// Reads source frames, remembering the last one so that interpolating
/// between neighbours reads each frame once.
struct FrameReader<'a> {
    source: &'a dyn Source,
    channels: usize,
    cached_index: Option<usize>,
    cached: [f32; MAX_CHANNELS],
    underrun: bool,
}

impl<'a> FrameReader<'a> {
    fn new(source: &'a dyn Source, channels: usize) -> Self {
        Self {
            source,
            channels,
            cached_index: None,
            cached: [0.0; MAX_CHANNELS],
            underrun: false,
        }
    }

    fn read(&mut self, index: usize, out: &mut [f32; MAX_CHANNELS]) {
        if self.cached_index != Some(index) {
            let frame = &mut self.cached[..self.channels];
            if !self.source.read_frame(index, frame) {
                frame.fill(0.0);
                self.underrun = true;
            }
            self.cached_index = Some(index);
        }
        out[..self.channels].copy_from_slice(&self.cached[..self.channels]);
    }
}

/// Per-voice gains towards the device, fixed for one period.
enum VoiceGains {
    Routed(RoutingMatrix),
    Positional {
        collapse: Collapse,
        lfe: Option<usize>,
        gains: [f32; MAX_CHANNELS],
        lfe_gain: f32,
    },
}

/// How a positional voice's channels become one signal.
enum Collapse {
    Channel(usize),
    /// Sum of every channel except the given LowFreq one.
    Sum { skip: Option<usize> },
}

/// Detaches the voice's source into `released`, which the caller empties
/// once the registry lock is gone.
fn detach(
    ctx: &VoiceContext<'_>,
    voice: &mut Voice,
    reason: &'static str,
    released: &mut Vec<Arc<dyn Source>>,
) {
    log::warn!("Detaching source from {}: {}", voice.id, reason);
    if let Some(source) = voice.detach() {
        released.push(source);
    }
    ctx.emit(AuramixEvent::SourceDetached {
        voice: voice.id,
        reason,
    });
}

fn mix_voice(
    ctx: &VoiceContext<'_>,
    voice: &mut Voice,
    out: &mut [f32],
    released: &mut Vec<Arc<dyn Source>>,
) {
    let Some(source) = voice.source.clone() else {
        return;
    };
    let source = source.as_ref();

    let rate = source.sample_rate();
    let channels = source.channel_count();
    let unsupported = if rate == 0 {
        Some("source has no sample rate")
    } else if channels == 0 || channels > MAX_CHANNELS {
        Some("unsupported source channel count")
    } else {
        None
    };
    if let Some(reason) = unsupported {
        detach(ctx, voice, reason, released);
        return;
    }
    let rate = rate as f64;

    if voice.pending_seek.is_some() {
        if source.is_seek_complete() {
            voice.position = source.seek_target() as f64 / rate;
            voice.pending_seek = None;
            source.seeking_done();
            log::trace!("{} seek landed at {:.3}s", voice.id, voice.position);
        } else if !source.is_seeking() {
            voice.pending_seek = None;
        }
    }

    if !voice.playing {
        return;
    }

    let gains = match voice_gains(ctx, voice, source, channels) {
        Some(gains) => gains,
        None => return,
    };

    let size = source.size();
    let size_f = size as f64;
    let step = rate / ctx.device.sample_rate as f64;
    let device_channels = ctx.device.channel_count();
    let volume = voice.volume;

    let mut reader = FrameReader::new(source, channels);
    let mut current = [0.0f32; MAX_CHANNELS];
    let mut next = [0.0f32; MAX_CHANNELS];
    let mut cursor = snap_frame(voice.position * rate);
    let mut finished = false;

    for frame in out.chunks_exact_mut(device_channels).take(ctx.frames) {
        if cursor >= size_f {
            if voice.looping && size > 0 {
                cursor %= size_f;
                ctx.emit(AuramixEvent::VoiceLooped { voice: voice.id });
            } else {
                finished = true;
                break;
            }
        }

        let index = cursor as usize;
        let frac = (cursor - index as f64) as f32;
        reader.read(index, &mut current);
        if frac > 0.0 {
            let following = if index + 1 < size {
                index + 1
            } else if voice.looping {
                0
            } else {
                index
            };
            reader.read(following, &mut next);
            for c in 0..channels {
                current[c] += (next[c] - current[c]) * frac;
            }
        }

        write_frame(ctx, &gains, &current[..channels], volume, frame);
        cursor = snap_frame(cursor + step);
    }

    if !finished && cursor >= size_f {
        if voice.looping && size > 0 {
            cursor %= size_f;
            ctx.emit(AuramixEvent::VoiceLooped { voice: voice.id });
        } else {
            finished = true;
        }
    }

    if finished {
        voice.playing = false;
        voice.position = source.length();
        log::debug!("{} finished", voice.id);
        ctx.emit(AuramixEvent::VoiceFinished { voice: voice.id });
    } else {
        voice.position = cursor / rate;
    }

    if reader.underrun {
        ctx.emit(AuramixEvent::StreamUnderrun { voice: voice.id });
    }
}

fn voice_gains(
    ctx: &VoiceContext<'_>,
    voice: &mut Voice,
    source: &dyn Source,
    channels: usize,
) -> Option<VoiceGains> {
    let mut roles = [Channel::Unknown; MAX_CHANNELS];
    for (c, role) in roles.iter_mut().enumerate().take(channels) {
        *role = source.channel_type(c);
    }
    let roles = &roles[..channels];

    match voice.kind {
        VoiceKind::Basic => {
            let matrix = route(roles, &ctx.device.channels);
            if matrix.has_unrouted() && !voice.routing_warned {
                voice.routing_warned = true;
                log::warn!(
                    "{}: some of {:?} have no route to {:?}",
                    voice.id,
                    roles,
                    ctx.device.channels
                );
            }
            Some(VoiceGains::Routed(matrix))
        }
        VoiceKind::Positional { location } => {
            let lfe = roles.iter().position(|r| *r == Channel::LowFreq);
            let collapse = match roles.iter().position(|r| *r == Channel::Mono) {
                Some(mono) => Collapse::Channel(mono),
                None if channels == 1 => Collapse::Channel(0),
                None => Collapse::Sum { skip: lfe },
            };
            let lfe = match collapse {
                // a lone LowFreq channel is the signal itself
                Collapse::Channel(c) if Some(c) == lfe => None,
                _ => lfe,
            };

            let gains = positional_gains(ctx, location);
            let lfe_gain = panning::listener_attenuation(ctx.env, location);
            Some(VoiceGains::Positional {
                collapse,
                lfe,
                gains,
                lfe_gain,
            })
        }
    }
}

fn positional_gains(ctx: &VoiceContext<'_>, location: Vec3) -> [f32; MAX_CHANNELS] {
    let mut gains = [0.0f32; MAX_CHANNELS];
    match ctx.topology {
        Topology::Headphones { left, right } => {
            let [l, r] = panning::headphone_gains(ctx.env, location);
            gains[left] = l;
            gains[right] = r;
        }
        Topology::Stereo { left, right } => {
            let [l, r] = panning::stereo_gains(ctx.env, location);
            gains[left] = l;
            gains[right] = r;
        }
        Topology::Surround { speakers } => {
            let shares = panning::surround_gains(ctx.env, location);
            for speaker in Speaker::ALL {
                gains[speakers[speaker.index()]] = shares[speaker.index()];
            }
        }
        Topology::Mono { channel } => {
            gains[channel] = panning::listener_attenuation(ctx.env, location);
        }
        Topology::Unknown => {
            let attenuation = panning::listener_attenuation(ctx.env, location);
            gains[..ctx.device.channel_count()].fill(attenuation);
        }
    }
    gains
}

fn write_frame(
    ctx: &VoiceContext<'_>,
    gains: &VoiceGains,
    sample: &[f32],
    volume: f32,
    out: &mut [f32],
) {
    match gains {
        VoiceGains::Routed(matrix) => {
            for (s, value) in sample.iter().enumerate() {
                let value = value * volume;
                if value == 0.0 {
                    continue;
                }
                for (d, gain) in matrix.row(s).iter().enumerate() {
                    out[d] += value * gain;
                }
            }
        }
        VoiceGains::Positional {
            collapse,
            lfe,
            gains,
            lfe_gain,
        } => {
            let main = match collapse {
                Collapse::Channel(c) => sample[*c],
                Collapse::Sum { skip } => sample
                    .iter()
                    .enumerate()
                    .filter(|(c, _)| Some(*c) != *skip)
                    .map(|(_, v)| v)
                    .sum::<f32>(),
            } * volume;
            for (d, sample_out) in out.iter_mut().enumerate() {
                *sample_out += main * gains[d];
            }

            if let Some(l) = lfe {
                let bass = sample[*l] * volume;
                match ctx.device_lfe {
                    Some(d) => out[d] += bass * lfe_gain,
                    None => {
                        for (d, sample_out) in out.iter_mut().enumerate() {
                            *sample_out += bass * gains[d];
                        }
                    }
                }
            }
        }
    }
}
