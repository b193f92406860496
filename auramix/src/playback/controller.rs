use super::registry::{ControllerRegistry, RegistryInner, Voice, VoiceId, VoiceKind, deregister};
use crate::math::Vec3;
use crate::source::{SeekResult, Source};
use std::ops::Deref;
use std::sync::{Arc, Weak};

/// Plays a source without spatialization.
///
/// Every mutator takes effect at the next mix period. Once the engine (and its
/// registry) is gone, mutators do nothing and queries return their defaults.
#[derive(Debug)]
pub struct BasicController {
    id: VoiceId,
    registry: Weak<RegistryInner>,
}

impl BasicController {
    pub fn new(registry: &ControllerRegistry) -> Self {
        Self::register(registry, VoiceKind::Basic)
    }

    pub fn with_source(registry: &ControllerRegistry, source: Arc<dyn Source>) -> Self {
        let controller = Self::new(registry);
        controller.set_source(source);
        controller
    }

    fn register(registry: &ControllerRegistry, kind: VoiceKind) -> Self {
        let (id, registry) = registry.register(kind);
        Self { id, registry }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    fn with_voice<R>(&self, default: R, f: impl FnOnce(&mut Voice) -> R) -> R {
        let Some(inner) = self.registry.upgrade() else {
            return default;
        };
        let mut table = inner.lock();
        match table.get_mut(self.id) {
            Some(voice) => f(voice),
            None => default,
        }
    }

    /// Attaches a source and rewinds to the start.
    pub fn set_source(&self, source: Arc<dyn Source>) {
        self.with_voice((), |voice| voice.attach(source));
    }

    /// Detaches the current source; the voice becomes silent.
    pub fn release_source(&self) -> Option<Arc<dyn Source>> {
        self.with_voice(None, |voice| voice.detach())
    }

    pub fn has_source(&self) -> bool {
        self.with_voice(false, |voice| voice.source.is_some())
    }

    /// Starts playing once. Rewinds first if already at the end.
    ///
    /// Without a source the request is remembered and playback starts when
    /// one is attached.
    pub fn play(&self) {
        self.start(false);
    }

    /// Like [`play`](Self::play) but wraps around at the end.
    pub fn play_looped(&self) {
        self.start(true);
    }

    fn start(&self, looping: bool) {
        self.with_voice((), |voice| {
            if voice.source.is_some() && voice.position >= voice.length() {
                voice.position = 0.0;
            }
            voice.looping = looping;
            voice.playing = true;
            log::debug!(
                "{} playing from {:.3}s (looping: {})",
                voice.id,
                voice.position,
                looping
            );
        });
    }

    /// Stops advancing; the position is kept.
    pub fn pause(&self) {
        self.with_voice((), |voice| {
            voice.playing = false;
            log::debug!("{} paused at {:.3}s", voice.id, voice.position);
        });
    }

    /// Moves back to the start without touching the playing flag.
    pub fn reset(&self) {
        self.with_voice((), |voice| {
            voice.position = 0.0;
            voice.pending_seek = None;
        });
    }

    /// Moves to `seconds` from the start.
    ///
    /// A streaming source may answer [`SeekResult::Pending`]; playback then
    /// continues from the old position until the target has been decoded.
    /// On failure the position is unchanged.
    pub fn seek(&self, seconds: f64) -> SeekResult {
        self.with_voice(SeekResult::Failed, |voice| {
            let Some(source) = voice.source.as_ref() else {
                return SeekResult::Failed;
            };
            if !seconds.is_finite() || seconds < 0.0 {
                log::warn!("{} rejected seek to {}s", voice.id, seconds);
                return SeekResult::Failed;
            }

            let target = (seconds * source.sample_rate() as f64).floor() as usize;
            let result = source.start_seeking(target);
            match result {
                SeekResult::Done => {
                    voice.position = seconds;
                    voice.pending_seek = None;
                }
                SeekResult::Pending => voice.pending_seek = Some(target),
                SeekResult::Failed => {
                    log::warn!("{} could not seek to {:.3}s", voice.id, seconds)
                }
            }
            result
        })
    }

    /// Moves to `fraction` (0..1) of the duration.
    pub fn seek_to(&self, fraction: f64) -> SeekResult {
        self.seek(fraction * self.duration())
    }

    /// Scales the voice. Values above 1 amplify.
    pub fn set_volume(&self, volume: f32) {
        self.with_voice((), |voice| voice.volume = volume);
    }

    pub fn volume(&self) -> f32 {
        self.with_voice(0.0, |voice| voice.volume)
    }

    /// Length of the attached source in seconds.
    pub fn duration(&self) -> f64 {
        self.with_voice(0.0, |voice| voice.length())
    }

    pub fn current_time(&self) -> f64 {
        self.with_voice(0.0, |voice| voice.position)
    }

    pub fn current_fraction(&self) -> f64 {
        self.with_voice(0.0, |voice| {
            let length = voice.length();
            if length > 0.0 {
                (voice.position / length).min(1.0)
            } else {
                0.0
            }
        })
    }

    /// At or past the end and not playing.
    pub fn is_finished(&self) -> bool {
        self.with_voice(false, |voice| {
            voice.source.is_some() && !voice.playing && voice.position >= voice.length()
        })
    }

    /// Whether the voice is audible: told to play and has a source.
    pub fn is_playing(&self) -> bool {
        self.with_voice(false, |voice| voice.playing && voice.source.is_some())
    }

    pub fn is_looping(&self) -> bool {
        self.with_voice(false, |voice| voice.looping)
    }

    /// Whether a seek is waiting for the source to catch up.
    pub fn is_seeking(&self) -> bool {
        self.with_voice(false, |voice| voice.pending_seek.is_some())
    }
}

impl Drop for BasicController {
    fn drop(&mut self) {
        deregister(&self.registry, self.id);
    }
}

/// A controller whose source sits at a point in space and is panned
/// relative to the listener.
#[derive(Debug)]
pub struct PositionalController {
    basic: BasicController,
}

impl PositionalController {
    pub fn new(registry: &ControllerRegistry, location: Vec3) -> Self {
        Self {
            basic: BasicController::register(registry, VoiceKind::Positional { location }),
        }
    }

    pub fn with_source(
        registry: &ControllerRegistry,
        source: Arc<dyn Source>,
        location: Vec3,
    ) -> Self {
        let controller = Self::new(registry, location);
        controller.set_source(source);
        controller
    }

    /// Moves the source. Non-finite locations are ignored.
    pub fn move_to(&self, location: Vec3) {
        if !location.is_finite() {
            log::warn!("{} ignoring non-finite location {:?}", self.id(), location);
            return;
        }
        self.basic.with_voice((), |voice| {
            voice.kind = VoiceKind::Positional { location };
        });
    }

    pub fn location(&self) -> Vec3 {
        self.basic.with_voice(Vec3::ZERO, |voice| match voice.kind {
            VoiceKind::Positional { location } => location,
            VoiceKind::Basic => Vec3::ZERO,
        })
    }
}

impl Deref for PositionalController {
    type Target = BasicController;

    fn deref(&self) -> &BasicController {
        &self.basic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_data::{Channel, Wave};

    fn one_second_source() -> Arc<dyn Source> {
        Arc::new(Wave::new(48000, 48000, vec![Channel::Mono]))
    }

    #[test]
    fn test_play_pause_state() {
        let registry = ControllerRegistry::new();
        let controller = BasicController::with_source(&registry, one_second_source());
        assert!(!controller.is_playing());

        controller.play();
        assert!(controller.is_playing());
        assert!(!controller.is_looping());

        controller.play_looped();
        assert!(controller.is_looping());

        controller.pause();
        assert!(!controller.is_playing());
        assert!(!controller.is_finished());
    }

    #[test]
    fn test_play_without_source_is_dormant() {
        let registry = ControllerRegistry::new();
        let controller = BasicController::new(&registry);
        controller.play();
        assert!(!controller.is_playing());

        controller.set_source(one_second_source());
        assert!(controller.is_playing());
        assert_eq!(controller.current_time(), 0.0);
    }

    #[test]
    fn test_play_at_end_rewinds() {
        let registry = ControllerRegistry::new();
        let controller = BasicController::with_source(&registry, one_second_source());
        {
            let mut table = registry.lock();
            table.get_mut(controller.id()).unwrap().position = 1.0;
        }
        assert!(controller.is_finished());
        controller.play();
        assert_eq!(controller.current_time(), 0.0);
        assert!(!controller.is_finished());
    }

    #[test]
    fn test_seek() {
        let registry = ControllerRegistry::new();
        let controller = BasicController::with_source(&registry, one_second_source());

        assert_eq!(controller.seek(0.25), SeekResult::Done);
        assert_eq!(controller.current_time(), 0.25);
        assert_eq!(controller.current_fraction(), 0.25);

        assert_eq!(controller.seek(2.0), SeekResult::Failed);
        assert_eq!(controller.current_time(), 0.25);
        assert_eq!(controller.seek(-1.0), SeekResult::Failed);

        assert_eq!(controller.seek_to(0.5), SeekResult::Done);
        assert_eq!(controller.current_time(), 0.5);

        controller.reset();
        assert_eq!(controller.current_time(), 0.0);
    }

    #[test]
    fn test_seek_without_source_fails() {
        let registry = ControllerRegistry::new();
        let controller = BasicController::new(&registry);
        assert_eq!(controller.seek(0.0), SeekResult::Failed);
        assert_eq!(controller.duration(), 0.0);
    }

    #[test]
    fn test_volume_is_not_clamped() {
        let registry = ControllerRegistry::new();
        let controller = BasicController::new(&registry);
        controller.set_volume(2.5);
        assert_eq!(controller.volume(), 2.5);
    }

    #[test]
    fn test_drop_deregisters() {
        let registry = ControllerRegistry::new();
        let a = BasicController::new(&registry);
        let b = PositionalController::new(&registry, Vec3::X);
        assert_eq!(registry.len(), 2);
        drop(a);
        assert_eq!(registry.len(), 1);
        drop(b);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_outlives_registry() {
        let registry = ControllerRegistry::new();
        let controller = BasicController::with_source(&registry, one_second_source());
        drop(registry);
        controller.play();
        assert!(!controller.is_playing());
        assert_eq!(controller.seek(0.1), SeekResult::Failed);
    }

    #[test]
    fn test_positional_move() {
        let registry = ControllerRegistry::new();
        let location = Vec3::new(1.0, 2.0, 3.0);
        let controller =
            PositionalController::with_source(&registry, one_second_source(), location);
        assert_eq!(controller.location(), Vec3::new(1.0, 2.0, 3.0));
        controller.move_to(Vec3::new(-4.0, 0.0, 0.0));
        assert_eq!(controller.location(), Vec3::new(-4.0, 0.0, 0.0));
        controller.move_to(Vec3::new(f32::NAN, 0.0, 0.0));
        assert_eq!(controller.location(), Vec3::new(-4.0, 0.0, 0.0));

        controller.play();
        assert!(controller.is_playing());
    }
}
