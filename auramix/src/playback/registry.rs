use crate::math::Vec3;
use crate::source::Source;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Identifier of one registered controller. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VoiceId(u64);

impl VoiceId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum VoiceKind {
    Basic,
    Positional { location: Vec3 },
}

/// Playback state of one controller, owned by the registry.
///
/// Controllers write these fields from the control thread; the mixer reads and
/// advances them once per period. Both sides hold the registry lock while doing so.
pub(crate) struct Voice {
    pub(crate) id: VoiceId,
    pub(crate) kind: VoiceKind,
    pub(crate) source: Option<Arc<dyn Source>>,
    /// Playback position in seconds.
    pub(crate) position: f64,
    pub(crate) volume: f32,
    pub(crate) playing: bool,
    pub(crate) looping: bool,
    /// Target frame of a seek the source is still preparing.
    pub(crate) pending_seek: Option<usize>,
    pub(crate) routing_warned: bool,
}

impl Voice {
    fn new(id: VoiceId, kind: VoiceKind) -> Self {
        Self {
            id,
            kind,
            source: None,
            position: 0.0,
            volume: 1.0,
            playing: false,
            looping: false,
            pending_seek: None,
            routing_warned: false,
        }
    }

    pub(crate) fn length(&self) -> f64 {
        self.source.as_ref().map_or(0.0, |s| s.length())
    }

    /// Attaches `source`, rewinding to the start. A voice that was told to
    /// play while dormant starts sounding at the next period.
    pub(crate) fn attach(&mut self, source: Arc<dyn Source>) {
        self.source = Some(source);
        self.position = 0.0;
        self.pending_seek = None;
        self.routing_warned = false;
    }

    pub(crate) fn detach(&mut self) -> Option<Arc<dyn Source>> {
        self.pending_seek = None;
        self.source.take()
    }
}

impl fmt::Debug for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Voice")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("has_source", &self.source.is_some())
            .field("position", &self.position)
            .field("volume", &self.volume)
            .field("playing", &self.playing)
            .field("looping", &self.looping)
            .field("pending_seek", &self.pending_seek)
            .finish()
    }
}

/// Voices in registration order. Ids are handed out under the same lock, so
/// the list stays sorted by id and lookups can binary search.
#[derive(Debug, Default)]
pub(crate) struct VoiceTable {
    next_id: u64,
    voices: Vec<Voice>,
}

impl VoiceTable {
    fn insert(&mut self, kind: VoiceKind) -> VoiceId {
        let id = VoiceId(self.next_id);
        self.next_id += 1;
        self.voices.push(Voice::new(id, kind));
        id
    }

    fn remove(&mut self, id: VoiceId) {
        if let Ok(index) = self.voices.binary_search_by_key(&id, |v| v.id) {
            self.voices.remove(index);
        }
    }

    pub(crate) fn get_mut(&mut self, id: VoiceId) -> Option<&mut Voice> {
        match self.voices.binary_search_by_key(&id, |v| v.id) {
            Ok(index) => Some(&mut self.voices[index]),
            Err(_) => None,
        }
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Voice> {
        self.voices.iter_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.voices.len()
    }
}

#[derive(Debug, Default)]
pub(crate) struct RegistryInner {
    table: Mutex<VoiceTable>,
}

impl RegistryInner {
    /// Takes the collection lock, recovering from a poisoned mutex.
    pub(crate) fn lock(&self) -> MutexGuard<'_, VoiceTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The shared controller collection.
///
/// Controllers register here on construction and deregister when dropped. The
/// mixer scans it once per period under its lock, which is the only lock that
/// guards playback state.
#[derive(Debug, Clone, Default)]
pub struct ControllerRegistry {
    inner: Arc<RegistryInner>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live controllers.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, VoiceTable> {
        self.inner.lock()
    }

    #[cfg(test)]
    pub(crate) fn is_locked(&self) -> bool {
        matches!(
            self.inner.table.try_lock(),
            Err(std::sync::TryLockError::WouldBlock)
        )
    }

    pub(crate) fn register(&self, kind: VoiceKind) -> (VoiceId, Weak<RegistryInner>) {
        let id = self.inner.lock().insert(kind);
        log::debug!("Registered {} ({:?})", id, kind);
        (id, Arc::downgrade(&self.inner))
    }
}

pub(crate) fn deregister(registry: &Weak<RegistryInner>, id: VoiceId) {
    if let Some(inner) = registry.upgrade() {
        inner.lock().remove(id);
        log::debug!("Deregistered {}", id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sorted_and_unique() {
        let registry = ControllerRegistry::new();
        let (a, _) = registry.register(VoiceKind::Basic);
        let (b, _) = registry.register(VoiceKind::Basic);
        let (c, weak) = registry.register(VoiceKind::Positional {
            location: Vec3::ONE,
        });
        assert!(a < b && b < c);
        assert_eq!(registry.len(), 3);

        deregister(&weak, b);
        assert_eq!(registry.len(), 2);
        let mut table = registry.lock();
        assert!(table.get_mut(b).is_none());
        assert_eq!(
            table.get_mut(c).map(|v| v.kind),
            Some(VoiceKind::Positional {
                location: Vec3::ONE,
            })
        );
    }

    #[test]
    fn test_deregister_after_registry_dropped() {
        let registry = ControllerRegistry::new();
        let (id, weak) = registry.register(VoiceKind::Basic);
        drop(registry);
        deregister(&weak, id);
    }

    #[test]
    fn test_new_voice_defaults() {
        let registry = ControllerRegistry::new();
        let (id, _) = registry.register(VoiceKind::Basic);
        let mut table = registry.lock();
        let voice = table.get_mut(id).unwrap();
        assert_eq!(voice.volume, 1.0);
        assert!(!voice.playing);
        assert!(voice.source.is_none());
        assert_eq!(voice.length(), 0.0);
    }
}
