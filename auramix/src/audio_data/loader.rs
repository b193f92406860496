use crate::audio_data::{LoadOptions, Wave};
use crate::error::Result;

/// Loads a whole audio file into memory.
///
/// Auramix ships a Symphonia based [`DefaultAudioLoader`](super::DefaultAudioLoader);
/// implement this trait to plug in another decoder.
pub trait AudioDataLoader {
    /// Decodes `path` completely into a [`Wave`].
    fn load(&self, path: &str, options: &LoadOptions) -> Result<Wave>;
}
