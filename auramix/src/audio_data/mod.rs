//! Sample buffers, channel roles and whole-file loading.

mod channel;
mod default_loader;
mod load_options;
mod loader;
mod resampler;
mod wave;

pub use channel::{Channel, find_channel};
pub use default_loader::DefaultAudioLoader;
pub(crate) use default_loader::{channel_roles, detect_format, open_format};
pub use load_options::{ConvertToMono, LoadOptions};
pub use loader::AudioDataLoader;
pub use resampler::AudioResampler;
pub use wave::Wave;

use crate::error::Result;

impl Wave {
    /// Loads a whole file with the default Symphonia loader.
    pub fn from_path(path: &str) -> Result<Self> {
        DefaultAudioLoader.load(path, &LoadOptions::default())
    }

    /// Loads a whole file with the default loader and custom options.
    pub fn from_path_with_options(path: &str, options: &LoadOptions) -> Result<Self> {
        DefaultAudioLoader.load(path, options)
    }

    /// Loads a whole file with a caller-provided loader.
    pub fn from_path_with_loader<L: AudioDataLoader>(
        path: &str,
        loader: &L,
        options: &LoadOptions,
    ) -> Result<Self> {
        loader.load(path, options)
    }
}
