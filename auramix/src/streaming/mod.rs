//! Live sources over assets too large to decode up front.
//!
//! - [`StreamDecoder`]: incremental decode capability ([`SymphoniaDecoder`], [`WaveDecoder`])
//! - [`AudioStream`]: the triple-window [`Source`](crate::Source)
//! - [`StreamManager`]: the background thread refilling attached streams

mod decoder;
mod manager;
mod stream;
mod symphonia_decoder;

pub use decoder::{StreamDecoder, StreamInfo, WaveDecoder};
#[cfg(test)]
pub(crate) use decoder::TruncatedDecoder;
pub use manager::StreamManager;
pub use stream::{AudioStream, WINDOW_COUNT};
pub use symphonia_decoder::SymphoniaDecoder;
