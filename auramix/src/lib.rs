//! Real-time positional audio mixing.
//!
//! An [`AudioEngine`] owns a mixing thread that pulls frames from every
//! playing controller, pans positional voices for the current listener and
//! device layout, and pushes the result to an [`AudioBackend`]. Sources are
//! either fully decoded [`Wave`]s or [`AudioStream`]s refilled in the
//! background.

pub mod audio_data;
pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod math;
pub mod mixer;
pub mod playback;
pub mod source;
pub mod spatial;
pub mod streaming;

pub use audio_data::{Channel, Wave};
pub use backend::{AudioBackend, CaptureBackend, Device, SampleFormat};
pub use config::EngineDesc;
pub use engine::AudioEngine;
pub use error::{AuramixError, Result};
pub use events::AuramixEvent;
pub use math::Vec3;
pub use mixer::{Mixer, MixerShared, OutputSettings, PeriodOutcome};
pub use playback::{BasicController, ControllerRegistry, PositionalController, VoiceId};
pub use source::{SeekResult, Source};
pub use spatial::{Environment, Speaker};
pub use streaming::{AudioStream, StreamDecoder, StreamManager, SymphoniaDecoder, WaveDecoder};
