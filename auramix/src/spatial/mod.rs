//! Listener and speaker model plus the panning math built on top of it.

mod environment;
pub mod panning;

pub use environment::{Environment, Listener, SPEAKER_COUNT, Speaker};
