//! Playback controllers and the shared controller collection.
//!
//! - [`BasicController`]: plays a source straight to the device channels
//! - [`PositionalController`]: plays a source from a point in space
//! - [`ControllerRegistry`]: the collection the mixer scans every period
//!
//! Controllers are handles: the playback state itself lives in the registry
//! so the mixer can read it under a single lock.

mod controller;
mod registry;

pub use controller::{BasicController, PositionalController};
pub use registry::{ControllerRegistry, VoiceId};
pub(crate) use registry::{Voice, VoiceKind, VoiceTable};
