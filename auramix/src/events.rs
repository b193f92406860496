//! Event types reported by the mixing thread.

use crate::playback::VoiceId;

#[derive(Debug, Clone, PartialEq)]
pub enum AuramixEvent {
    /// A non-looping voice reached the end of its source and stopped.
    VoiceFinished {
        voice: VoiceId,
    },
    /// A looping voice wrapped around to the start.
    VoiceLooped {
        voice: VoiceId,
    },
    /// The voice asked its source for a frame that was not available.
    StreamUnderrun {
        voice: VoiceId,
    },
    /// The voice's source was unusable and has been detached.
    SourceDetached {
        voice: VoiceId,
        reason: &'static str,
    },
    EngineStarted,
    EngineStopped,
    EngineError {
        error: String,
    },
}

impl AuramixEvent {
    pub fn voice(&self) -> Option<VoiceId> {
        match self {
            Self::VoiceFinished { voice }
            | Self::VoiceLooped { voice }
            | Self::StreamUnderrun { voice }
            | Self::SourceDetached { voice, .. } => Some(*voice),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::StreamUnderrun { .. } | Self::SourceDetached { .. } | Self::EngineError { .. }
        )
    }
}
