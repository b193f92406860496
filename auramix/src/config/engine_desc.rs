use crate::error::{AuramixError, Result};
use std::time::Duration;

/// Configuration descriptor for an [`AudioEngine`](crate::AudioEngine)
#[derive(Debug, Clone)]
pub struct EngineDesc {
    /// Frames mixed per period.
    pub period_size: usize,
    /// Device ring-buffer depth, in periods.
    pub ring_buffer_periods: usize,
    /// Frames per streaming window.
    pub stream_window_frames: usize,
    /// How long the stream thread idles between refill scans.
    pub stream_poll_interval: Duration,
    /// Ask the OS to run the mixing thread at real-time priority.
    pub realtime_priority: bool,
    /// Capacity of the event queue; events are dropped when it is full.
    pub event_capacity: usize,
}

impl Default for EngineDesc {
    fn default() -> Self {
        Self {
            period_size: 512,
            ring_buffer_periods: 4,
            stream_window_frames: 8 * 1024,
            stream_poll_interval: Duration::from_millis(10),
            realtime_priority: true,
            event_capacity: 1024,
        }
    }
}

impl EngineDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn period_size(mut self, frames: usize) -> Self {
        self.period_size = frames;
        self
    }

    pub fn ring_buffer_periods(mut self, periods: usize) -> Self {
        self.ring_buffer_periods = periods;
        self
    }

    pub fn stream_window_frames(mut self, frames: usize) -> Self {
        self.stream_window_frames = frames;
        self
    }

    pub fn stream_poll_interval(mut self, interval: Duration) -> Self {
        self.stream_poll_interval = interval;
        self
    }

    pub fn realtime_priority(mut self, enabled: bool) -> Self {
        self.realtime_priority = enabled;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.period_size == 0 {
            return Err(AuramixError::Configuration(
                "Period size must be greater than 0".to_string(),
            ));
        }
        if self.ring_buffer_periods == 0 {
            return Err(AuramixError::Configuration(
                "Ring buffer must hold at least one period".to_string(),
            ));
        }
        if self.stream_window_frames == 0 {
            return Err(AuramixError::Configuration(
                "Stream window size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let desc = EngineDesc::default();
        assert_eq!(desc.period_size, 512);
        assert_eq!(desc.stream_window_frames, 8192);
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn test_builder_and_validation() {
        let desc = EngineDesc::new().period_size(256).realtime_priority(false);
        assert_eq!(desc.period_size, 256);
        assert!(!desc.realtime_priority);
        assert!(EngineDesc::new().period_size(0).validate().is_err());
        assert!(EngineDesc::new().stream_window_frames(0).validate().is_err());
    }
}
