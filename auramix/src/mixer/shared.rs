use super::routing::MAX_CHANNELS;
use crate::error::{AuramixError, Result};
use crate::playback::ControllerRegistry;
use crate::spatial::Environment;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Output-wide volume settings, applied after all voices are summed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputSettings {
    master_volume: f32,
    channel_volumes: [f32; MAX_CHANNELS],
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            master_volume: 1.0,
            channel_volumes: [1.0; MAX_CHANNELS],
        }
    }
}

impl OutputSettings {
    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn set_master_volume(&mut self, volume: f32) -> Result<()> {
        if !volume.is_finite() {
            return Err(AuramixError::Configuration(format!(
                "Master volume must be finite, got {}",
                volume
            )));
        }
        self.master_volume = volume;
        Ok(())
    }

    /// Multiplier of device channel `index`.
    pub fn channel_volume(&self, index: usize) -> f32 {
        self.channel_volumes.get(index).copied().unwrap_or(1.0)
    }

    pub fn set_channel_volume(&mut self, index: usize, volume: f32) -> Result<()> {
        if index >= MAX_CHANNELS {
            return Err(AuramixError::Configuration(format!(
                "Channel index {} out of range (0..{})",
                index, MAX_CHANNELS
            )));
        }
        if !volume.is_finite() {
            return Err(AuramixError::Configuration(format!(
                "Channel volume must be finite, got {}",
                volume
            )));
        }
        self.channel_volumes[index] = volume;
        Ok(())
    }

    /// Sets the multipliers of the first `volumes.len()` device channels.
    pub fn set_channel_volumes(&mut self, volumes: &[f32]) -> Result<()> {
        if volumes.len() > MAX_CHANNELS {
            return Err(AuramixError::Configuration(format!(
                "{} channel volumes given, at most {} supported",
                volumes.len(),
                MAX_CHANNELS
            )));
        }
        let mut updated = *self;
        for (index, volume) in volumes.iter().enumerate() {
            updated.set_channel_volume(index, *volume)?;
        }
        *self = updated;
        Ok(())
    }

    pub(crate) fn is_unity(&self, channels: usize) -> bool {
        self.master_volume == 1.0 && self.channel_volumes[..channels].iter().all(|v| *v == 1.0)
    }
}

/// State shared between the control thread and the mixing thread.
///
/// The environment and the output settings are copied out at the top of every
/// period, so changes apply from the next period on.
#[derive(Debug, Default)]
pub struct MixerShared {
    registry: ControllerRegistry,
    environment: Mutex<Environment>,
    settings: Mutex<OutputSettings>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MixerShared {
    pub fn new(registry: ControllerRegistry) -> Self {
        Self {
            registry,
            environment: Mutex::new(Environment::new()),
            settings: Mutex::new(OutputSettings::default()),
        }
    }

    pub fn registry(&self) -> &ControllerRegistry {
        &self.registry
    }

    pub fn environment(&self) -> Environment {
        *lock(&self.environment)
    }

    /// Runs `f` on the environment under its lock.
    pub fn update_environment<R>(&self, f: impl FnOnce(&mut Environment) -> R) -> R {
        f(&mut lock(&self.environment))
    }

    pub fn settings(&self) -> OutputSettings {
        *lock(&self.settings)
    }

    pub fn update_settings<R>(&self, f: impl FnOnce(&mut OutputSettings) -> R) -> R {
        f(&mut lock(&self.settings))
    }
}
