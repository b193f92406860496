use crate::backend::cpal_backend::{self, CpalOutput};
use crate::backend::{AudioBackend, Device};
use crate::config::EngineDesc;
use crate::error::{AuramixError, Result};
use crate::events::AuramixEvent;
use crate::mixer::{Mixer, MixerShared, OutputSettings, PeriodOutcome};
use crate::playback::ControllerRegistry;
use crate::spatial::Environment;
use crate::streaming::{AudioStream, StreamManager};
use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Consecutive skipped periods after which the mixing thread sleeps instead
/// of yielding.
const SKIPS_BEFORE_SLEEP: u32 = 8;

/// Owns the mixing thread, the output device and the stream thread.
///
/// Controllers, the environment and output settings live in shared state that
/// survives `stop`/`start` cycles, so a device can be reopened without
/// rebuilding the scene.
pub struct AudioEngine {
    desc: EngineDesc,
    shared: Arc<MixerShared>,
    streams: StreamManager,
    events_tx: Sender<AuramixEvent>,
    events_rx: Receiver<AuramixEvent>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    output: Option<CpalOutput>,
    device: Option<Device>,
    available: bool,
}

impl AudioEngine {
    pub fn new(desc: EngineDesc) -> Result<Self> {
        desc.validate()?;
        let (events_tx, events_rx) = bounded(desc.event_capacity.max(1));

        Ok(Self {
            shared: Arc::new(MixerShared::new(ControllerRegistry::new())),
            streams: StreamManager::new(desc.stream_poll_interval),
            events_tx,
            events_rx,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
            output: None,
            device: None,
            available: true,
            desc,
        })
    }

    /// Opens the default output device and starts mixing.
    ///
    /// A missing or broken device is not an error: it is logged, reported as
    /// an [`AuramixEvent::EngineError`] and [`is_available`](Self::is_available)
    /// turns false. Controllers keep working, they are just not heard.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        match CpalOutput::open_default(self.desc.period_size, self.desc.ring_buffer_periods) {
            Ok((output, sink)) => {
                let device = output.device().clone();
                self.output = Some(output);
                self.spawn(Box::new(sink), device)
            }
            Err(e) => {
                log::error!("Audio output unavailable: {}", e);
                self.available = false;
                self.emit(AuramixEvent::EngineError {
                    error: e.to_string(),
                });
                Ok(())
            }
        }
    }

    /// Starts mixing into a caller-provided backend.
    pub fn start_with_backend(
        &mut self,
        backend: Box<dyn AudioBackend>,
        device: Device,
    ) -> Result<()> {
        if self.is_running() {
            return Err(AuramixError::Engine("Engine is already running".to_string()));
        }
        self.spawn(backend, device)
    }

    fn spawn(&mut self, mut backend: Box<dyn AudioBackend>, device: Device) -> Result<()> {
        let mut mixer = Mixer::new(self.shared.clone(), device.clone(), self.desc.period_size)?
            .with_events(self.events_tx.clone());

        let running = self.running.clone();
        running.store(true, Ordering::Relaxed);
        let realtime = self.desc.realtime_priority;
        let period = self.desc.period_size;
        let sample_rate = device.sample_rate;

        let thread = std::thread::Builder::new()
            .name("auramix-mixer".to_string())
            .spawn(move || {
                let priority = if realtime {
                    promote(period, sample_rate)
                } else {
                    None
                };
                run_mixer(&mut mixer, backend.as_mut(), &running, period, sample_rate);
                if let Some(handle) = priority {
                    demote(handle);
                }
                log::debug!("Mixing thread finished: {:?}", mixer.stats());
            })
            .map_err(|e| {
                self.running.store(false, Ordering::Relaxed);
                AuramixError::Engine(format!("Failed to spawn mixing thread: {}", e))
            })?;

        log::info!(
            "Engine started on {} ({} Hz, {} channels, {} frames per period)",
            device.name,
            device.sample_rate,
            device.channel_count(),
            period
        );
        self.thread = Some(thread);
        self.device = Some(device);
        self.available = true;
        self.emit(AuramixEvent::EngineStarted);
        Ok(())
    }

    /// Stops mixing and closes the device. Does nothing if not running.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.running.store(false, Ordering::Relaxed);
        if thread.join().is_err() {
            log::error!("Mixing thread panicked");
        }
        self.output = None;
        log::info!("Engine stopped");
        self.emit(AuramixEvent::EngineStopped);
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// False when the last [`start`](Self::start) found no usable device.
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// The device of the current or last run.
    pub fn device(&self) -> Option<&Device> {
        self.device.as_ref()
    }

    /// Output devices currently known to the system. cpal has no change
    /// notification, so call this again to notice hot-plugging.
    pub fn devices(&self) -> Result<Vec<Device>> {
        cpal_backend::enumerate_devices()
    }

    pub fn desc(&self) -> &EngineDesc {
        &self.desc
    }

    /// The collection controllers register with.
    pub fn registry(&self) -> &ControllerRegistry {
        self.shared.registry()
    }

    pub fn shared(&self) -> &Arc<MixerShared> {
        &self.shared
    }

    /// Drains every event reported since the last call.
    pub fn poll_events(&self) -> Vec<AuramixEvent> {
        self.events_rx.try_iter().collect()
    }

    pub fn environment(&self) -> Environment {
        self.shared.environment()
    }

    /// Changes the environment; the mixer picks it up at the next period.
    pub fn update_environment<R>(&self, f: impl FnOnce(&mut Environment) -> R) -> R {
        self.shared.update_environment(f)
    }

    pub fn settings(&self) -> OutputSettings {
        self.shared.settings()
    }

    pub fn set_master_volume(&self, volume: f32) -> Result<()> {
        self.shared.update_settings(|s| s.set_master_volume(volume))
    }

    /// Sets one multiplier per device channel.
    pub fn set_channel_volumes(&self, volumes: &[f32]) -> Result<()> {
        if let Some(device) = &self.device {
            if volumes.len() != device.channel_count() {
                return Err(AuramixError::Configuration(format!(
                    "{} channel volumes given, device {} has {} channels",
                    volumes.len(),
                    device.name,
                    device.channel_count()
                )));
            }
        }
        self.shared.update_settings(|s| s.set_channel_volumes(volumes))
    }

    /// Opens `path` as a stream refilled by the engine's stream thread.
    pub fn open_stream(&self, path: &str) -> Result<Arc<AudioStream>> {
        let stream = AudioStream::from_path(path, self.desc.stream_window_frames)?;
        Ok(self.attach_stream(stream))
    }

    /// Hands an already opened stream to the stream thread.
    pub fn attach_stream(&self, stream: AudioStream) -> Arc<AudioStream> {
        let stream = Arc::new(stream);
        self.streams.attach(&stream);
        stream
    }

    fn emit(&self, event: AuramixEvent) {
        let _ = self.events_tx.try_send(event);
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn promote(period: usize, sample_rate: u32) -> Option<audio_thread_priority::RtPriorityHandle> {
    match audio_thread_priority::promote_current_thread_to_real_time(period as u32, sample_rate) {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::warn!("Mixing thread keeps normal priority: {:?}", e);
            None
        }
    }
}

fn demote(handle: audio_thread_priority::RtPriorityHandle) {
    if let Err(e) = audio_thread_priority::demote_current_thread_from_real_time(handle) {
        log::debug!("Failed to demote mixing thread: {:?}", e);
    }
}

fn run_mixer(
    mixer: &mut Mixer,
    backend: &mut dyn AudioBackend,
    running: &AtomicBool,
    period: usize,
    sample_rate: u32,
) {
    let backoff = Duration::from_secs_f64(period as f64 / sample_rate as f64 / 4.0);
    let mut skips = 0u32;

    while running.load(Ordering::Relaxed) {
        match mixer.mix_period(backend) {
            PeriodOutcome::Mixed(_) => skips = 0,
            PeriodOutcome::Skipped => {
                skips = skips.saturating_add(1);
                if skips < SKIPS_BEFORE_SLEEP {
                    std::thread::yield_now();
                } else {
                    std::thread::sleep(backoff);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_data::{Channel, Wave};
    use crate::backend::CaptureBackend;
    use crate::playback::BasicController;
    use crate::streaming::WaveDecoder;
    use std::time::Instant;

    fn test_engine() -> AudioEngine {
        AudioEngine::new(EngineDesc::new().period_size(256).realtime_priority(false)).unwrap()
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        false
    }

    /// Accepts `periods` periods, then reports a full device forever.
    fn limited_backend(periods: usize) -> Box<dyn AudioBackend> {
        let mut backend = CaptureBackend::new(0);
        backend.script_writable(std::iter::repeat_n(256, periods));
        Box::new(backend)
    }

    #[test]
    fn test_invalid_desc_rejected() {
        assert!(AudioEngine::new(EngineDesc::new().period_size(0)).is_err());
    }

    #[test]
    fn test_mixing_thread_advances_voices() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut engine = test_engine();
        let wave = Wave::new(48000, 48000, vec![Channel::Mono]);
        let controller = BasicController::with_source(engine.registry(), Arc::new(wave));
        controller.play();

        let device = Device::virtual_device(48000, Channel::layout_for_count(2), false);
        engine.start_with_backend(limited_backend(4), device).unwrap();
        assert!(engine.is_running());
        let mono = Device::virtual_device(48000, vec![Channel::Mono], false);
        assert!(engine.start_with_backend(limited_backend(1), mono).is_err());

        let expected = 4.0 * 256.0 / 48000.0;
        assert!(wait_for(|| (controller.current_time() - expected).abs() < 1e-9));

        engine.stop();
        assert!(!engine.is_running());
        let events = engine.poll_events();
        assert_eq!(events.first(), Some(&AuramixEvent::EngineStarted));
        assert_eq!(events.last(), Some(&AuramixEvent::EngineStopped));
    }

    #[test]
    fn test_restart_keeps_controllers() {
        let mut engine = test_engine();
        let wave = Wave::new(48000, 48000, vec![Channel::Mono]);
        let controller = BasicController::with_source(engine.registry(), Arc::new(wave));
        controller.play();
        let device = Device::virtual_device(48000, vec![Channel::Mono], false);

        engine.start_with_backend(limited_backend(1), device.clone()).unwrap();
        assert!(wait_for(|| controller.current_time() > 0.0));
        engine.stop();

        engine.start_with_backend(limited_backend(1), device).unwrap();
        let expected = 2.0 * 256.0 / 48000.0;
        assert!(wait_for(|| (controller.current_time() - expected).abs() < 1e-9));
    }

    #[test]
    fn test_channel_volumes_checked_against_device() {
        let mut engine = test_engine();
        assert!(engine.set_channel_volumes(&[0.5, 0.5, 0.5]).is_ok());

        let device = Device::virtual_device(48000, Channel::layout_for_count(2), false);
        engine.start_with_backend(limited_backend(0), device).unwrap();
        assert!(engine.set_channel_volumes(&[0.5, 0.5, 0.5]).is_err());
        assert!(engine.set_channel_volumes(&[0.5, 1.0]).is_ok());
        assert_eq!(engine.settings().channel_volume(0), 0.5);
    }

    #[test]
    fn test_attached_stream_is_refilled() {
        let engine = test_engine();
        let samples = (0..1000).map(|i| i as f32).collect();
        let wave = Wave::from_samples(samples, 1000, vec![Channel::Mono]).unwrap();
        let stream = AudioStream::new(WaveDecoder::new(wave), 100).unwrap();
        let stream = engine.attach_stream(stream);
        assert!(wait_for(|| stream.window_ranges().iter().all(|(b, e)| e > b)));
    }

    #[test]
    fn test_missing_stream_file() {
        let engine = test_engine();
        assert!(engine.open_stream("does/not/exist.ogg").is_err());
    }
}
