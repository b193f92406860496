use super::stream::{AudioStream, WINDOW_COUNT};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

/// Refill passes over all streams before the attached list is read again.
const PASSES_PER_ROUND: usize = WINDOW_COUNT + 1;

struct ManagerShared {
    streams: Mutex<Vec<Weak<AudioStream>>>,
    stop: AtomicBool,
}

/// Owns the background thread that keeps every attached stream's windows
/// ahead of playback.
///
/// Streams are held weakly: dropping the last `Arc<AudioStream>` detaches it.
/// The thread sleeps until a stream signals (seek started, playback moved to
/// another window, underrun) or the poll interval elapses.
pub struct StreamManager {
    shared: Arc<ManagerShared>,
    wake: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl StreamManager {
    pub fn new(poll_interval: Duration) -> Self {
        let (wake, signals) = bounded(1);
        let shared = Arc::new(ManagerShared {
            streams: Mutex::new(Vec::new()),
            stop: AtomicBool::new(false),
        });

        let thread_shared = shared.clone();
        let thread = std::thread::Builder::new()
            .name("auramix-stream".to_string())
            .spawn(move || run(thread_shared, signals, poll_interval))
            .map_err(|e| log::error!("Failed to spawn stream thread: {}", e))
            .ok();

        Self {
            shared,
            wake,
            thread,
        }
    }

    /// Starts refilling `stream` in the background.
    pub fn attach(&self, stream: &Arc<AudioStream>) {
        stream.set_waker(self.wake.clone());
        self.shared
            .streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(stream));
        let _ = self.wake.try_send(());
    }

    /// Number of attached streams still alive.
    pub fn stream_count(&self) -> usize {
        self.shared
            .streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.strong_count() > 0)
            .count()
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        let _ = self.wake.try_send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Stream thread panicked");
            }
        }
    }
}

fn run(shared: Arc<ManagerShared>, signals: Receiver<()>, poll_interval: Duration) {
    log::debug!("Stream thread started");
    let mut live = Vec::new();

    while !shared.stop.load(Ordering::Relaxed) {
        live.clear();
        {
            let mut streams = shared.streams.lock().unwrap_or_else(PoisonError::into_inner);
            streams.retain(|s| s.strong_count() > 0);
            live.extend(streams.iter().filter_map(Weak::upgrade));
        }

        // a few passes per round, then re-read the list so newly attached
        // streams are served even while others still have work
        let mut passes = 0;
        let busy = loop {
            let mut busy = false;
            for stream in &live {
                busy |= stream.fill_buffer();
            }
            passes += 1;
            if !busy || passes == PASSES_PER_ROUND || shared.stop.load(Ordering::Relaxed) {
                break busy;
            }
        };
        live.clear();
        if busy {
            continue;
        }

        match signals.recv_timeout(poll_interval) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::debug!("Stream thread stopped");
}
