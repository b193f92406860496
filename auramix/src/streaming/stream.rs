use super::decoder::{StreamDecoder, StreamInfo};
use super::symphonia_decoder::SymphoniaDecoder;
use crate::audio_data::{Channel, Wave};
use crate::error::{AuramixError, Result};
use crate::source::{SeekResult, Source};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use symphonia::core::io::MediaSource;

/// Number of rolling windows per stream.
pub const WINDOW_COUNT: usize = 3;

/// Frame range `[beg, end)` held by one window. Empty when `beg == end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct WindowRange {
    pub beg: usize,
    pub end: usize,
}

impl WindowRange {
    pub fn contains(&self, frame: usize) -> bool {
        self.beg <= frame && frame < self.end
    }
}

/// State of an in-flight seek as seen by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingSeek {
    pub target: usize,
    pub complete: bool,
}

/// What the stream thread should do next for one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefillPlan {
    Idle,
    /// A window already covers the seek target.
    SeekReady,
    /// Decode into `window` starting at frame `start`.
    Load {
        window: usize,
        start: usize,
        for_seek: bool,
    },
}

fn covering(ranges: &[WindowRange; WINDOW_COUNT], frame: usize) -> Option<usize> {
    ranges.iter().position(|r| r.contains(frame))
}

/// Decides the next refill step from the current window ranges.
///
/// While a seek is incomplete, one window that is neither the one being
/// played nor its successor is handed to the seek target, so playback of the
/// old position keeps going. Otherwise windows are chained forward from
/// `last` (wrapping to frame 0 at the end of the stream) and the first gap in
/// the chain is filled. A window holding a completed seek target is left alone
/// until the seek is acknowledged.
pub(crate) fn plan_refill(
    ranges: &[WindowRange; WINDOW_COUNT],
    last: usize,
    total: usize,
    seek: Option<PendingSeek>,
) -> RefillPlan {
    if total == 0 {
        return RefillPlan::Idle;
    }
    let wrap = |frame: usize| if frame >= total { 0 } else { frame };

    let mut protected = None;
    if let Some(seek) = seek {
        if seek.complete {
            protected = covering(ranges, seek.target);
        } else if covering(ranges, seek.target).is_some() {
            return RefillPlan::SeekReady;
        } else {
            let playing = covering(ranges, last);
            let successor = playing.and_then(|p| covering(ranges, wrap(ranges[p].end)));
            let window = (0..WINDOW_COUNT)
                .find(|&w| Some(w) != playing && Some(w) != successor)
                .or_else(|| (0..WINDOW_COUNT).find(|&w| Some(w) != playing));
            return match window {
                Some(window) => RefillPlan::Load {
                    window,
                    start: seek.target,
                    for_seek: true,
                },
                None => RefillPlan::Idle,
            };
        }
    }

    let mut chained = [false; WINDOW_COUNT];
    let mut needed = wrap(last);
    for _ in 0..WINDOW_COUNT {
        match covering(ranges, needed) {
            Some(w) if chained[w] => return RefillPlan::Idle,
            Some(w) => {
                chained[w] = true;
                needed = wrap(ranges[w].end);
            }
            None => {
                let free = |w: usize| !chained[w] && Some(w) != protected;
                // prefer an empty window, then the one holding the oldest audio
                let window = (0..WINDOW_COUNT)
                    .filter(|&w| free(w))
                    .min_by_key(|&w| (ranges[w].beg != ranges[w].end, ranges[w].beg));
                return match window {
                    Some(window) => RefillPlan::Load {
                        window,
                        start: needed,
                        for_seek: false,
                    },
                    None => RefillPlan::Idle,
                };
            }
        }
    }
    RefillPlan::Idle
}

struct StreamWindow {
    wave: Wave,
    range: WindowRange,
}

struct StreamLoader {
    decoder: Box<dyn StreamDecoder>,
    scratch: Wave,
}

#[derive(Debug, Default)]
struct SeekState {
    target: usize,
    seeking: bool,
    complete: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A [`Source`] that decodes a large asset piecewise into three rolling windows.
///
/// The mixer reads through [`Source::read_frame`]; the stream thread (or a
/// caller driving [`fill_buffer`](Self::fill_buffer) by hand) keeps the
/// windows ahead of playback. Decoding happens into a scratch buffer that is
/// swapped into its window under the window lock, so a read never sees a
/// half-written window.
///
/// Each stream should be played by one controller at a time.
pub struct AudioStream {
    info: StreamInfo,
    window_frames: usize,
    windows: [Mutex<StreamWindow>; WINDOW_COUNT],
    loader: Mutex<StreamLoader>,
    seek: Mutex<SeekState>,
    /// Frames the decoder can actually deliver. Starts at the advertised
    /// length and shrinks when the decoder runs dry early.
    decoded_end: AtomicUsize,
    last_frame: AtomicUsize,
    current_window: AtomicUsize,
    underruns: AtomicUsize,
    failed: AtomicBool,
    wake: OnceLock<Sender<()>>,
}

impl AudioStream {
    /// Opens `decoder` and decodes the first window before returning.
    pub fn new(decoder: impl StreamDecoder + 'static, window_frames: usize) -> Result<Self> {
        Self::from_boxed(Box::new(decoder), window_frames)
    }

    /// Streams a file through Symphonia.
    pub fn from_path(path: &str, window_frames: usize) -> Result<Self> {
        Self::new(SymphoniaDecoder::new(path), window_frames)
    }

    /// Streams encoded bytes from any seekable reader through Symphonia.
    pub fn from_reader(
        source: Box<dyn MediaSource>,
        extension: Option<&str>,
        window_frames: usize,
    ) -> Result<Self> {
        Self::new(SymphoniaDecoder::from_reader(source, extension), window_frames)
    }

    pub fn from_boxed(mut decoder: Box<dyn StreamDecoder>, window_frames: usize) -> Result<Self> {
        if window_frames == 0 {
            return Err(AuramixError::Configuration(
                "Stream window size must be greater than 0".to_string(),
            ));
        }

        let info = decoder.decode_start()?;
        if info.sample_rate == 0 || info.channels.is_empty() {
            return Err(AuramixError::Stream(format!(
                "Unsupported stream layout: {} Hz, {} channels",
                info.sample_rate,
                info.channels.len()
            )));
        }

        let (rate, channels) = (info.sample_rate, info.channels.clone());
        let new_wave = || Wave::new(window_frames, rate, channels.clone());
        let mut first = new_wave();
        let written = decoder.decode_some(&mut first, 0)?;
        let decoded_end = if written < window_frames.min(info.total_frames) {
            log::warn!(
                "Stream ends at frame {} but advertises {}",
                written,
                info.total_frames
            );
            written
        } else {
            info.total_frames
        };

        let stream = Self {
            window_frames,
            windows: [
                Mutex::new(StreamWindow {
                    wave: first,
                    range: WindowRange {
                        beg: 0,
                        end: written,
                    },
                }),
                Mutex::new(StreamWindow {
                    wave: new_wave(),
                    range: WindowRange::default(),
                }),
                Mutex::new(StreamWindow {
                    wave: new_wave(),
                    range: WindowRange::default(),
                }),
            ],
            loader: Mutex::new(StreamLoader {
                decoder,
                scratch: new_wave(),
            }),
            seek: Mutex::new(SeekState::default()),
            decoded_end: AtomicUsize::new(decoded_end),
            last_frame: AtomicUsize::new(0),
            current_window: AtomicUsize::new(0),
            underruns: AtomicUsize::new(0),
            failed: AtomicBool::new(false),
            wake: OnceLock::new(),
            info,
        };
        Ok(stream)
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn window_frames(&self) -> usize {
        self.window_frames
    }

    /// Number of reads of a frame that no window held.
    pub fn underruns(&self) -> usize {
        self.underruns.load(Ordering::Relaxed)
    }

    /// `[beg, end)` of every window.
    pub fn window_ranges(&self) -> [(usize, usize); WINDOW_COUNT] {
        self.ranges().map(|r| (r.beg, r.end))
    }

    fn end(&self) -> usize {
        self.decoded_end.load(Ordering::Relaxed)
    }

    fn ranges(&self) -> [WindowRange; WINDOW_COUNT] {
        [0, 1, 2].map(|w| lock(&self.windows[w]).range)
    }

    pub(crate) fn set_waker(&self, wake: Sender<()>) {
        let _ = self.wake.set(wake);
    }

    fn wake(&self) {
        if let Some(wake) = self.wake.get() {
            let _ = wake.try_send(());
        }
    }

    fn pending_seek(&self) -> Option<PendingSeek> {
        let seek = lock(&self.seek);
        seek.seeking.then_some(PendingSeek {
            target: seek.target,
            complete: seek.complete,
        })
    }

    /// Runs one refill step. Returns `true` if anything changed, so the
    /// caller knows whether to call again.
    pub fn fill_buffer(&self) -> bool {
        if self.failed.load(Ordering::Relaxed) {
            return false;
        }
        let mut loader = lock(&self.loader);
        let end = self.end();

        {
            let mut seek = lock(&self.seek);
            if seek.seeking && !seek.complete && seek.target >= end {
                log::warn!(
                    "Seek to frame {} is past the end of the stream ({})",
                    seek.target,
                    end
                );
                *seek = SeekState::default();
                return true;
            }
        }

        let plan = plan_refill(
            &self.ranges(),
            self.last_frame.load(Ordering::Relaxed),
            end,
            self.pending_seek(),
        );

        match plan {
            RefillPlan::Idle => false,
            RefillPlan::SeekReady => {
                let mut seek = lock(&self.seek);
                seek.complete = true;
                log::trace!("Seek to frame {} already buffered", seek.target);
                true
            }
            RefillPlan::Load {
                window,
                start,
                for_seek,
            } => {
                let StreamLoader { decoder, scratch } = &mut *loader;
                let written = match decoder.decode_some(scratch, start) {
                    Ok(written) => written,
                    Err(e) => {
                        log::error!("Stream decode failed at frame {}: {}", start, e);
                        self.failed.store(true, Ordering::Relaxed);
                        return false;
                    }
                };

                {
                    let mut slot = lock(&self.windows[window]);
                    std::mem::swap(&mut slot.wave, scratch);
                    slot.range = WindowRange {
                        beg: start,
                        end: start + written,
                    };
                }
                log::trace!(
                    "Window {} now holds frames {}..{}",
                    window,
                    start,
                    start + written
                );

                // a short read marks the real end, so the chain wraps there
                // instead of asking for the same frames again
                if written < self.window_frames.min(end.saturating_sub(start)) {
                    log::warn!(
                        "Stream ends at frame {} but advertises {}",
                        start + written,
                        self.info.total_frames
                    );
                    self.decoded_end.fetch_min(start + written, Ordering::Relaxed);
                }

                if for_seek {
                    let mut seek = lock(&self.seek);
                    if seek.seeking && start <= seek.target && seek.target < start + written {
                        seek.complete = true;
                        log::debug!("Seek to frame {} ready", seek.target);
                    }
                }
                true
            }
        }
    }
}

impl Source for AudioStream {
    fn size(&self) -> usize {
        self.end()
    }

    fn channel_count(&self) -> usize {
        self.info.channels.len()
    }

    fn channel_type(&self, index: usize) -> Channel {
        self.info.channels.get(index).copied().unwrap_or(Channel::Unknown)
    }

    fn sample_rate(&self) -> u32 {
        self.info.sample_rate
    }

    fn read_frame(&self, frame: usize, out: &mut [f32]) -> bool {
        if frame >= self.end() {
            return false;
        }
        self.last_frame.store(frame, Ordering::Relaxed);

        let current = self.current_window.load(Ordering::Relaxed);
        let order = [current, (current + 1) % WINDOW_COUNT, (current + 2) % WINDOW_COUNT];
        for w in order {
            let window = lock(&self.windows[w]);
            if !window.range.contains(frame) {
                continue;
            }
            let src = window.wave.frame(frame - window.range.beg);
            let n = src.len().min(out.len());
            out[..n].copy_from_slice(&src[..n]);
            drop(window);

            if w != current {
                self.current_window.store(w, Ordering::Relaxed);
                self.wake();
            }
            return true;
        }

        self.underruns.fetch_add(1, Ordering::Relaxed);
        self.wake();
        false
    }

    fn start_seeking(&self, target: usize) -> SeekResult {
        if target >= self.end() {
            return SeekResult::Failed;
        }

        let mut seek = lock(&self.seek);
        if covering(&self.ranges(), target).is_some() {
            *seek = SeekState::default();
            self.last_frame.store(target, Ordering::Relaxed);
            return SeekResult::Done;
        }

        *seek = SeekState {
            target,
            seeking: true,
            complete: false,
        };
        drop(seek);
        self.wake();
        SeekResult::Pending
    }

    fn is_seeking(&self) -> bool {
        lock(&self.seek).seeking
    }

    fn is_seek_complete(&self) -> bool {
        let seek = lock(&self.seek);
        seek.seeking && seek.complete
    }

    fn seek_target(&self) -> usize {
        lock(&self.seek).target
    }

    fn seeking_done(&self) {
        let mut seek = lock(&self.seek);
        if seek.seeking {
            self.last_frame.store(seek.target, Ordering::Relaxed);
        }
        *seek = SeekState::default();
        drop(seek);
        self.wake();
    }
}
