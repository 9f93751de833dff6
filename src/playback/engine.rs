use super::sink::SharedSink;
use super::state::PlaybackState;
use crate::events::{MidiSequence, TrackRef};
use arc_swap::ArcSwap;
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::warn;

/// Position snapshots are published at most once per this much sequence
/// time, independent of event density.
const PROGRESS_EMIT_MS: i64 = 45;

/// The playback transport. Walks a decoded sequence on a worker thread,
/// pacing sink sends by event timestamps. At most one session is alive
/// per player; `play`, `pause`, `seek_to` and `stop` cancel the in-flight
/// wait and join the worker before returning, so no stale sends or state
/// publications can happen afterwards.
pub struct MidiPlayer {
    state: Arc<ArcSwap<PlaybackState>>,
    session: Option<PlaybackSession>,
    loaded: Option<LoadedTrack>,
}

struct LoadedTrack {
    sequence: Arc<MidiSequence>,
    track: TrackRef,
}

struct PlaybackSession {
    cancel_tx: Sender<()>,
    handle: JoinHandle<()>,
    shared: Arc<SessionShared>,
}

struct SessionShared {
    position_ms: AtomicU64,
    finished: AtomicBool,
}

impl MidiPlayer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(ArcSwap::from_pointee(PlaybackState::Idle)),
            session: None,
            loaded: None,
        }
    }

    /// Cloneable handle for readers polling the current snapshot.
    pub fn state_handle(&self) -> Arc<ArcSwap<PlaybackState>> {
        self.state.clone()
    }

    pub fn state(&self) -> PlaybackState {
        (**self.state.load()).clone()
    }

    pub fn play(&mut self, sequence: Arc<MidiSequence>, sink: SharedSink, track: TrackRef) {
        self.cancel_session();
        self.loaded = Some(LoadedTrack {
            sequence,
            track,
        });
        self.start_from(0, sink);
    }

    /// Captures the current position and halts. No-op unless playing.
    pub fn pause(&mut self) {
        if !self.state.load().is_playing() {
            return;
        }
        let Some(shared) = self.cancel_session() else {
            return;
        };
        if shared.finished.load(Ordering::Acquire) {
            // the session reached a terminal state on its own
            return;
        }
        if let Some(loaded) = &self.loaded {
            self.state.store(Arc::new(PlaybackState::Paused {
                track: loaded.track.clone(),
                position_ms: shared.position_ms.load(Ordering::Acquire),
                duration_ms: loaded.sequence.duration_ms,
            }));
        }
    }

    /// Re-enters playback from the paused position. Events earlier than
    /// the position are dropped; already-elapsed time is not re-waited.
    pub fn resume(&mut self, sink: SharedSink) {
        let PlaybackState::Paused { position_ms, .. } = self.state() else {
            return;
        };
        self.cancel_session();
        self.start_from(position_ms, sink);
    }

    /// Re-enters playback from an explicit position, clamped to the
    /// sequence duration. No-op when nothing is loaded.
    pub fn seek_to(&mut self, position_ms: u64, sink: SharedSink) {
        let Some(loaded) = &self.loaded else {
            return;
        };
        let target = position_ms.min(loaded.sequence.duration_ms);
        self.cancel_session();
        self.start_from(target, sink);
    }

    pub fn stop(&mut self) {
        self.cancel_session();
        self.loaded = None;
        self.state.store(Arc::new(PlaybackState::Idle));
    }

    fn start_from(&mut self, start_ms: u64, sink: SharedSink) {
        let Some(loaded) = &self.loaded else {
            return;
        };
        let sequence = loaded.sequence.clone();
        let track = loaded.track.clone();
        let duration_ms = sequence.duration_ms;
        self.state.store(Arc::new(PlaybackState::Playing {
            track: track.clone(),
            position_ms: start_ms,
            duration_ms,
        }));
        let shared = Arc::new(SessionShared {
            position_ms: AtomicU64::new(start_ms),
            finished: AtomicBool::new(false),
        });
        let (cancel_tx, cancel_rx) = bounded(1);
        let state = self.state.clone();
        let session_shared = shared.clone();
        let handle = std::thread::spawn(move || {
            run_session(
                sequence,
                track,
                start_ms,
                sink,
                state,
                session_shared,
                cancel_rx,
            );
        });
        self.session = Some(PlaybackSession {
            cancel_tx,
            handle,
            shared,
        });
    }

    /// Signals the worker and joins it. Synchronous: once this returns the
    /// session can neither send nor publish.
    fn cancel_session(&mut self) -> Option<Arc<SessionShared>> {
        let session = self.session.take()?;
        let _ = session.cancel_tx.try_send(());
        if session.handle.join().is_err() {
            warn!("playback session thread panicked");
        }
        Some(session.shared)
    }
}

impl Default for MidiPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MidiPlayer {
    fn drop(&mut self) {
        self.cancel_session();
    }
}

fn run_session(
    sequence: Arc<MidiSequence>,
    track: TrackRef,
    start_ms: u64,
    sink: SharedSink,
    state: Arc<ArcSwap<PlaybackState>>,
    shared: Arc<SessionShared>,
    cancel_rx: Receiver<()>,
) {
    let duration_ms = sequence.duration_ms;
    let mut last_sent_ms = start_ms;
    let mut last_emit_ms: i64 = -1;
    for event in sequence
        .events
        .iter()
        .filter(|event| event.timestamp_ms >= start_ms)
    {
        let wait_ms = event.timestamp_ms.saturating_sub(last_sent_ms);
        if wait_ms > 0 {
            match cancel_rx.recv_timeout(Duration::from_millis(wait_ms)) {
                Err(RecvTimeoutError::Timeout) => {}
                // cancelled, or the controller went away mid-wait
                _ => return,
            }
        } else if cancelled(&cancel_rx) {
            return;
        }
        if let Err(error) = sink.send(&event.data) {
            state.store(Arc::new(PlaybackState::Error {
                track: track.clone(),
                message: error.to_string(),
            }));
            shared.finished.store(true, Ordering::Release);
            return;
        }
        last_sent_ms = event.timestamp_ms;
        let position_ms = event.timestamp_ms.min(duration_ms);
        shared.position_ms.store(position_ms, Ordering::Release);
        if event.timestamp_ms as i64 - last_emit_ms >= PROGRESS_EMIT_MS {
            state.store(Arc::new(PlaybackState::Playing {
                track: track.clone(),
                position_ms,
                duration_ms,
            }));
            last_emit_ms = event.timestamp_ms as i64;
        }
    }
    state.store(Arc::new(PlaybackState::Completed { track }));
    shared.finished.store(true, Ordering::Release);
}

fn cancelled(cancel_rx: &Receiver<()>) -> bool {
    !matches!(cancel_rx.try_recv(), Err(TryRecvError::Empty))
}
