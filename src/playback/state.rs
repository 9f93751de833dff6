use crate::events::TrackRef;

/// Snapshot of the playback transport. Owned by [`super::MidiPlayer`],
/// published as an atomically replaced immutable value; exactly one
/// variant is active at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing {
        track: TrackRef,
        position_ms: u64,
        duration_ms: u64,
    },
    Paused {
        track: TrackRef,
        position_ms: u64,
        duration_ms: u64,
    },
    Completed {
        track: TrackRef,
    },
    Error {
        track: TrackRef,
        message: String,
    },
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, PlaybackState::Paused { .. })
    }

    pub fn position_ms(&self) -> Option<u64> {
        match self {
            PlaybackState::Playing { position_ms, .. }
            | PlaybackState::Paused { position_ms, .. } => Some(*position_ms),
            _ => None,
        }
    }

    pub fn track(&self) -> Option<&TrackRef> {
        match self {
            PlaybackState::Idle => None,
            PlaybackState::Playing { track, .. }
            | PlaybackState::Paused { track, .. }
            | PlaybackState::Completed { track }
            | PlaybackState::Error { track, .. } => Some(track),
        }
    }
}
