use crate::events::{MidiEvent, MidiSequence, NoteMessage, TrackRef, classify_note};
use crate::playback::{MidiPlayer, SharedSink};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Pitches below this split point belong to the left hand.
pub const HAND_SPLIT_PITCH: u8 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandPolicy {
    Left,
    Right,
    Both,
}

/// A note the player has to supply, in original start-time order.
#[derive(Debug, Clone)]
pub struct TargetNote {
    pub pitch: u8,
    pub velocity: u8,
    pub event: MidiEvent,
}

#[derive(Debug, Clone)]
pub enum PracticeSessionState {
    Inactive,
    Active {
        target_notes: Vec<TargetNote>,
        current_index: usize,
        total: usize,
        track: TrackRef,
    },
    Completed {
        track: TrackRef,
    },
}

/// Pure projection of the session state for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PracticeProgress {
    Idle,
    Active {
        completed: usize,
        total: usize,
        next_pitch: Option<u8>,
    },
    Done {
        track_title: String,
    },
}

/// Splits the decoded note-on events by hand. The selected side becomes
/// the target queue, the complement the auto-played queue.
pub fn split_hands(sequence: &MidiSequence, hand: HandPolicy) -> (Vec<TargetNote>, Vec<TargetNote>) {
    let mut target = Vec::new();
    let mut auto = Vec::new();
    for event in &sequence.events {
        let Some(NoteMessage::On { pitch, velocity }) = classify_note(&event.data) else {
            continue;
        };
        let is_left = pitch < HAND_SPLIT_PITCH;
        let assign_to_target = match hand {
            HandPolicy::Left => is_left,
            HandPolicy::Right => !is_left,
            HandPolicy::Both => true,
        };
        let note = TargetNote {
            pitch,
            velocity,
            event: event.clone(),
        };
        if assign_to_target {
            target.push(note);
        } else {
            auto.push(note);
        }
    }
    (target, auto)
}

/// Gates playback on live input. The target queue advances only when the
/// next expected pitch arrives; matched notes are echoed to the sink so
/// the instrument sounds them. The auto queue plays through the scheduler,
/// concurrently and independently of the gate.
pub struct PracticeGate {
    state: PracticeSessionState,
    sink: Option<SharedSink>,
}

impl PracticeGate {
    pub fn new() -> Self {
        Self {
            state: PracticeSessionState::Inactive,
            sink: None,
        }
    }

    pub fn start(
        &mut self,
        sequence: &MidiSequence,
        hand: HandPolicy,
        track: TrackRef,
        sink: SharedSink,
        player: &mut MidiPlayer,
    ) {
        let (target_notes, auto_notes) = split_hands(sequence, hand);
        let total = target_notes.len();
        self.state = if target_notes.is_empty() {
            PracticeSessionState::Inactive
        } else {
            PracticeSessionState::Active {
                target_notes,
                current_index: 0,
                total,
                track: track.clone(),
            }
        };
        self.sink = Some(sink.clone());
        if auto_notes.is_empty() {
            player.stop();
        } else {
            let auto_sequence = MidiSequence {
                events: auto_notes.into_iter().map(|note| note.event).collect(),
                duration_ms: sequence.duration_ms,
            };
            player.play(Arc::new(auto_sequence), sink, track);
        }
    }

    /// Feeds one raw inbound payload to the gate. Only note-ons are
    /// considered; everything else is ignored.
    pub fn handle_event(&mut self, data: &[u8]) {
        if let Some(NoteMessage::On { pitch, .. }) = classify_note(data) {
            self.advance(pitch, data);
        }
    }

    fn advance(&mut self, pitch: u8, raw: &[u8]) {
        let PracticeSessionState::Active {
            target_notes,
            current_index,
            total,
            track,
        } = &mut self.state
        else {
            return;
        };
        let Some(expected) = target_notes.get(*current_index) else {
            return;
        };
        if expected.pitch != pitch {
            // wrong notes never advance or regress progress
            return;
        }
        if let Some(sink) = &self.sink {
            if let Err(error) = sink.send(raw) {
                warn!(%error, "failed to echo matched note");
            }
        }
        *current_index += 1;
        if *current_index >= *total {
            let track = track.clone();
            self.state = PracticeSessionState::Completed { track };
        }
    }

    pub fn state(&self) -> &PracticeSessionState {
        &self.state
    }

    pub fn progress(&self) -> PracticeProgress {
        match &self.state {
            PracticeSessionState::Inactive => PracticeProgress::Idle,
            PracticeSessionState::Active {
                target_notes,
                current_index,
                total,
                ..
            } => PracticeProgress::Active {
                completed: *current_index,
                total: *total,
                next_pitch: target_notes.get(*current_index).map(|note| note.pitch),
            },
            PracticeSessionState::Completed { track } => PracticeProgress::Done {
                track_title: track.title.clone(),
            },
        }
    }

    pub fn clear(&mut self) {
        self.state = PracticeSessionState::Inactive;
        self.sink = None;
    }
}

impl Default for PracticeGate {
    fn default() -> Self {
        Self::new()
    }
}
