use crate::events::{NoteMessage, classify_note};
use std::collections::BTreeSet;

const PITCH_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

pub fn pitch_name(pitch: u8) -> &'static str {
    PITCH_NAMES[usize::from(pitch % 12)]
}

/// Tracks the currently held pitches from a live input stream and names
/// the chord they spell, best effort. Purely derived state.
#[derive(Debug, Default)]
pub struct ChordTracker {
    pressed: BTreeSet<u8>,
}

impl ChordTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_on(&mut self, pitch: u8) {
        self.pressed.insert(pitch);
    }

    pub fn note_off(&mut self, pitch: u8) {
        self.pressed.remove(&pitch);
    }

    /// Applies a raw inbound payload; note-on with velocity 0 releases.
    pub fn handle_event(&mut self, data: &[u8]) {
        match classify_note(data) {
            Some(NoteMessage::On { pitch, .. }) => self.note_on(pitch),
            Some(NoteMessage::Off { pitch }) => self.note_off(pitch),
            None => {}
        }
    }

    pub fn clear(&mut self) {
        self.pressed.clear();
    }

    pub fn held_count(&self) -> usize {
        self.pressed.len()
    }

    /// Labels the held set. Root is the lowest pitch; the quality is the
    /// first reference interval set (major, minor, dim, aug) contained in
    /// the held intervals, or a generic "<root> chord".
    pub fn describe(&self) -> Option<String> {
        if self.pressed.len() < 3 {
            return None;
        }
        let root = *self.pressed.iter().next()?;
        let intervals: Vec<u8> = self.pressed.iter().map(|pitch| (pitch - root) % 12).collect();
        let quality = if contains_all(&intervals, &[0, 4, 7]) {
            "major"
        } else if contains_all(&intervals, &[0, 3, 7]) {
            "minor"
        } else if contains_all(&intervals, &[0, 3, 6]) {
            "dim"
        } else if contains_all(&intervals, &[0, 4, 8]) {
            "aug"
        } else {
            "chord"
        };
        Some(format!("{} {}", pitch_name(root), quality))
    }
}

fn contains_all(intervals: &[u8], reference: &[u8]) -> bool {
    reference.iter().all(|step| intervals.contains(step))
}
