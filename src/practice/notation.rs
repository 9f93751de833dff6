use crate::events::{MidiSequence, NoteMessage, classify_note};
use std::collections::BTreeMap;

pub const MIN_NOTE_DURATION_MS: u64 = 60;
pub const OPEN_NOTE_FALLBACK_MS: u64 = 240;
pub const MEASURE_WINDOW_MS: u64 = 2_000;

const DEFAULT_MIN_PITCH: u8 = 60;
const DEFAULT_MAX_PITCH: u8 = 72;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedNote {
    pub pitch: u8,
    pub start_ms: u64,
    pub duration_ms: u64,
    pub velocity: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMeasure {
    pub start_ms: u64,
    pub end_ms: u64,
    pub notes: Vec<RenderedNote>,
}

/// Note spans and fixed-width measures derived from a decoded sequence,
/// for rendering. `min_pitch`/`max_pitch` only drive display scale.
#[derive(Debug, Clone)]
pub struct NotationProjection {
    pub notes: Vec<RenderedNote>,
    pub measures: Vec<RenderedMeasure>,
    pub duration_ms: u64,
    pub min_pitch: u8,
    pub max_pitch: u8,
}

impl NotationProjection {
    pub fn project(sequence: &MidiSequence) -> Self {
        let mut notes = Vec::new();
        // pending note-on per pitch; a later note-on for the same pitch
        // replaces an unmatched earlier one
        let mut active: BTreeMap<u8, (u64, u8)> = BTreeMap::new();
        for event in &sequence.events {
            match classify_note(&event.data) {
                Some(NoteMessage::On { pitch, velocity }) => {
                    active.insert(pitch, (event.timestamp_ms, velocity));
                }
                Some(NoteMessage::Off { pitch }) => {
                    if let Some((start_ms, velocity)) = active.remove(&pitch) {
                        notes.push(RenderedNote {
                            pitch,
                            start_ms,
                            duration_ms: event
                                .timestamp_ms
                                .saturating_sub(start_ms)
                                .max(MIN_NOTE_DURATION_MS),
                            velocity,
                        });
                    }
                }
                None => {}
            }
        }
        // notes still sounding at the end of the sequence
        for (pitch, (start_ms, velocity)) in active {
            notes.push(RenderedNote {
                pitch,
                start_ms,
                duration_ms: OPEN_NOTE_FALLBACK_MS,
                velocity,
            });
        }
        notes.sort_by_key(|note| note.start_ms);

        let min_pitch = notes
            .iter()
            .map(|note| note.pitch)
            .min()
            .unwrap_or(DEFAULT_MIN_PITCH);
        let max_pitch = notes
            .iter()
            .map(|note| note.pitch)
            .max()
            .unwrap_or(DEFAULT_MAX_PITCH);

        let duration_ms = sequence.duration_ms;
        let total = duration_ms.max(1);
        let measure_count = total.div_ceil(MEASURE_WINDOW_MS).max(1) as usize;
        let measures = (0..measure_count)
            .map(|index| {
                let start_ms = index as u64 * MEASURE_WINDOW_MS;
                let end_ms = total.min(start_ms + MEASURE_WINDOW_MS);
                RenderedMeasure {
                    start_ms,
                    end_ms,
                    notes: notes
                        .iter()
                        .filter(|note| note.start_ms >= start_ms && note.start_ms < end_ms)
                        .cloned()
                        .collect(),
                }
            })
            .collect();

        Self {
            notes,
            measures,
            duration_ms,
            min_pitch,
            max_pitch,
        }
    }
}
