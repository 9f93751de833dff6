//! MIDI file playback and guided-practice engine. Decodes Standard MIDI
//! Files into timed event lists, replays them through an output sink with
//! pause/resume/seek, gates guided-practice sessions on live input, and
//! derives chord labels and note/measure layouts for display.

pub mod events;
pub mod midi;
pub mod playback;
pub mod practice;
pub mod settings;

pub use events::{MidiEvent, MidiInputEvent, MidiSequence, NoteMessage, TrackRef, classify_note};
pub use midi::{MidiFileParser, ParseError};
pub use playback::{MidiPlayer, MidiSink, PlaybackState, SharedSink, SinkError};
pub use practice::{
    ChordTracker, HandPolicy, NotationProjection, PracticeGate, PracticeProgress,
};
pub use settings::Settings;
