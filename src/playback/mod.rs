mod engine;
mod sink;
mod state;

pub use engine::MidiPlayer;
pub use sink::{MidiSink, SharedSink, SinkError};
pub use state::PlaybackState;
