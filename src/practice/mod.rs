mod chord;
mod notation;
mod session;

pub use chord::{ChordTracker, pitch_name};
pub use notation::{
    MEASURE_WINDOW_MS, MIN_NOTE_DURATION_MS, NotationProjection, OPEN_NOTE_FALLBACK_MS,
    RenderedMeasure, RenderedNote,
};
pub use session::{
    HAND_SPLIT_PITCH, HandPolicy, PracticeGate, PracticeProgress, PracticeSessionState, TargetNote,
    split_hands,
};
