pub const NOTE_OFF_STATUS: u8 = 0x80;
pub const NOTE_ON_STATUS: u8 = 0x90;

/// One timed performance message, as decoded from a file. `data` holds the
/// raw status/data bytes (or a full sysex block) exactly as they go out on
/// the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiEvent {
    pub timestamp_ms: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MidiSequence {
    pub events: Vec<MidiEvent>,
    pub duration_ms: u64,
}

/// Identifies the file a playback or practice session was started from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRef {
    pub id: String,
    pub title: String,
}

impl TrackRef {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// A raw inbound message from a live input source, with the device
/// timestamp in microseconds.
#[derive(Debug, Clone)]
pub struct MidiInputEvent {
    pub data: Vec<u8>,
    pub timestamp_us: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteMessage {
    On { pitch: u8, velocity: u8 },
    Off { pitch: u8 },
}

/// Classifies a raw payload as note-on or note-off. A note-on with
/// velocity 0 is a note-off. Anything else (controllers, sysex, meta)
/// yields `None`.
pub fn classify_note(data: &[u8]) -> Option<NoteMessage> {
    let status = *data.first()?;
    let command = status & 0xF0;
    let pitch = *data.get(1)?;
    let velocity = data.get(2).copied().unwrap_or(0);
    if command == NOTE_ON_STATUS && velocity > 0 {
        Some(NoteMessage::On { pitch, velocity })
    } else if command == NOTE_OFF_STATUS || command == NOTE_ON_STATUS {
        Some(NoteMessage::Off { pitch })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_on_with_velocity() {
        assert_eq!(
            classify_note(&[0x90, 60, 100]),
            Some(NoteMessage::On {
                pitch: 60,
                velocity: 100
            })
        );
    }

    #[test]
    fn note_on_velocity_zero_is_off() {
        assert_eq!(
            classify_note(&[0x90, 60, 0]),
            Some(NoteMessage::Off { pitch: 60 })
        );
        assert_eq!(
            classify_note(&[0x80, 60, 64]),
            Some(NoteMessage::Off { pitch: 60 })
        );
    }

    #[test]
    fn channel_bits_are_ignored() {
        assert_eq!(
            classify_note(&[0x93, 72, 80]),
            Some(NoteMessage::On {
                pitch: 72,
                velocity: 80
            })
        );
    }

    #[test]
    fn other_messages_are_not_notes() {
        assert_eq!(classify_note(&[0xB0, 64, 127]), None);
        assert_eq!(classify_note(&[0xF0, 0x7E]), None);
        assert_eq!(classify_note(&[]), None);
        assert_eq!(classify_note(&[0x90]), None);
    }
}
