use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct SinkError(pub String);

/// Destination for raw MIDI bytes. The transport that opened the
/// connection lives elsewhere; the engine only ever sends.
pub trait MidiSink: Send {
    fn send(&mut self, payload: &[u8]) -> Result<(), SinkError>;
}

/// Shared handle to an output sink. Sends go through a lock so the
/// playback loop and the practice echo path never interleave a message.
#[derive(Clone)]
pub struct SharedSink {
    inner: Arc<Mutex<Box<dyn MidiSink>>>,
}

impl SharedSink {
    pub fn new(sink: impl MidiSink + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    pub fn send(&self, payload: &[u8]) -> Result<(), SinkError> {
        self.inner.lock().send(payload)
    }
}

impl MidiSink for midir::MidiOutputConnection {
    fn send(&mut self, payload: &[u8]) -> Result<(), SinkError> {
        midir::MidiOutputConnection::send(self, payload).map_err(|e| SinkError(e.to_string()))
    }
}
