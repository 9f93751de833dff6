mod parser;

pub use parser::{MidiFileParser, ParseError};
