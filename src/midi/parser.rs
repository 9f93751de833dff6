use crate::events::{MidiEvent, MidiSequence};
use thiserror::Error;
use tracing::{debug, warn};

const HEADER_TAG: &[u8; 4] = b"MThd";
const TRACK_TAG: &[u8; 4] = b"MTrk";
const HEADER_MIN_LENGTH: usize = 6;
const DEFAULT_TEMPO_US: u64 = 500_000;

const META_STATUS: u8 = 0xFF;
const SYSEX_STATUS: u8 = 0xF0;
const SYSEX_ESCAPE_STATUS: u8 = 0xF7;
const META_TEMPO: u8 = 0x51;
const META_END_OF_TRACK: u8 = 0x2F;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid MIDI header: {0}")]
    InvalidHeader(String),
    #[error("SMPTE time division is not supported")]
    SmpteTiming,
    #[error("unexpected end of MIDI data")]
    UnexpectedEof,
    #[error("running status missing at byte {0}")]
    MissingRunningStatus(usize),
}

/// Decodes a Standard MIDI File byte stream into a [`MidiSequence`].
///
/// Tempo map and per-track delta times are resolved into absolute
/// millisecond timestamps; events from all tracks are merged into a single
/// time-ordered list. Structural problems (bad magic, SMPTE division,
/// truncated chunks, missing running status) fail the whole decode, while
/// a single out-of-order item is dropped with a diagnostic.
pub struct MidiFileParser;

enum RawPayload {
    Tempo(u32),
    Event(Vec<u8>),
}

struct RawItem {
    tick: u64,
    order: u32,
    payload: RawPayload,
}

/// Parse cursor for one track chunk. Threaded explicitly so track parsing
/// stays reentrant and testable in isolation.
struct TrackContext {
    pos: usize,
    tick: u64,
    running_status: Option<u8>,
}

impl MidiFileParser {
    pub fn parse(&self, data: &[u8]) -> Result<MidiSequence, ParseError> {
        let mut pos = 0;
        let (tag, header_len) = read_chunk_header(data, &mut pos)?;
        if &tag != HEADER_TAG {
            return Err(ParseError::InvalidHeader(format!(
                "bad chunk tag {:?}",
                String::from_utf8_lossy(&tag)
            )));
        }
        if header_len < HEADER_MIN_LENGTH {
            return Err(ParseError::InvalidHeader(format!(
                "header length {header_len}"
            )));
        }
        let header = take(data, pos, header_len)?;
        pos += header_len;

        let format = read_u16(header, 0);
        let track_count = read_u16(header, 2);
        let division = read_u16(header, 4);
        if division & 0x8000 != 0 {
            return Err(ParseError::SmpteTiming);
        }
        if division == 0 {
            return Err(ParseError::InvalidHeader(
                "time division must be positive".into(),
            ));
        }
        debug!(format, track_count, division, "parsed MIDI header");

        let ticks_per_quarter = u64::from(division);
        let mut items: Vec<RawItem> = Vec::new();
        let mut order = 0u32;
        for _ in 0..track_count {
            let (tag, chunk_len) = read_chunk_header(data, &mut pos)?;
            let body = take(data, pos, chunk_len)?;
            pos += chunk_len;
            if &tag == TRACK_TAG {
                parse_track(body, &mut items, &mut order)?;
            } else {
                warn!(tag = %String::from_utf8_lossy(&tag), "skipping unknown chunk");
            }
        }
        if items.is_empty() {
            return Ok(MidiSequence::default());
        }

        // Tie-break between tracks at the same tick is global insertion
        // order during the parse pass.
        items.sort_by_key(|item| (item.tick, item.order));

        let mut micros_per_quarter = DEFAULT_TEMPO_US;
        let mut last_tick = 0u64;
        let mut elapsed_micros = 0u64;
        let mut events = Vec::with_capacity(items.len());
        for item in items {
            if item.tick < last_tick {
                warn!(tick = item.tick, "ignoring out-of-order event");
                continue;
            }
            let delta_ticks = item.tick - last_tick;
            elapsed_micros += delta_ticks * micros_per_quarter / ticks_per_quarter;
            last_tick = item.tick;
            match item.payload {
                RawPayload::Tempo(us_per_quarter) => {
                    micros_per_quarter = u64::from(us_per_quarter);
                }
                RawPayload::Event(data) => events.push(MidiEvent {
                    timestamp_ms: elapsed_micros / 1000,
                    data,
                }),
            }
        }
        Ok(MidiSequence {
            events,
            duration_ms: elapsed_micros / 1000,
        })
    }
}

fn parse_track(data: &[u8], items: &mut Vec<RawItem>, order: &mut u32) -> Result<(), ParseError> {
    let mut ctx = TrackContext {
        pos: 0,
        tick: 0,
        running_status: None,
    };
    while ctx.pos < data.len() {
        let delta = read_vlq(data, &mut ctx.pos);
        ctx.tick += delta;
        if ctx.pos >= data.len() {
            break;
        }
        let first = data[ctx.pos];
        let (status, is_new_status) = if first & 0x80 != 0 {
            ctx.pos += 1;
            (first, true)
        } else if let Some(running) = ctx.running_status {
            (running, false)
        } else {
            return Err(ParseError::MissingRunningStatus(ctx.pos));
        };
        match status {
            META_STATUS => {
                if ctx.pos >= data.len() {
                    break;
                }
                let meta_type = data[ctx.pos];
                ctx.pos += 1;
                let length = read_vlq(data, &mut ctx.pos) as usize;
                let end = data.len().min(ctx.pos.saturating_add(length));
                let payload = &data[ctx.pos..end];
                if meta_type == META_TEMPO && payload.len() == 3 {
                    let tempo = u32::from(payload[0]) << 16
                        | u32::from(payload[1]) << 8
                        | u32::from(payload[2]);
                    items.push(RawItem {
                        tick: ctx.tick,
                        order: next_order(order),
                        payload: RawPayload::Tempo(tempo),
                    });
                }
                ctx.pos = end;
                if meta_type == META_END_OF_TRACK {
                    return Ok(());
                }
                ctx.running_status = None;
            }
            SYSEX_STATUS | SYSEX_ESCAPE_STATUS => {
                let length = read_vlq(data, &mut ctx.pos) as usize;
                let available = length.min(data.len() - ctx.pos);
                let mut bytes = Vec::with_capacity(available + 1);
                bytes.push(status);
                bytes.extend_from_slice(&data[ctx.pos..ctx.pos + available]);
                ctx.pos += available;
                items.push(RawItem {
                    tick: ctx.tick,
                    order: next_order(order),
                    payload: RawPayload::Event(bytes),
                });
                ctx.running_status = None;
            }
            _ => {
                if is_new_status && status < 0xF0 {
                    ctx.running_status = Some(status);
                }
                let data_bytes = match status & 0xF0 {
                    // program change and channel pressure carry one byte
                    0xC0 | 0xD0 => 1,
                    _ => 2,
                };
                if ctx.pos + data_bytes > data.len() {
                    break;
                }
                let mut bytes = Vec::with_capacity(data_bytes + 1);
                bytes.push(status);
                bytes.extend_from_slice(&data[ctx.pos..ctx.pos + data_bytes]);
                ctx.pos += data_bytes;
                items.push(RawItem {
                    tick: ctx.tick,
                    order: next_order(order),
                    payload: RawPayload::Event(bytes),
                });
            }
        }
    }
    Ok(())
}

fn next_order(order: &mut u32) -> u32 {
    let current = *order;
    *order += 1;
    current
}

/// Variable-length quantity: big-endian, 7 significant bits per byte,
/// continuation flag in the top bit, at most 4 bytes. Stops early at the
/// end of the buffer.
fn read_vlq(data: &[u8], pos: &mut usize) -> u64 {
    let mut value = 0u64;
    let mut count = 0;
    while count < 4 {
        let Some(&byte) = data.get(*pos) else {
            break;
        };
        *pos += 1;
        count += 1;
        value = (value << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            break;
        }
    }
    value
}

fn read_chunk_header(data: &[u8], pos: &mut usize) -> Result<([u8; 4], usize), ParseError> {
    let bytes = data
        .get(*pos..pos.saturating_add(8))
        .ok_or(ParseError::UnexpectedEof)?;
    let tag = [bytes[0], bytes[1], bytes[2], bytes[3]];
    let length = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    *pos += 8;
    Ok((tag, length))
}

fn take(data: &[u8], pos: usize, len: usize) -> Result<&[u8], ParseError> {
    let end = pos.checked_add(len).ok_or(ParseError::UnexpectedEof)?;
    data.get(pos..end).ok_or(ParseError::UnexpectedEof)
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    (u16::from(data[offset]) << 8) | u16::from(data[offset + 1])
}
