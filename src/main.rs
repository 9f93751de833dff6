use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use etude::{
    ChordTracker, HandPolicy, MidiFileParser, MidiInputEvent, MidiPlayer, MidiSequence,
    NotationProjection, PlaybackState, PracticeGate, PracticeProgress, Settings, SharedSink,
    TrackRef,
};
use midir::{Ignore, MidiInput, MidiOutput, MidiOutputConnection};
use ringbuf::{
    HeapCons, HeapRb,
    traits::{Consumer, Producer, Split},
};
use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const SEEK_STEP_MS: u64 = 5_000;

#[derive(Parser)]
#[command(
    name = "etude",
    about = "Plays MIDI files to an instrument, with guided practice"
)]
struct Args {
    /// MIDI file to play
    file: Option<PathBuf>,
    /// Print the decoded notation layout instead of playing
    #[arg(long)]
    inspect: bool,
    /// List MIDI ports and exit
    #[arg(long)]
    list_ports: bool,
    /// Practice HAND (left, right or both) against live input;
    /// defaults to the configured hand
    #[arg(long, value_name = "HAND", num_args = 0..=1, default_missing_value = "")]
    practice: Option<String>,
    /// Substring filter for the output port name
    #[arg(long)]
    out: Option<String>,
    /// Substring filter for the input port name
    #[arg(long = "in")]
    input: Option<String>,
    /// Settings file
    #[arg(long, default_value = "etude.ron")]
    settings: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();
    if args.list_ports {
        return list_ports();
    }
    let Some(path) = args.file.clone() else {
        return Err("no MIDI file given (try --help)".into());
    };
    let data = std::fs::read(&path)?;
    let sequence = Arc::new(MidiFileParser.parse(&data)?);
    if args.inspect {
        inspect(&sequence);
        return Ok(());
    }

    let settings = Settings::load_or_default(&args.settings);
    let title = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let track = TrackRef::new(path.display().to_string(), title);
    let out_filter = args.out.clone().or_else(|| settings.output_port.clone());
    let sink = SharedSink::new(open_output(out_filter.as_deref())?);
    let mut player = MidiPlayer::new();

    match args.practice.as_deref() {
        Some(value) => {
            let hand = if value.is_empty() {
                settings.practice_hand
            } else {
                parse_hand(value).ok_or("practice hand must be left, right or both")?
            };
            let in_filter = args.input.clone().or_else(|| settings.input_port.clone());
            practice_loop(&sequence, hand, track, sink, &mut player, in_filter.as_deref())
        }
        None => {
            player.play(sequence.clone(), sink.clone(), track);
            transport_loop(&mut player, sink)
        }
    }
}

fn parse_hand(value: &str) -> Option<HandPolicy> {
    match value.to_lowercase().as_str() {
        "left" => Some(HandPolicy::Left),
        "right" => Some(HandPolicy::Right),
        "both" => Some(HandPolicy::Both),
        _ => None,
    }
}

fn list_ports() -> Result<(), Box<dyn Error>> {
    let midi_out = MidiOutput::new("etude")?;
    println!("output ports:");
    for port in midi_out.ports() {
        println!("  {}", midi_out.port_name(&port)?);
    }
    let mut midi_in = MidiInput::new("etude")?;
    midi_in.ignore(Ignore::None);
    println!("input ports:");
    for port in midi_in.ports() {
        println!("  {}", midi_in.port_name(&port)?);
    }
    Ok(())
}

fn port_matches(name: Option<String>, filter: Option<&str>) -> bool {
    match (name, filter) {
        (Some(name), Some(filter)) => name.to_lowercase().contains(&filter.to_lowercase()),
        (Some(_), None) => true,
        (None, _) => false,
    }
}

fn open_output(filter: Option<&str>) -> Result<MidiOutputConnection, Box<dyn Error>> {
    let midi_out = MidiOutput::new("etude")?;
    let ports = midi_out.ports();
    let port = ports
        .iter()
        .find(|port| port_matches(midi_out.port_name(port).ok(), filter))
        .ok_or("no matching MIDI output port")?;
    let name = midi_out.port_name(port).unwrap_or_default();
    tracing::info!(port = %name, "opened MIDI output");
    let connection = midi_out.connect(port, "etude-out").map_err(|e| e.to_string())?;
    Ok(connection)
}

fn inspect(sequence: &MidiSequence) {
    let projection = NotationProjection::project(sequence);
    println!(
        "{} events, {} notes, duration {} ms, pitch range {}..={}",
        sequence.events.len(),
        projection.notes.len(),
        projection.duration_ms,
        projection.min_pitch,
        projection.max_pitch
    );
    for (index, measure) in projection.measures.iter().enumerate() {
        println!(
            "measure {:>3} [{:>7}ms..{:>7}ms) {:>3} notes",
            index + 1,
            measure.start_ms,
            measure.end_ms,
            measure.notes.len()
        );
    }
}

fn transport_loop(player: &mut MidiPlayer, sink: SharedSink) -> Result<(), Box<dyn Error>> {
    println!("space: pause/resume  left/right: seek 5s  q: quit");
    enable_raw_mode()?;
    let result = run_transport(player, sink);
    disable_raw_mode()?;
    println!();
    result
}

fn run_transport(player: &mut MidiPlayer, sink: SharedSink) -> Result<(), Box<dyn Error>> {
    loop {
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        KeyCode::Char(' ') => {
                            if player.state().is_playing() {
                                player.pause();
                            } else {
                                player.resume(sink.clone());
                            }
                        }
                        KeyCode::Left => {
                            let position = player.state().position_ms().unwrap_or(0);
                            player.seek_to(position.saturating_sub(SEEK_STEP_MS), sink.clone());
                        }
                        KeyCode::Right => {
                            let position = player.state().position_ms().unwrap_or(0);
                            player.seek_to(position + SEEK_STEP_MS, sink.clone());
                        }
                        _ => {}
                    }
                }
            }
        }
        match player.state() {
            PlaybackState::Playing {
                position_ms,
                duration_ms,
                ..
            } => {
                print!(
                    "\r{} / {}          ",
                    format_time(position_ms),
                    format_time(duration_ms)
                );
                io::stdout().flush()?;
            }
            PlaybackState::Paused {
                position_ms,
                duration_ms,
                ..
            } => {
                print!(
                    "\r{} / {} (paused) ",
                    format_time(position_ms),
                    format_time(duration_ms)
                );
                io::stdout().flush()?;
            }
            PlaybackState::Completed { track } => {
                print!("\rfinished {}\r\n", track.title);
                break;
            }
            PlaybackState::Error { message, .. } => {
                print!("\rplayback error: {message}\r\n");
                break;
            }
            PlaybackState::Idle => break,
        }
    }
    player.stop();
    Ok(())
}

fn format_time(ms: u64) -> String {
    let seconds = ms / 1000;
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

fn practice_loop(
    sequence: &MidiSequence,
    hand: HandPolicy,
    track: TrackRef,
    sink: SharedSink,
    player: &mut MidiPlayer,
    in_filter: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let mut midi_in = MidiInput::new("etude")?;
    midi_in.ignore(Ignore::None);
    let ports = midi_in.ports();
    let port = ports
        .iter()
        .find(|port| port_matches(midi_in.port_name(port).ok(), in_filter))
        .ok_or("no matching MIDI input port")?;
    let name = midi_in.port_name(port).unwrap_or_default();
    tracing::info!(port = %name, "opened MIDI input");

    let rb = HeapRb::<MidiInputEvent>::new(256);
    let (mut producer, mut consumer) = rb.split();
    let _connection = midi_in
        .connect(
            port,
            "etude-in",
            move |timestamp_us: u64, data: &[u8], _: &mut ()| {
                let _ = producer.try_push(MidiInputEvent {
                    data: data.to_vec(),
                    timestamp_us,
                });
            },
            (),
        )
        .map_err(|e| e.to_string())?;

    let mut gate = PracticeGate::new();
    let mut chords = ChordTracker::new();
    gate.start(sequence, hand, track, sink, player);
    if matches!(gate.progress(), PracticeProgress::Idle) {
        println!("nothing to practice for this hand; playing the rest");
    }
    println!("q: quit");
    enable_raw_mode()?;
    let result = run_practice(&mut gate, &mut chords, &mut consumer, player);
    disable_raw_mode()?;
    println!();
    result
}

fn run_practice(
    gate: &mut PracticeGate,
    chords: &mut ChordTracker,
    consumer: &mut HeapCons<MidiInputEvent>,
    player: &mut MidiPlayer,
) -> Result<(), Box<dyn Error>> {
    loop {
        while let Some(input) = consumer.try_pop() {
            chords.handle_event(&input.data);
            gate.handle_event(&input.data);
        }
        match gate.progress() {
            PracticeProgress::Active {
                completed,
                total,
                next_pitch,
            } => {
                let next = next_pitch.map(describe_pitch).unwrap_or_default();
                let chord = chords.describe().unwrap_or_default();
                print!("\r{completed}/{total} next: {next:<4} {chord:<12}");
                io::stdout().flush()?;
            }
            PracticeProgress::Done { track_title } => {
                print!("\rpractice complete: {track_title}\r\n");
                break;
            }
            PracticeProgress::Idle => {
                // nothing gated; leave once auto playback settles
                if !player.state().is_playing() {
                    break;
                }
            }
        }
        if event::poll(Duration::from_millis(30))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                {
                    break;
                }
            }
        }
    }
    player.stop();
    Ok(())
}

fn describe_pitch(pitch: u8) -> String {
    format!(
        "{}{}",
        etude::practice::pitch_name(pitch),
        i32::from(pitch / 12) - 1
    )
}
