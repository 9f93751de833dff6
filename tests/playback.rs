use etude::{
    MidiEvent, MidiPlayer, MidiSequence, MidiSink, PlaybackState, SharedSink, SinkError, TrackRef,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Clone, Default)]
struct RecordingSink {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl RecordingSink {
    fn payloads(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }
}

impl MidiSink for RecordingSink {
    fn send(&mut self, payload: &[u8]) -> Result<(), SinkError> {
        self.sent.lock().push(payload.to_vec());
        Ok(())
    }
}

struct FailingSink;

impl MidiSink for FailingSink {
    fn send(&mut self, _payload: &[u8]) -> Result<(), SinkError> {
        Err(SinkError("device unplugged".into()))
    }
}

fn note_on(timestamp_ms: u64, pitch: u8) -> MidiEvent {
    MidiEvent {
        timestamp_ms,
        data: vec![0x90, pitch, 100],
    }
}

fn sequence(events: Vec<MidiEvent>) -> Arc<MidiSequence> {
    let duration_ms = events.last().map(|event| event.timestamp_ms).unwrap_or(0);
    Arc::new(MidiSequence {
        events,
        duration_ms,
    })
}

fn track() -> TrackRef {
    TrackRef::new("1", "test track")
}

fn wait_for(
    player: &MidiPlayer,
    predicate: impl Fn(&PlaybackState) -> bool,
    timeout: Duration,
) -> PlaybackState {
    let deadline = Instant::now() + timeout;
    loop {
        let state = player.state();
        if predicate(&state) {
            return state;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting, last state {state:?}"
        );
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn play_sends_all_events_in_order_and_completes() {
    let recorder = RecordingSink::default();
    let mut player = MidiPlayer::new();
    let events = vec![note_on(0, 60), note_on(20, 64), note_on(40, 67)];
    player.play(
        sequence(events.clone()),
        SharedSink::new(recorder.clone()),
        track(),
    );
    wait_for(
        &player,
        |state| matches!(state, PlaybackState::Completed { .. }),
        Duration::from_secs(2),
    );
    let expected: Vec<Vec<u8>> = events.iter().map(|event| event.data.clone()).collect();
    assert_eq!(recorder.payloads(), expected);
}

#[test]
fn play_publishes_playing_immediately() {
    let mut player = MidiPlayer::new();
    player.play(
        sequence(vec![note_on(1_000, 60)]),
        SharedSink::new(RecordingSink::default()),
        track(),
    );
    assert!(matches!(
        player.state(),
        PlaybackState::Playing {
            position_ms: 0,
            duration_ms: 1_000,
            ..
        }
    ));
    player.stop();
    assert!(matches!(player.state(), PlaybackState::Idle));
}

#[test]
fn pause_then_resume_matches_uninterrupted_remainder() {
    let recorder = RecordingSink::default();
    let sink = SharedSink::new(recorder.clone());
    let mut player = MidiPlayer::new();
    let events = vec![
        note_on(0, 60),
        note_on(40, 62),
        note_on(200, 64),
        note_on(240, 65),
    ];
    player.play(sequence(events.clone()), sink.clone(), track());
    thread::sleep(Duration::from_millis(120));
    player.pause();

    let PlaybackState::Paused { position_ms, .. } = player.state() else {
        panic!("expected paused, got {:?}", player.state());
    };
    assert_eq!(position_ms, 40);
    let sent_before_resume = recorder.payloads().len();
    assert_eq!(sent_before_resume, 2);

    player.resume(sink);
    wait_for(
        &player,
        |state| matches!(state, PlaybackState::Completed { .. }),
        Duration::from_secs(2),
    );

    // the tail equals an uninterrupted replay from the paused position
    let expected_tail: Vec<Vec<u8>> = events
        .iter()
        .filter(|event| event.timestamp_ms >= position_ms)
        .map(|event| event.data.clone())
        .collect();
    let sent = recorder.payloads();
    assert_eq!(sent[sent_before_resume..].to_vec(), expected_tail);
}

#[test]
fn seek_skips_earlier_events_without_rewaiting() {
    let recorder = RecordingSink::default();
    let sink = SharedSink::new(recorder.clone());
    let mut player = MidiPlayer::new();
    player.play(
        sequence(vec![note_on(0, 60), note_on(300, 64)]),
        sink.clone(),
        track(),
    );
    thread::sleep(Duration::from_millis(50));
    player.pause();

    let started = Instant::now();
    player.seek_to(290, sink);
    wait_for(
        &player,
        |state| matches!(state, PlaybackState::Completed { .. }),
        Duration::from_secs(2),
    );
    // only ~10ms of sequence time remained after the target
    assert!(started.elapsed() < Duration::from_millis(150));
    let sent = recorder.payloads();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1], vec![0x90, 64, 100]);
}

#[test]
fn stop_halts_sends_before_returning() {
    let recorder = RecordingSink::default();
    let mut player = MidiPlayer::new();
    player.play(
        sequence(vec![note_on(0, 60), note_on(500, 64)]),
        SharedSink::new(recorder.clone()),
        track(),
    );
    thread::sleep(Duration::from_millis(50));
    player.stop();
    assert!(matches!(player.state(), PlaybackState::Idle));
    let sent_at_stop = recorder.payloads().len();
    thread::sleep(Duration::from_millis(600));
    assert_eq!(recorder.payloads().len(), sent_at_stop);
}

#[test]
fn new_play_supersedes_the_previous_session() {
    let first_recorder = RecordingSink::default();
    let second_recorder = RecordingSink::default();
    let mut player = MidiPlayer::new();
    player.play(
        sequence(vec![note_on(0, 60), note_on(400, 62)]),
        SharedSink::new(first_recorder.clone()),
        TrackRef::new("1", "first"),
    );
    thread::sleep(Duration::from_millis(30));
    player.play(
        sequence(vec![note_on(0, 70), note_on(30, 72)]),
        SharedSink::new(second_recorder.clone()),
        TrackRef::new("2", "second"),
    );
    let first_sent = first_recorder.payloads().len();
    match player.state() {
        PlaybackState::Playing { track, .. } => assert_eq!(track.title, "second"),
        other => panic!("expected playing, got {other:?}"),
    }
    wait_for(
        &player,
        |state| matches!(state, PlaybackState::Completed { .. }),
        Duration::from_secs(2),
    );
    thread::sleep(Duration::from_millis(500));
    // the superseded session never sent again
    assert_eq!(first_recorder.payloads().len(), first_sent);
    assert_eq!(second_recorder.payloads().len(), 2);
}

#[test]
fn sink_failure_transitions_to_error_and_halts() {
    let mut player = MidiPlayer::new();
    player.play(
        sequence(vec![note_on(0, 60), note_on(20, 64)]),
        SharedSink::new(FailingSink),
        track(),
    );
    let state = wait_for(
        &player,
        |state| matches!(state, PlaybackState::Error { .. }),
        Duration::from_secs(2),
    );
    let PlaybackState::Error { message, .. } = state else {
        unreachable!();
    };
    assert!(message.contains("device unplugged"));
    // the error is terminal until the caller acts
    thread::sleep(Duration::from_millis(100));
    assert!(matches!(player.state(), PlaybackState::Error { .. }));
}

#[test]
fn empty_sequence_completes_straight_away() {
    let mut player = MidiPlayer::new();
    player.play(
        sequence(Vec::new()),
        SharedSink::new(RecordingSink::default()),
        track(),
    );
    wait_for(
        &player,
        |state| matches!(state, PlaybackState::Completed { .. }),
        Duration::from_secs(1),
    );
}

#[test]
fn pause_and_resume_are_noops_in_the_wrong_state() {
    let mut player = MidiPlayer::new();
    player.pause();
    assert!(matches!(player.state(), PlaybackState::Idle));
    player.resume(SharedSink::new(RecordingSink::default()));
    assert!(matches!(player.state(), PlaybackState::Idle));
}

#[test]
fn position_snapshots_never_go_backwards() {
    let mut player = MidiPlayer::new();
    let events = (0..10).map(|i| note_on(i * 30, 60)).collect();
    player.play(
        sequence(events),
        SharedSink::new(RecordingSink::default()),
        track(),
    );
    let mut last = 0;
    loop {
        match player.state() {
            PlaybackState::Playing { position_ms, .. } => {
                assert!(position_ms >= last);
                last = position_ms;
            }
            PlaybackState::Completed { .. } => break,
            other => panic!("unexpected state {other:?}"),
        }
        thread::sleep(Duration::from_millis(5));
    }
}
