// Integration test: Transport, clock and dispatch driven block by block
//
// Emulates the audio callback by calling the player directly, so every
// scenario is deterministic.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stepgrid::sequencer::SequencerParts;
use stepgrid::{
    AudioTime, FaultKind, SequencerConfig, SequencerError, Track, TriggerError, create_sequencer,
};

const SAMPLE_RATE: u32 = 48000;
const BLOCK: usize = 512;

type Hits = Arc<Mutex<Vec<(AudioTime, usize)>>>;

struct Recorder {
    name: &'static str,
    hits: Hits,
}

impl Track for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn trigger(&mut self, time: AudioTime, step: usize) -> Result<(), TriggerError> {
        self.hits.lock().unwrap().push((time, step));
        Ok(())
    }
}

struct Exploding;

impl Track for Exploding {
    fn name(&self) -> &str {
        "exploding"
    }

    fn trigger(&mut self, _time: AudioTime, _step: usize) -> Result<(), TriggerError> {
        panic!("voice blew up");
    }
}

fn recorder(name: &'static str) -> (Box<dyn Track>, Hits) {
    let hits: Hits = Arc::new(Mutex::new(Vec::new()));
    (
        Box::new(Recorder {
            name,
            hits: Arc::clone(&hits),
        }),
        hits,
    )
}

/// Default 2 x 16 sequencer with two recording tracks
fn two_track_rig() -> (SequencerParts, Hits, Hits) {
    let (kick, kick_hits) = recorder("Kick");
    let (hat, hat_hits) = recorder("Hat");
    let parts = create_sequencer(&SequencerConfig::default(), vec![kick, hat], SAMPLE_RATE);
    (parts, kick_hits, hat_hits)
}

fn run_blocks(parts: &mut SequencerParts, blocks: usize) {
    for _ in 0..blocks {
        parts.player.process_block(BLOCK);
    }
}

#[test]
fn test_one_bar_fires_kick_once() {
    let (mut parts, kick_hits, hat_hits) = two_track_rig();
    parts.pattern.set(0, 0, true).unwrap();
    parts.controller.unlock();
    parts.controller.start().unwrap();

    // 16 ticks at 120 BPM: 0, 6000, ..., 90000. 176 blocks end at 90112.
    run_blocks(&mut parts, 176);

    assert_eq!(*kick_hits.lock().unwrap(), vec![(AudioTime::ZERO, 0)]);
    assert!(hat_hits.lock().unwrap().is_empty());

    let mut steps = Vec::new();
    assert_eq!(parts.cursor.poll(|event| steps.push(event.step)), 16);
    assert_eq!(steps, (0..16).collect::<Vec<_>>());
    assert_eq!(parts.controller.current_step(), 0);
}

#[test]
fn test_start_without_unlock_is_refused() {
    let (mut parts, kick_hits, _) = two_track_rig();
    parts.pattern.set(0, 3, true).unwrap();

    assert_eq!(parts.controller.start(), Err(SequencerError::EngineLocked));
    run_blocks(&mut parts, 400);

    assert!(kick_hits.lock().unwrap().is_empty());
    assert!(parts.player.clock().last_tick().is_none());
    assert_eq!(parts.pattern.active_count(), 1);
    assert_eq!(parts.pattern.get(0, 3), Ok(true));
}

#[test]
fn test_stop_resets_and_silences() {
    let (mut parts, kick_hits, _) = two_track_rig();
    for step in 0..16 {
        parts.pattern.set(0, step, true).unwrap();
    }
    parts.controller.unlock();
    parts.controller.start().unwrap();

    // Ticks at 0, 6000, 12000, 18000, 24000
    run_blocks(&mut parts, 50);
    assert_eq!(kick_hits.lock().unwrap().len(), 5);
    assert_eq!(parts.controller.current_step(), 5);

    parts.controller.stop();
    assert_eq!(parts.controller.current_step(), 0);

    run_blocks(&mut parts, 200);
    assert_eq!(kick_hits.lock().unwrap().len(), 5);
    assert_eq!(parts.controller.shared().step(), 0);
}

#[test]
fn test_cursor_events_of_stopped_run_are_discarded() {
    let (mut parts, _, _) = two_track_rig();
    parts.controller.unlock();
    parts.controller.start().unwrap();
    run_blocks(&mut parts, 50);

    // The UI did not poll before stopping
    parts.controller.stop();
    assert_eq!(parts.cursor.poll(|_| panic!("stale step delivered")), 0);
}

#[test]
fn test_restart_begins_at_step_zero() {
    let (mut parts, kick_hits, _) = two_track_rig();
    for step in 0..16 {
        parts.pattern.set(0, step, true).unwrap();
    }
    parts.controller.unlock();
    parts.controller.start().unwrap();
    run_blocks(&mut parts, 30);

    // Stop and start between two callbacks
    parts.controller.stop();
    parts.controller.start().unwrap();
    kick_hits.lock().unwrap().clear();
    run_blocks(&mut parts, 1);

    let hits = kick_hits.lock().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].1, 0);
    assert_eq!(hits[0].0, AudioTime::from_frames(30 * BLOCK as u64));
}

#[test]
fn test_tempo_changes_keep_ticks_ordered() {
    let (mut parts, kick_hits, _) = two_track_rig();
    for step in 0..16 {
        parts.pattern.set(0, step, true).unwrap();
    }
    parts.controller.unlock();
    parts.controller.start().unwrap();

    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..3000 {
        if rng.gen_bool(0.05) {
            parts.controller.set_tempo(rng.gen_range(40.0..=240.0)).unwrap();
        }
        parts.player.process_block(BLOCK);
    }

    let hits = kick_hits.lock().unwrap();
    assert!(hits.len() > 50);
    for pair in hits.windows(2) {
        assert!(pair[1].0 > pair[0].0, "tick times must strictly increase");
        assert_eq!(pair[1].1, (pair[0].1 + 1) % 16, "no skipped or repeated step");
    }
}

#[test]
fn test_panicking_track_does_not_stop_the_clock() {
    let (hat, hat_hits) = recorder("Hat");
    let mut parts = create_sequencer(
        &SequencerConfig::default(),
        vec![Box::new(Exploding), hat],
        SAMPLE_RATE,
    );
    for step in 0..16 {
        parts.pattern.set(0, step, true).unwrap();
        parts.pattern.set(1, step, true).unwrap();
    }
    parts.controller.unlock();
    parts.controller.start().unwrap();

    // 32 ticks: 0 .. 186000
    run_blocks(&mut parts, 364);
    assert_eq!(hat_hits.lock().unwrap().len(), 32);

    let mut faults = Vec::new();
    parts.faults.drain(|fault| faults.push(fault));
    assert_eq!(faults.len(), 32);
    assert!(faults.iter().all(|f| f.track == 0 && f.kind == FaultKind::Panicked));

    let mut steps = 0;
    parts.cursor.poll(|_| steps += 1);
    assert_eq!(steps, 32);
}

#[test]
fn test_steps_from_config() {
    let config = SequencerConfig::from_ron_str("(steps: 8, steps_per_beat: 2)").unwrap();
    let (kick, kick_hits) = recorder("Kick");
    let (hat, _) = recorder("Hat");
    let mut parts = create_sequencer(&config, vec![kick, hat], SAMPLE_RATE);
    for step in 0..8 {
        parts.pattern.set(0, step, true).unwrap();
    }
    parts.controller.unlock();
    parts.controller.start().unwrap();

    // Eighth notes at 120 BPM: one tick every 12000 frames
    run_blocks(&mut parts, 250);
    let hits = kick_hits.lock().unwrap();
    let steps: Vec<usize> = hits.iter().map(|h| h.1).collect();
    assert_eq!(steps, vec![0, 1, 2, 3, 4, 5, 6, 7, 0, 1, 2]);
    assert_eq!(hits[1].0, AudioTime::from_frames(12000));
}
