// Transport - Playback control and state management
// Controls start/stop/tempo and mirrors the playhead step to the UI

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::error::{Result, SequencerError};
use super::timeline::{AudioTime, Tempo};

/// Transport state (stopped/running)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Running,
}

impl TransportState {
    pub fn is_running(&self) -> bool {
        matches!(self, TransportState::Running)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Stopped => write!(f, "stopped"),
            TransportState::Running => write!(f, "running"),
        }
    }
}

#[inline]
fn pack(epoch: u32, step: u32) -> u64 {
    ((epoch as u64) << 32) | step as u64
}

#[inline]
fn unpack(cursor: u64) -> (u32, u32) {
    ((cursor >> 32) as u32, cursor as u32)
}

/// Shared transport state
/// Thread-safe via atomics for communication with audio thread
///
/// The playhead is one `AtomicU64`: run epoch in the high half, step in the
/// low half. The audio thread may only publish a step for the epoch it is
/// playing, so a tick still in flight when `stop()` returns cannot move the
/// playhead off step 0.
#[derive(Debug)]
pub struct SharedTransport {
    running: AtomicBool,
    cursor: AtomicU64,
    tempo_bits: AtomicU64,
    frame_clock: AtomicU64,
}

impl SharedTransport {
    pub fn new(tempo: Tempo) -> Arc<Self> {
        Arc::new(Self {
            running: AtomicBool::new(false),
            cursor: AtomicU64::new(pack(0, 0)),
            tempo_bits: AtomicU64::new(tempo.bpm().to_bits()),
            frame_clock: AtomicU64::new(0),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Current run epoch (bumped on every start and stop)
    pub fn epoch(&self) -> u32 {
        unpack(self.cursor.load(Ordering::Acquire)).0
    }

    /// Published playhead step
    pub fn step(&self) -> usize {
        unpack(self.cursor.load(Ordering::Acquire)).1 as usize
    }

    pub fn tempo(&self) -> Tempo {
        Tempo::from_validated(f64::from_bits(self.tempo_bits.load(Ordering::Relaxed)))
    }

    /// Audio frames rendered so far
    pub fn audio_time(&self) -> AudioTime {
        AudioTime::from_frames(self.frame_clock.load(Ordering::Relaxed))
    }

    /// Advance the frame clock by one block, returning the block start
    pub(crate) fn advance_clock(&self, frames: usize) -> AudioTime {
        AudioTime::from_frames(self.frame_clock.fetch_add(frames as u64, Ordering::Relaxed))
    }

    /// Publish `step` if `epoch` is still the current run
    pub(crate) fn publish_step(&self, epoch: u32, step: usize) -> bool {
        self.cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                let (current, _) = unpack(cursor);
                (current == epoch).then(|| pack(epoch, step as u32))
            })
            .is_ok()
    }

    /// Open a new run, keeping the current step
    fn begin_run(&self) -> u32 {
        let previous = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                let (epoch, step) = unpack(cursor);
                Some(pack(epoch.wrapping_add(1), step))
            })
            .unwrap_or_else(|cursor| cursor);
        self.running.store(true, Ordering::Release);
        unpack(previous).0.wrapping_add(1)
    }

    /// Close the current run and park the playhead on step 0
    fn end_run(&self) {
        self.running.store(false, Ordering::Release);
        let _ = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                let (epoch, _) = unpack(cursor);
                Some(pack(epoch.wrapping_add(1), 0))
            });
    }

    fn set_tempo(&self, tempo: Tempo) {
        self.tempo_bits.store(tempo.bpm().to_bits(), Ordering::Relaxed);
    }
}

/// Transport controller
/// UI-side owner of the transport state machine
pub struct TransportController {
    shared: Arc<SharedTransport>,
    state: TransportState,
    unlocked: bool,
}

impl TransportController {
    pub fn new(shared: Arc<SharedTransport>) -> Self {
        Self {
            shared,
            state: TransportState::Stopped,
            unlocked: false,
        }
    }

    /// Get shared state (for passing to audio thread)
    pub fn shared(&self) -> Arc<SharedTransport> {
        Arc::clone(&self.shared)
    }

    /// One-time engine unlock, performed on the first user gesture
    pub fn unlock(&mut self) {
        if !self.unlocked {
            log::debug!("Audio engine unlocked");
        }
        self.unlocked = true;
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Start playback from the current step
    pub fn start(&mut self) -> Result<()> {
        if !self.unlocked {
            return Err(SequencerError::EngineLocked);
        }
        if self.state.is_running() {
            return Ok(());
        }

        let epoch = self.shared.begin_run();
        self.state = TransportState::Running;
        log::info!("Transport started at {} (run {})", self.tempo(), epoch);
        Ok(())
    }

    /// Stop playback and reset the step counter to 0
    pub fn stop(&mut self) {
        if !self.state.is_running() {
            return;
        }

        self.shared.end_run();
        self.state = TransportState::Stopped;
        log::info!("Transport stopped");
    }

    /// Start if stopped, stop if running
    pub fn toggle_play(&mut self) -> Result<TransportState> {
        if self.state.is_running() {
            self.stop();
        } else {
            self.start()?;
        }
        Ok(self.state)
    }

    /// Change the tempo; the clock glides to it on its next block
    pub fn set_tempo(&mut self, bpm: f64) -> Result<Tempo> {
        let tempo = Tempo::new(bpm)?;
        self.shared.set_tempo(tempo);
        log::debug!("Tempo set to {}", tempo);
        Ok(tempo)
    }

    pub fn tempo(&self) -> Tempo {
        self.shared.tempo()
    }

    /// Playhead step as last published by the audio thread
    pub fn current_step(&self) -> usize {
        if self.state.is_running() {
            self.shared.step()
        } else {
            0
        }
    }

    pub fn audio_time(&self) -> AudioTime {
        self.shared.audio_time()
    }
}
