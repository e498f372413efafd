// Trigger Dispatcher - Fires track triggers for each clock tick
// Runs on the audio thread: no allocations, no I/O, no blocking locks

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use ringbuf::traits::{Consumer, Producer};

use super::clock::Tick;
use super::error::TriggerError;
use super::pattern::PatternStore;
use super::timeline::AudioTime;
use crate::messaging::channels::{FaultConsumer, FaultProducer, CursorProducer};

/// A sound-producing unit bound to one row of the pattern
///
/// `trigger` schedules a hit at an exact audio time; the host later pulls
/// sound through `render`. Both are called on the audio thread.
pub trait Track: Send {
    fn name(&self) -> &str;

    /// Schedule a hit at `time` for the given step
    fn trigger(&mut self, time: AudioTime, step: usize) -> Result<(), TriggerError>;

    /// Add this track's output for the block starting at `block_start` into `out`
    fn render(&mut self, block_start: AudioTime, out: &mut [f32]) {
        let _ = (block_start, out);
    }
}

/// Visual cursor event posted after a step has been dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepEvent {
    pub step: usize,
    pub time: AudioTime,
    pub epoch: u32, // Transport run the step belongs to
}

/// How a track failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultKind {
    Rejected(TriggerError),
    Panicked,
    RenderPanicked,
}

/// A track failure isolated at the dispatch boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFault {
    pub track: usize,
    pub step: usize,
    pub time: AudioTime,
    pub kind: FaultKind,
}

impl fmt::Display for DispatchFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FaultKind::Rejected(err) => write!(
                f,
                "track {} step {} {}: {}",
                self.track, self.step, self.time, err
            ),
            FaultKind::Panicked => write!(
                f,
                "track {} step {} {}: trigger panicked",
                self.track, self.step, self.time
            ),
            FaultKind::RenderPanicked => {
                write!(f, "track {} {}: render panicked", self.track, self.time)
            }
        }
    }
}

/// Reads the pattern at each tick and fires the matching tracks
pub struct TriggerDispatcher {
    pattern: Arc<PatternStore>,
    tracks: Vec<Box<dyn Track>>,
    cursor_tx: CursorProducer,
    fault_tx: FaultProducer,
    last_step: usize,
    dropped_cursor_events: u64,
    dropped_faults: u64,
}

impl TriggerDispatcher {
    pub fn new(
        pattern: Arc<PatternStore>,
        tracks: Vec<Box<dyn Track>>,
        cursor_tx: CursorProducer,
        fault_tx: FaultProducer,
    ) -> Self {
        assert!(
            tracks.len() <= pattern.tracks(),
            "More tracks ({}) than pattern rows ({})",
            tracks.len(),
            pattern.tracks()
        );

        Self {
            pattern,
            tracks,
            cursor_tx,
            fault_tx,
            last_step: 0,
            dropped_cursor_events: 0,
            dropped_faults: 0,
        }
    }

    /// Fire every track active at `tick.step`, then post the cursor event
    ///
    /// All tracks receive the same `tick.time`. A failing track is reported
    /// and skipped; the others still fire. Returns the number of tracks that
    /// accepted the trigger.
    pub fn dispatch(&mut self, tick: Tick, epoch: u32) -> usize {
        let mut fired = 0;
        self.last_step = tick.step;

        for (index, track) in self.tracks.iter_mut().enumerate() {
            if !self.pattern.is_active(index, tick.step) {
                continue;
            }

            let outcome = catch_unwind(AssertUnwindSafe(|| track.trigger(tick.time, tick.step)));
            let kind = match outcome {
                Ok(Ok(())) => {
                    fired += 1;
                    continue;
                }
                Ok(Err(err)) => FaultKind::Rejected(err),
                Err(_) => FaultKind::Panicked,
            };

            let fault = DispatchFault {
                track: index,
                step: tick.step,
                time: tick.time,
                kind,
            };
            if self.fault_tx.try_push(fault).is_err() {
                self.dropped_faults += 1;
            }
        }

        let event = StepEvent {
            step: tick.step,
            time: tick.time,
            epoch,
        };
        if self.cursor_tx.try_push(event).is_err() {
            // UI is behind; the next event supersedes this one
            self.dropped_cursor_events += 1;
        }

        fired
    }

    /// Mix every track's output into `out` (cleared first)
    pub fn render(&mut self, block_start: AudioTime, out: &mut [f32]) {
        out.fill(0.0);

        for (index, track) in self.tracks.iter_mut().enumerate() {
            let outcome = catch_unwind(AssertUnwindSafe(|| track.render(block_start, out)));
            if outcome.is_err() {
                let fault = DispatchFault {
                    track: index,
                    step: self.last_step,
                    time: block_start,
                    kind: FaultKind::RenderPanicked,
                };
                if self.fault_tx.try_push(fault).is_err() {
                    self.dropped_faults += 1;
                }
            }
        }
    }

    pub fn pattern(&self) -> &Arc<PatternStore> {
        &self.pattern
    }

    /// Cursor events lost because the UI queue was full
    pub fn dropped_cursor_events(&self) -> u64 {
        self.dropped_cursor_events
    }

    /// Faults lost because the fault queue was full
    pub fn dropped_faults(&self) -> u64 {
        self.dropped_faults
    }
}

/// UI-side end of the fault queue
pub struct FaultFeed {
    rx: FaultConsumer,
}

impl FaultFeed {
    pub fn new(rx: FaultConsumer) -> Self {
        Self { rx }
    }

    /// Hand every pending fault to `on_fault`, returning how many were drained
    pub fn drain<F>(&mut self, mut on_fault: F) -> usize
    where
        F: FnMut(DispatchFault),
    {
        let mut count = 0;
        while let Some(fault) = self.rx.try_pop() {
            on_fault(fault);
            count += 1;
        }
        count
    }
}
