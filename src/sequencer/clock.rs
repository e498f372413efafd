// Clock Scheduler - Step ticks derived from the audio frame clock
// Sample-accurate: tick times are computed in frames, never from wall-clock timers

use super::timeline::{AudioTime, Tempo, step_period_frames};

/// One step boundary on the audio timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub time: AudioTime,
    pub step: usize,
}

/// Current step index, wrapping at the pattern length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepCursor {
    step: usize,
    steps: usize,
}

impl StepCursor {
    pub fn new(steps: usize) -> Self {
        assert!(steps > 0, "Step cursor needs at least one step");
        Self { step: 0, steps }
    }

    pub fn current(&self) -> usize {
        self.step
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Move to the next step, returning the new index
    pub fn advance(&mut self) -> usize {
        self.step = (self.step + 1) % self.steps;
        self.step
    }

    pub fn reset(&mut self) {
        self.step = 0;
    }
}

/// Linear tempo ramp between two frame positions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoRamp {
    from_bpm: f64,
    to_bpm: f64,
    start: u64,
    end: u64,
}

impl TempoRamp {
    /// Constant tempo, no ramp
    pub fn constant(bpm: f64) -> Self {
        Self {
            from_bpm: bpm,
            to_bpm: bpm,
            start: 0,
            end: 0,
        }
    }

    /// Effective tempo at a frame position
    pub fn bpm_at(&self, frame: u64) -> f64 {
        if frame >= self.end {
            self.to_bpm
        } else if frame <= self.start {
            self.from_bpm
        } else {
            let t = (frame - self.start) as f64 / (self.end - self.start) as f64;
            self.from_bpm + (self.to_bpm - self.from_bpm) * t
        }
    }

    pub fn target_bpm(&self) -> f64 {
        self.to_bpm
    }
}

/// Produces step ticks while running
///
/// The next tick time is fixed when the previous tick fires, using the tempo
/// in effect at that instant. A tempo change therefore only shapes ticks that
/// have not been computed yet.
#[derive(Debug, Clone)]
pub struct ClockScheduler {
    sample_rate: f64,
    steps_per_beat: u32,
    ramp_frames: u64,
    ramp: TempoRamp,

    running: bool,
    next_tick: f64,              // Exact frame position of the next tick
    last_tick: Option<AudioTime>, // Last emitted tick, across runs
    cursor: StepCursor,
}

impl ClockScheduler {
    /// Create a stopped scheduler
    ///
    /// `ramp_ms` is the glide window applied to live tempo changes.
    pub fn new(
        sample_rate: f64,
        tempo: Tempo,
        steps: usize,
        steps_per_beat: u32,
        ramp_ms: f64,
    ) -> Self {
        assert!(sample_rate > 0.0, "Sample rate must be positive");
        assert!(steps_per_beat > 0, "Steps per beat must be > 0");

        Self {
            sample_rate,
            steps_per_beat,
            ramp_frames: (ramp_ms.max(0.0) / 1000.0 * sample_rate).round() as u64,
            ramp: TempoRamp::constant(tempo.bpm()),
            running: false,
            next_tick: 0.0,
            last_tick: None,
            cursor: StepCursor::new(steps),
        }
    }

    /// Schedule the first tick at `from`
    /// No-op if already started
    pub fn start(&mut self, from: AudioTime) {
        if self.running {
            return;
        }
        self.running = true;
        self.next_tick = from.frames() as f64;
    }

    /// Cancel all future ticks and reset the step cursor
    pub fn stop(&mut self) {
        self.running = false;
        self.cursor.reset();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Glide from the tempo in effect at `at` to `tempo`
    pub fn set_tempo(&mut self, tempo: Tempo, at: AudioTime) {
        let at = at.frames();
        self.ramp = TempoRamp {
            from_bpm: self.ramp.bpm_at(at),
            to_bpm: tempo.bpm(),
            start: at,
            end: at + self.ramp_frames,
        };
    }

    /// Jump straight to `tempo` (used before the first tick of a run)
    pub fn set_tempo_immediate(&mut self, tempo: Tempo) {
        self.ramp = TempoRamp::constant(tempo.bpm());
    }

    pub fn bpm_at(&self, time: AudioTime) -> f64 {
        self.ramp.bpm_at(time.frames())
    }

    pub fn target_bpm(&self) -> f64 {
        self.ramp.target_bpm()
    }

    /// Tick period in frames at the tempo in effect at `time`
    pub fn period_frames_at(&self, time: AudioTime) -> f64 {
        step_period_frames(self.bpm_at(time), self.sample_rate, self.steps_per_beat)
    }

    /// Step the next tick will carry
    pub fn step(&self) -> usize {
        self.cursor.current()
    }

    /// Move the cursor so the next tick carries `step` (wrapped)
    pub fn seek(&mut self, step: usize) {
        self.cursor.step = step % self.cursor.steps;
    }

    pub fn last_tick(&self) -> Option<AudioTime> {
        self.last_tick
    }

    /// Emit every tick whose time falls before the end of the block
    ///
    /// Ticks that belong to an earlier block (late callback) are still
    /// emitted with their original time. Returns the number of ticks emitted.
    pub fn process_block<F>(&mut self, block_start: AudioTime, frames: usize, mut on_tick: F) -> usize
    where
        F: FnMut(Tick),
    {
        if !self.running {
            return 0;
        }

        let block_end = block_start.frames() + frames as u64;
        let mut emitted = 0;

        while self.running && self.next_tick < block_end as f64 {
            let mut frame = self.next_tick.round() as u64;
            if let Some(last) = self.last_tick {
                frame = frame.max(last.frames() + 1);
            }
            if frame >= block_end {
                break;
            }

            let time = AudioTime::from_frames(frame);
            let tick = Tick {
                time,
                step: self.cursor.current(),
            };

            self.last_tick = Some(time);
            self.cursor.advance();
            self.next_tick += self.period_frames_at(time);
            emitted += 1;

            on_tick(tick);
        }

        emitted
    }
}
