// Sequencer Player - Audio-thread half of the sequencer
// Owns the clock and the dispatcher, follows the shared transport block by block

use std::sync::Arc;

use super::clock::ClockScheduler;
use super::dispatcher::TriggerDispatcher;
use super::transport::SharedTransport;
use super::timeline::AudioTime;

/// Drives ticks from inside the audio callback
///
/// Call `process_block` once per callback, then `render` to pull the mixed
/// track output for the same block.
pub struct SequencerPlayer {
    shared: Arc<SharedTransport>,
    clock: ClockScheduler,
    dispatcher: TriggerDispatcher,

    /// Epoch of the run the clock is currently playing
    run_epoch: Option<u32>,
    /// Tempo last handed to the clock
    applied_bpm: f64,
}

impl SequencerPlayer {
    pub fn new(
        shared: Arc<SharedTransport>,
        clock: ClockScheduler,
        dispatcher: TriggerDispatcher,
    ) -> Self {
        let applied_bpm = shared.tempo().bpm();
        Self {
            shared,
            clock,
            dispatcher,
            run_epoch: None,
            applied_bpm,
        }
    }

    /// Advance the audio timeline by one block and dispatch its ticks
    ///
    /// Returns the start of the block on the audio timeline.
    pub fn process_block(&mut self, frames: usize) -> AudioTime {
        let block_start = self.shared.advance_clock(frames);
        self.sync_transport(block_start);

        let Some(epoch) = self.run_epoch else {
            return block_start;
        };

        let shared = &self.shared;
        let dispatcher = &mut self.dispatcher;
        let steps = dispatcher.pattern().steps();

        self.clock.process_block(block_start, frames, |tick| {
            // stop() may have landed since the block began
            if !shared.is_running() || shared.epoch() != epoch {
                return;
            }
            dispatcher.dispatch(tick, epoch);
            shared.publish_step(epoch, (tick.step + 1) % steps);
        });

        block_start
    }

    /// Mix the tracks' output for the block starting at `block_start`
    pub fn render(&mut self, block_start: AudioTime, out: &mut [f32]) {
        self.dispatcher.render(block_start, out);
    }

    /// Follow start/stop/tempo changes published by the controller
    fn sync_transport(&mut self, block_start: AudioTime) {
        let running = self.shared.is_running();
        let epoch = self.shared.epoch();

        match self.run_epoch {
            Some(current) if running && current == epoch => {
                let tempo = self.shared.tempo();
                if tempo.bpm() != self.applied_bpm {
                    self.clock.set_tempo(tempo, block_start);
                    self.applied_bpm = tempo.bpm();
                }
            }
            _ if running => {
                // New run (possibly stop+start between two blocks)
                self.clock.stop();
                self.clock.seek(self.shared.step());
                let tempo = self.shared.tempo();
                self.clock.set_tempo_immediate(tempo);
                self.applied_bpm = tempo.bpm();
                self.clock.start(block_start);
                self.run_epoch = Some(epoch);
            }
            Some(_) => {
                self.clock.stop();
                self.run_epoch = None;
            }
            None => {}
        }
    }

    pub fn clock(&self) -> &ClockScheduler {
        &self.clock
    }

    pub fn dispatcher(&self) -> &TriggerDispatcher {
        &self.dispatcher
    }

    pub fn is_playing(&self) -> bool {
        self.run_epoch.is_some()
    }
}
