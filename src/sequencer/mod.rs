// Sequencer module
// Pattern grid, sample-accurate clock, trigger dispatch and transport control

pub mod clock;
pub mod cursor;
pub mod dispatcher;
pub mod error;
pub mod impact;
pub mod pattern;
pub mod player;
pub mod timeline;
pub mod transport;

use std::sync::Arc;

pub use clock::{ClockScheduler, StepCursor, TempoRamp, Tick};
pub use cursor::CursorFeed;
pub use dispatcher::{DispatchFault, FaultFeed, FaultKind, StepEvent, Track, TriggerDispatcher};
pub use error::{NotReadyReason, SequencerError, TriggerError};
pub use impact::ImpactScore;
pub use pattern::PatternStore;
pub use player::SequencerPlayer;
pub use timeline::{AudioTime, Tempo, TimeSignature};
pub use transport::{SharedTransport, TransportController, TransportState};

use crate::config::SequencerConfig;
use crate::messaging::channels::{create_cursor_channel, create_fault_channel};

/// Both halves of a sequencer, wired together
pub struct SequencerParts {
    /// UI thread: start/stop/tempo
    pub controller: TransportController,
    /// Audio thread: moved into the output callback
    pub player: SequencerPlayer,
    /// UI thread: visual cursor events
    pub cursor: CursorFeed,
    /// UI thread: isolated track failures
    pub faults: FaultFeed,
    pub pattern: Arc<PatternStore>,
}

/// Build a stopped sequencer for `tracks` at the given output rate
pub fn create_sequencer(
    config: &SequencerConfig,
    tracks: Vec<Box<dyn Track>>,
    sample_rate: u32,
) -> SequencerParts {
    let tempo = config.tempo();
    let pattern = PatternStore::shared(config.tracks.len().max(tracks.len()), config.steps);
    let shared = SharedTransport::new(tempo);

    let (cursor_tx, cursor_rx) = create_cursor_channel(config.cursor_queue_capacity);
    let (fault_tx, fault_rx) = create_fault_channel(config.fault_queue_capacity);

    let dispatcher = TriggerDispatcher::new(Arc::clone(&pattern), tracks, cursor_tx, fault_tx);
    let clock = ClockScheduler::new(
        sample_rate as f64,
        tempo,
        config.steps,
        config.steps_per_beat,
        config.tempo_ramp_ms,
    );

    SequencerParts {
        controller: TransportController::new(Arc::clone(&shared)),
        player: SequencerPlayer::new(Arc::clone(&shared), clock, dispatcher),
        cursor: CursorFeed::new(cursor_rx, shared),
        faults: FaultFeed::new(fault_rx),
        pattern,
    }
}
