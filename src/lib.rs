// stepgrid - Library exports for the binary, tests and benchmarks

pub mod audio;
pub mod capture;
pub mod config;
pub mod messaging;
pub mod sequencer;
pub mod session;

// Re-export commonly used types for convenience
pub use audio::engine::{AudioEngine, AudioError, OutputDevice, OutputRenderer};
pub use audio::export::CaptureArtifact;
pub use audio::synth::{DrumTrack, VoiceKind, tracks_from_config};
pub use capture::{CaptureError, CapturePlan, CaptureRecorder, CaptureSink, CaptureTap, RingCaptureSink};
pub use config::{ConfigError, SequencerConfig, TrackConfig};
pub use messaging::command::Command;
pub use messaging::notification::{Notification, NotificationCategory, NotificationLevel};
pub use sequencer::{
    AudioTime, ClockScheduler, CursorFeed, DispatchFault, FaultKind, ImpactScore, PatternStore,
    SequencerError, SequencerPlayer, StepEvent, Tempo, Tick, TimeSignature, Track,
    TransportController, TransportState, TriggerError, create_sequencer,
};
pub use session::{Outcome, Session};
